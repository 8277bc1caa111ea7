//! Preloading, health probing and metrics snapshots.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use super::error::{BoxError, CacheError};
use super::orchestrator::{Artifact, ArtifactCache, CacheOptions};
use super::pattern::KeyPattern;
use super::store::{Lookup, StoreStats, rfc3339};

const SOURCE: &str = "cache::warm";
const HEALTH_KEY_PREFIX: &str = "__health__:";
const HEALTH_TTL_SECS: u64 = 1;

static HEALTH_PROBES: AtomicU64 = AtomicU64::new(0);

type BoxGenerator =
    Box<dyn FnOnce() -> BoxFuture<'static, Result<Artifact, BoxError>> + Send + 'static>;

/// One artifact to generate ahead of demand.
pub struct PreloadItem {
    pub key: String,
    generator: BoxGenerator,
    pub options: CacheOptions,
}

impl PreloadItem {
    pub fn new<F, Fut, E>(key: impl Into<String>, generator: F, options: CacheOptions) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Artifact, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self {
            key: key.into(),
            generator: Box::new(move || {
                let generation = generator();
                async move { generation.await.map_err(Into::into) }.boxed()
            }),
            options,
        }
    }
}

impl std::fmt::Debug for PreloadItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreloadItem")
            .field("key", &self.key)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreloadReport {
    pub warmed: usize,
    pub already_cached: usize,
    pub failed: usize,
    pub failures: Vec<PreloadFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreloadFailure {
    pub key: String,
    pub error: String,
}

enum PreloadOutcome {
    Warmed,
    AlreadyCached,
    Failed(PreloadFailure),
}

/// Store statistics stamped for export.
#[derive(Debug, Clone, Serialize)]
pub struct CacheMetrics {
    #[serde(flatten)]
    pub stats: StoreStats,
    pub timestamp: String,
    pub version: &'static str,
    pub in_flight: usize,
}

impl ArtifactCache {
    /// Generate every absent item concurrently.
    pub async fn preload(&self, items: Vec<PreloadItem>) -> PreloadReport {
        let total = items.len();
        let outcomes = join_all(items.into_iter().map(|item| self.preload_one(item))).await;

        let mut report = PreloadReport::default();
        for outcome in outcomes {
            match outcome {
                PreloadOutcome::Warmed => report.warmed += 1,
                PreloadOutcome::AlreadyCached => report.already_cached += 1,
                PreloadOutcome::Failed(failure) => {
                    report.failed += 1;
                    report.failures.push(failure);
                }
            }
        }

        info!(
            target = SOURCE,
            op = "preload",
            total,
            warmed = report.warmed,
            already_cached = report.already_cached,
            failed = report.failed,
            "Cache preload finished"
        );
        report
    }

    async fn preload_one(&self, item: PreloadItem) -> PreloadOutcome {
        let PreloadItem {
            key,
            generator,
            options,
        } = item;
        let store_key = self.namespaced_key(&key);

        if self.lookup(&store_key).await.is_some() {
            return PreloadOutcome::AlreadyCached;
        }

        match self.generate(store_key, generator, options.ttl_secs).await {
            Ok(_) => PreloadOutcome::Warmed,
            Err(err) => PreloadOutcome::Failed(PreloadFailure {
                key,
                error: err.to_string(),
            }),
        }
    }

    /// Round-trip a short-lived probe entry through the store.
    pub async fn health_check(&self) -> bool {
        let probe = AssertUnwindSafe(self.health_round_trip())
            .catch_unwind()
            .await;

        match probe {
            Ok(Ok(true)) => true,
            Ok(Ok(false)) => {
                warn!(target = SOURCE, op = "health_check", result = "mismatch", "Cache probe read back different data");
                false
            }
            Ok(Err(err)) => {
                warn!(target = SOURCE, op = "health_check", result = "error", error = %err, "Cache probe failed");
                false
            }
            Err(_) => {
                warn!(target = SOURCE, op = "health_check", result = "panic", "Cache probe panicked");
                false
            }
        }
    }

    async fn health_round_trip(&self) -> Result<bool, CacheError> {
        let id = HEALTH_PROBES.fetch_add(1, Ordering::Relaxed);
        let key = format!("{HEALTH_KEY_PREFIX}{id}");
        let payload = Bytes::from(format!("probe-{id}"));
        let store = self.store();

        store
            .set(&key, payload.clone(), Some(HEALTH_TTL_SECS))
            .await?;
        let readable = match store.get(&key).await? {
            Lookup::Hit(hit) => hit.data == payload,
            Lookup::Miss => false,
        };
        store.invalidate(&KeyPattern::exact(key)).await?;

        Ok(readable)
    }

    pub async fn metrics(&self) -> Result<CacheMetrics, CacheError> {
        let stats = self.store().stats().await?;
        Ok(CacheMetrics {
            stats,
            timestamp: rfc3339(OffsetDateTime::now_utc()),
            version: env!("CARGO_PKG_VERSION"),
            in_flight: self.in_flight(),
        })
    }
}
