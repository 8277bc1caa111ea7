//! Read-through orchestration over a [`CacheStore`].
//!
//! [`ArtifactCache::with_cache`] serves fresh hits straight from the store and
//! runs the caller's generator on a miss. Concurrent misses on one key share a
//! single generation: the first caller spawns the generator onto the runtime,
//! registers a shared handle to it in the in-flight map, and later callers
//! await the same handle. The spawned task owns a `FlightGuard` that clears
//! the slot when the task ends, whether it returns, panics or outlives every
//! caller. A panic surfaces as [`CacheError::Generator`].

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::http::{HeaderMap, HeaderValue};
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use metrics::{counter, histogram};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use super::config::CacheConfig;
use super::error::{BoxError, CacheError};
use super::headers::{
    CachePolicy, X_CACHE_STALE, X_CACHE_STATUS, cache_headers, insert_age,
    insert_validator_headers,
};
use super::keys::{generate_key, namespaced};
use super::store::{CacheStore, CachedArtifact, MemoryStore};
use super::validator::{Validator, generate_validator};

const SOURCE: &str = "cache::orchestrator";

/// Output of a generator.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Bytes(Bytes),
    Text(String),
    /// Structured output is returned to the caller but never stored.
    Json(serde_json::Value),
}

impl Artifact {
    /// Bytes to store, or `None` for structured artifacts.
    pub fn cacheable_bytes(&self) -> Option<Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes.clone()),
            Self::Text(text) => Some(Bytes::copy_from_slice(text.as_bytes())),
            Self::Json(_) => None,
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Json(value) => Bytes::from(value.to_string()),
            other => other.cacheable_bytes().unwrap_or_default(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Bytes(bytes) => bytes.len(),
            Self::Text(text) => text.len(),
            Self::Json(value) => value.to_string().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Bytes> for Artifact {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Artifact {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<String> for Artifact {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&'static str> for Artifact {
    fn from(text: &'static str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<serde_json::Value> for Artifact {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Store TTL; also advertised as `max-age` when set.
    pub ttl_secs: Option<u64>,
    pub stale_while_revalidate_secs: Option<u64>,
    pub tags: Vec<String>,
    pub vary: Option<String>,
    /// Regenerate instead of serving an entry past 90% of its TTL.
    pub refresh_stale: bool,
}

impl CacheOptions {
    pub fn with_ttl(ttl_secs: u64) -> Self {
        Self {
            ttl_secs: Some(ttl_secs),
            ..Default::default()
        }
    }

    pub fn policy(&self, config: &CacheConfig) -> CachePolicy {
        let defaults = CachePolicy::from_config(config);
        CachePolicy {
            ttl_secs: self.ttl_secs.unwrap_or(defaults.ttl_secs),
            stale_while_revalidate_secs: self
                .stale_while_revalidate_secs
                .unwrap_or(defaults.stale_while_revalidate_secs),
            tags: self.tags.clone(),
            vary: self.vary.clone().or(defaults.vary),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheResponse {
    pub data: Artifact,
    pub cached: bool,
    pub stale: bool,
    pub etag: Validator,
    /// Forward verbatim as HTTP response headers.
    pub headers: HeaderMap,
}

impl CacheResponse {
    pub fn status(&self) -> CacheStatus {
        if self.cached {
            CacheStatus::Hit
        } else {
            CacheStatus::Miss
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Generated {
    pub(crate) artifact: Artifact,
    pub(crate) validator: Validator,
    pub(crate) created_at: OffsetDateTime,
}

type Flight = Shared<BoxFuture<'static, Result<Generated, CacheError>>>;

#[derive(Clone)]
struct InFlight {
    id: u64,
    flight: Flight,
}

pub struct ArtifactCache {
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    in_flight: Arc<DashMap<String, InFlight>>,
    next_flight: AtomicU64,
}

impl ArtifactCache {
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn CacheStore>,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            config,
            clock,
            in_flight: Arc::new(DashMap::new()),
            next_flight: AtomicU64::new(0),
        }
    }

    /// Orchestrator over a fresh [`MemoryStore`] built from `config`.
    pub fn in_memory(config: CacheConfig) -> Self {
        let store = Arc::new(MemoryStore::new(&config));
        Self::new(store, config)
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The store key for a raw caller key.
    pub fn namespaced_key(&self, key: &str) -> String {
        namespaced(&self.config.namespace, key)
    }

    /// Number of generations currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Serve `key` from the store, or run `generator` and store its output.
    pub async fn with_cache<F, Fut, E>(
        &self,
        key: &str,
        generator: F,
        options: &CacheOptions,
    ) -> Result<CacheResponse, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Artifact, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let store_key = self.namespaced_key(key);
        let policy = options.policy(&self.config);

        if let Some(hit) = self.lookup(&store_key).await {
            if !(hit.stale && options.refresh_stale) {
                debug!(cache_key = %store_key, outcome = "hit", stale = hit.stale, "serving cached artifact");
                return Ok(hit_response(hit, &policy));
            }
            debug!(cache_key = %store_key, outcome = "stale_refresh", "regenerating stale artifact");
        } else {
            debug!(cache_key = %store_key, outcome = "miss", "cache miss, running generator");
        }

        let generated = self
            .generate(store_key, generator, options.ttl_secs)
            .await?;
        Ok(miss_response(generated, &policy))
    }

    /// Like [`with_cache`](Self::with_cache), deriving the key from `params`.
    pub async fn with_cache_params<P, F, Fut, E>(
        &self,
        params: &P,
        generator: F,
        options: &CacheOptions,
    ) -> Result<CacheResponse, CacheError>
    where
        P: Serialize + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Artifact, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let key = generate_key(params)?;
        self.with_cache(key.as_str(), generator, options).await
    }

    pub(crate) async fn lookup(&self, store_key: &str) -> Option<CachedArtifact> {
        match self.store.get(store_key).await {
            Ok(lookup) => lookup.into_hit(),
            Err(err) => {
                warn!(
                    target = SOURCE,
                    cache_key = store_key,
                    error = %err,
                    result = "degraded",
                    "Cache lookup failed, treating as miss"
                );
                None
            }
        }
    }

    /// Run (or join) the generation for an already-namespaced key.
    pub(crate) async fn generate<F, Fut, E>(
        &self,
        store_key: String,
        generator: F,
        ttl_secs: Option<u64>,
    ) -> Result<Generated, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Artifact, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        if !self.config.coalesce_misses {
            return run_generation(
                Arc::clone(&self.store),
                Arc::clone(&self.clock),
                store_key,
                generator(),
                ttl_secs,
            )
            .await;
        }

        let flight = match self.in_flight.entry(store_key.clone()) {
            Entry::Occupied(occupied) => {
                let flight = occupied.get().flight.clone();
                drop(occupied);
                counter!("ogcache_coalesced_total").increment(1);
                debug!(cache_key = %store_key, outcome = "coalesced", "joining in-flight generation");
                flight
            }
            Entry::Vacant(vacant) => {
                let id = self.next_flight.fetch_add(1, Ordering::Relaxed);
                let generation = run_generation(
                    Arc::clone(&self.store),
                    Arc::clone(&self.clock),
                    store_key.clone(),
                    generator(),
                    ttl_secs,
                );
                let in_flight = Arc::clone(&self.in_flight);
                let key = store_key.clone();
                // The guard is built inside the task: dropping it here would
                // re-lock the shard this entry holds.
                let handle = tokio::spawn(async move {
                    let _guard = FlightGuard { key, id, in_flight };
                    generation.await
                });
                let flight = joined(store_key, handle).boxed().shared();
                vacant.insert(InFlight {
                    id,
                    flight: flight.clone(),
                });
                flight
            }
        };

        flight.await
    }
}

async fn run_generation<Fut, E>(
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    store_key: String,
    generation: Fut,
    ttl_secs: Option<u64>,
) -> Result<Generated, CacheError>
where
    Fut: Future<Output = Result<Artifact, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    let started_at = Instant::now();
    let outcome = generation.await.map_err(CacheError::generator);
    let elapsed_ms = started_at.elapsed().as_millis() as u64;
    histogram!("ogcache_generate_ms").record(elapsed_ms as f64);

    match outcome {
        Ok(artifact) => {
            counter!("ogcache_generate_total", "result" => "ok").increment(1);
            let created_at = clock.now();
            let validator = match artifact.cacheable_bytes() {
                Some(bytes) => {
                    let validator = generate_validator(&bytes);
                    if let Err(err) = store.set(&store_key, bytes, ttl_secs).await {
                        warn!(
                            target = SOURCE,
                            cache_key = %store_key,
                            error = %err,
                            result = "not_stored",
                            "Failed to store generated artifact"
                        );
                    }
                    validator
                }
                None => {
                    debug!(cache_key = %store_key, result = "not_stored", "structured artifact is not cached");
                    generate_validator(&artifact.to_bytes())
                }
            };
            debug!(cache_key = %store_key, elapsed_ms, size_bytes = artifact.len(), "artifact generated");
            Ok(Generated {
                artifact,
                validator,
                created_at,
            })
        }
        Err(err) => {
            counter!("ogcache_generate_total", "result" => "error").increment(1);
            warn!(
                target = SOURCE,
                cache_key = %store_key,
                elapsed_ms,
                error = %err,
                "Artifact generator failed"
            );
            Err(err)
        }
    }
}

/// Await a spawned generation, reporting a panic or abort as a generator failure.
async fn joined(
    store_key: String,
    handle: JoinHandle<Result<Generated, CacheError>>,
) -> Result<Generated, CacheError> {
    match handle.await {
        Ok(result) => result,
        Err(err) => {
            counter!("ogcache_generate_total", "result" => "error").increment(1);
            warn!(
                target = SOURCE,
                cache_key = %store_key,
                panicked = err.is_panic(),
                error = %err,
                "Artifact generator did not complete"
            );
            Err(CacheError::generator(err))
        }
    }
}

/// Clears an in-flight slot when the generation task that owns it ends.
struct FlightGuard {
    key: String,
    id: u64,
    in_flight: Arc<DashMap<String, InFlight>>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .remove_if(&self.key, |_, current| current.id == self.id);
    }
}

fn hit_response(hit: CachedArtifact, policy: &CachePolicy) -> CacheResponse {
    let mut headers = cache_headers(policy);
    headers.insert(X_CACHE_STATUS, HeaderValue::from_static(CacheStatus::Hit.as_str()));
    insert_validator_headers(&mut headers, &hit.validator, hit.created_at);
    insert_age(&mut headers, hit.age.whole_seconds().max(0) as u64);
    if hit.stale {
        headers.insert(X_CACHE_STALE, HeaderValue::from_static("true"));
    }

    CacheResponse {
        data: Artifact::Bytes(hit.data),
        cached: true,
        stale: hit.stale,
        etag: hit.validator,
        headers,
    }
}

fn miss_response(generated: Generated, policy: &CachePolicy) -> CacheResponse {
    let mut headers = cache_headers(policy);
    headers.insert(X_CACHE_STATUS, HeaderValue::from_static(CacheStatus::Miss.as_str()));
    insert_validator_headers(&mut headers, &generated.validator, generated.created_at);

    CacheResponse {
        data: generated.artifact,
        cached: false,
        stale: false,
        etag: generated.validator,
        headers,
    }
}
