//! Operator utilities for development and admin tooling.

use std::sync::Arc;

use tracing::info;

use super::error::CacheError;
use super::orchestrator::ArtifactCache;
use super::pattern::KeyPattern;
use super::store::{EntryInfo, StoreStats};
use super::warm::{PreloadItem, PreloadReport};

const SOURCE: &str = "cache::dev";

#[derive(Clone)]
pub struct DevCache {
    cache: Arc<ArtifactCache>,
}

impl DevCache {
    pub fn new(cache: Arc<ArtifactCache>) -> Self {
        Self { cache }
    }

    /// Remove every stored artifact.
    pub async fn clear(&self) -> Result<usize, CacheError> {
        let removed = self.cache.store().invalidate(&KeyPattern::All).await?;
        info!(target = SOURCE, op = "clear", removed, "Cache cleared");
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<StoreStats, CacheError> {
        Ok(self.cache.store().stats().await?)
    }

    pub async fn warm_up(&self, items: Vec<PreloadItem>) -> PreloadReport {
        self.cache.preload(items).await
    }

    /// Entry metadata for a raw (un-namespaced) key.
    pub async fn inspect(&self, key: &str) -> Result<Option<EntryInfo>, CacheError> {
        let store_key = self.cache.namespaced_key(key);
        Ok(self.cache.store().inspect(&store_key).await?)
    }

    /// Remove entries whose full store key matches `source`.
    ///
    /// An empty source clears the store.
    pub async fn invalidate_pattern(&self, source: &str) -> Result<usize, CacheError> {
        let pattern = KeyPattern::parse(source, self.cache.config().max_pattern_len)?;
        let removed = self.cache.store().invalidate(&pattern).await?;
        info!(
            target = SOURCE,
            op = "invalidate",
            pattern = %pattern.describe(),
            removed,
            "Cache entries invalidated"
        );
        Ok(removed)
    }
}
