//! Cache configuration.
//!
//! Controls the artifact store budgets and the HTTP caching policy via the
//! `[cache]` section of `ogcache.toml`.

use std::num::NonZeroUsize;

use serde::Deserialize;

use super::pattern::DEFAULT_MAX_PATTERN_LEN;

pub const DEFAULT_NAMESPACE: &str = "og-image";
const DEFAULT_TTL_SECS: u64 = 86_400;
const DEFAULT_MAX_ENTRIES: usize = 1_000;
const DEFAULT_MAX_BYTES: usize = 64 * 1024 * 1024;
pub const DEFAULT_HEADER_TTL_SECS: u64 = 31_536_000;
pub const DEFAULT_STALE_WHILE_REVALIDATE_SECS: u64 = 86_400;
pub const DEFAULT_VARY: &str = "User-Agent";

/// Cache configuration from `ogcache.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Prefix applied to every key written by the orchestrator.
    pub namespace: String,
    /// Store TTL used when a caller does not pass one.
    pub default_ttl_secs: u64,
    /// Maximum number of stored artifacts before LRU eviction.
    pub max_entries: usize,
    /// Maximum summed artifact bytes before LRU eviction.
    pub max_bytes: usize,
    /// Share one generation between concurrent misses on the same key.
    pub coalesce_misses: bool,
    /// `max-age`/`s-maxage` advertised to clients and CDNs.
    pub header_ttl_secs: u64,
    /// `stale-while-revalidate` advertised to clients and CDNs.
    pub stale_while_revalidate_secs: u64,
    /// Default `Vary` header.
    pub vary: String,
    /// Longest accepted invalidation pattern.
    pub max_pattern_len: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            default_ttl_secs: DEFAULT_TTL_SECS,
            max_entries: DEFAULT_MAX_ENTRIES,
            max_bytes: DEFAULT_MAX_BYTES,
            coalesce_misses: true,
            header_ttl_secs: DEFAULT_HEADER_TTL_SECS,
            stale_while_revalidate_secs: DEFAULT_STALE_WHILE_REVALIDATE_SECS,
            vary: DEFAULT_VARY.to_string(),
            max_pattern_len: DEFAULT_MAX_PATTERN_LEN,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            namespace: settings.namespace.clone(),
            default_ttl_secs: settings.default_ttl.as_secs(),
            max_entries: settings.max_entries.get(),
            max_bytes: settings.max_bytes.get(),
            coalesce_misses: settings.coalesce_misses,
            header_ttl_secs: settings.header_ttl.as_secs(),
            stale_while_revalidate_secs: settings.stale_while_revalidate.as_secs(),
            vary: settings.vary.clone(),
            max_pattern_len: settings.max_pattern_len,
        }
    }
}

impl CacheConfig {
    /// Returns the entry limit as NonZeroUsize, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the byte budget as NonZeroUsize, clamping to 1 if zero.
    pub fn max_bytes_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_bytes).unwrap_or(NonZeroUsize::MIN)
    }
}
