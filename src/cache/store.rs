//! Artifact storage.
//!
//! [`CacheStore`] is the seam consumers depend on; [`MemoryStore`] is the
//! process-local implementation. Expiry is lazy: an expired entry is removed
//! by the lookup that finds it. Capacity is bounded by entry count and by total
//! artifact bytes, with least-recently-used eviction on every insert.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use metrics::{counter, gauge};
use serde::Serialize;
use time::{Duration, OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use super::config::CacheConfig;
use super::error::StoreError;
use super::lock::{rw_read, rw_write};
use super::pattern::KeyPattern;
use super::validator::{Validator, generate_validator};

const SOURCE: &str = "cache::store";

/// Fraction of the TTL after which an entry is reported stale.
pub const STALE_RATIO: f64 = 0.9;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: Bytes,
    pub validator: Validator,
    pub created_at: OffsetDateTime,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Stale,
    Expired,
}

impl CacheEntry {
    pub fn new(data: Bytes, ttl_secs: u64, created_at: OffsetDateTime) -> Self {
        Self {
            validator: generate_validator(&data),
            data,
            created_at,
            ttl_secs,
        }
    }

    /// Entry age, clamped at zero if the clock stepped backwards.
    pub fn age(&self, now: OffsetDateTime) -> Duration {
        (now - self.created_at).max(Duration::ZERO)
    }

    pub fn freshness(&self, now: OffsetDateTime) -> Freshness {
        let age = self.age(now).as_seconds_f64();
        let ttl = self.ttl_secs as f64;
        if age > ttl {
            Freshness::Expired
        } else if age > ttl * STALE_RATIO {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }
}

/// A live entry returned by a lookup.
#[derive(Debug, Clone)]
pub struct CachedArtifact {
    pub data: Bytes,
    pub validator: Validator,
    pub created_at: OffsetDateTime,
    pub ttl_secs: u64,
    pub age: Duration,
    pub stale: bool,
}

#[derive(Debug, Clone)]
pub enum Lookup {
    Hit(CachedArtifact),
    Miss,
}

impl Lookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    pub fn into_hit(self) -> Option<CachedArtifact> {
        match self {
            Self::Hit(artifact) => Some(artifact),
            Self::Miss => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    /// Number of stored entries, including expired ones not yet looked up.
    pub size: usize,
    /// Sum of stored artifact byte lengths.
    pub memory_usage: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

/// Read-only view of one entry for operators.
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub key: String,
    pub size_bytes: usize,
    pub validator: Validator,
    pub created_at: String,
    pub ttl_secs: u64,
    pub age_secs: f64,
    pub freshness: Freshness,
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Lookup, StoreError>;

    /// Store `data` under `key`, replacing any previous entry.
    async fn set(&self, key: &str, data: Bytes, ttl_secs: Option<u64>) -> Result<(), StoreError>;

    /// Remove every entry matching `pattern`, returning how many were removed.
    async fn invalidate(&self, pattern: &KeyPattern) -> Result<usize, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;

    /// Peek at an entry without touching recency, counters or expiry.
    async fn inspect(&self, key: &str) -> Result<Option<EntryInfo>, StoreError>;
}

struct Entries {
    map: LruCache<String, CacheEntry>,
    bytes: usize,
}

impl Entries {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let removed = self.map.pop(key)?;
        self.bytes -= removed.data.len();
        Some(removed)
    }
}

/// In-process artifact store.
pub struct MemoryStore {
    entries: RwLock<Entries>,
    clock: Arc<dyn Clock>,
    default_ttl_secs: u64,
    max_entries: usize,
    max_bytes: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl MemoryStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(Entries {
                map: LruCache::unbounded(),
                bytes: 0,
            }),
            clock,
            default_ttl_secs: config.default_ttl_secs,
            max_entries: config.max_entries_non_zero().get(),
            max_bytes: config.max_bytes_non_zero().get(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn lookup(&self, key: &str) -> Lookup {
        let now = self.clock.now();
        let mut entries = rw_write(&self.entries, SOURCE, "lookup");

        // `get` promotes the entry in LRU order.
        let Some(freshness) = entries.map.get(key).map(|entry| entry.freshness(now)) else {
            drop(entries);
            self.record_miss();
            return Lookup::Miss;
        };

        if freshness == Freshness::Expired {
            entries.remove(key);
            publish_gauges(&entries);
            drop(entries);
            counter!("ogcache_store_expired_total").increment(1);
            debug!(cache_key = key, result = "expired", "Purged expired entry");
            self.record_miss();
            return Lookup::Miss;
        }

        let hit = entries.map.peek(key).map(|entry| CachedArtifact {
            data: entry.data.clone(),
            validator: entry.validator.clone(),
            created_at: entry.created_at,
            ttl_secs: entry.ttl_secs,
            age: entry.age(now),
            stale: freshness == Freshness::Stale,
        });
        drop(entries);

        match hit {
            Some(artifact) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                counter!("ogcache_store_hit_total").increment(1);
                Lookup::Hit(artifact)
            }
            None => {
                self.record_miss();
                Lookup::Miss
            }
        }
    }

    pub fn insert(&self, key: &str, data: Bytes, ttl_secs: Option<u64>) {
        let ttl_secs = ttl_secs.unwrap_or(self.default_ttl_secs);
        let entry = CacheEntry::new(data, ttl_secs, self.clock.now());
        let size = entry.data.len();

        let mut entries = rw_write(&self.entries, SOURCE, "insert");
        entries.remove(key);

        if size > self.max_bytes {
            publish_gauges(&entries);
            drop(entries);
            warn!(
                cache_key = key,
                size_bytes = size,
                max_bytes = self.max_bytes,
                result = "skipped",
                "Artifact exceeds the cache byte budget"
            );
            return;
        }

        let mut evicted = 0u64;
        while entries.map.len() >= self.max_entries || entries.bytes + size > self.max_bytes {
            match entries.map.pop_lru() {
                Some((evicted_key, old)) => {
                    entries.bytes -= old.data.len();
                    evicted += 1;
                    debug!(cache_key = %evicted_key, result = "evicted", "Evicted least recently used entry");
                }
                None => break,
            }
        }

        entries.bytes += size;
        entries.map.put(key.to_string(), entry);
        publish_gauges(&entries);
        drop(entries);

        if evicted > 0 {
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
            counter!("ogcache_store_evict_total").increment(evicted);
        }
    }

    pub fn remove_matching(&self, pattern: &KeyPattern) -> usize {
        let mut entries = rw_write(&self.entries, SOURCE, "remove_matching");

        let removed = if pattern.is_all() {
            let count = entries.map.len();
            entries.map.clear();
            entries.bytes = 0;
            count
        } else {
            let doomed: Vec<String> = entries
                .map
                .iter()
                .filter(|(key, _)| pattern.matches(key))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &doomed {
                entries.remove(key);
            }
            doomed.len()
        };

        publish_gauges(&entries);
        removed
    }

    pub fn snapshot_stats(&self) -> StoreStats {
        let (size, memory_usage) = {
            let entries = rw_read(&self.entries, SOURCE, "stats");
            (entries.map.len(), entries.bytes)
        };
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        StoreStats {
            size,
            memory_usage,
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    pub fn peek(&self, key: &str) -> Option<EntryInfo> {
        let now = self.clock.now();
        let entries = rw_read(&self.entries, SOURCE, "peek");
        entries.map.peek(key).map(|entry| EntryInfo {
            key: key.to_string(),
            size_bytes: entry.data.len(),
            validator: entry.validator.clone(),
            created_at: rfc3339(entry.created_at),
            ttl_secs: entry.ttl_secs,
            age_secs: entry.age(now).as_seconds_f64(),
            freshness: entry.freshness(now),
        })
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!("ogcache_store_miss_total").increment(1);
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Lookup, StoreError> {
        Ok(self.lookup(key))
    }

    async fn set(&self, key: &str, data: Bytes, ttl_secs: Option<u64>) -> Result<(), StoreError> {
        self.insert(key, data, ttl_secs);
        Ok(())
    }

    async fn invalidate(&self, pattern: &KeyPattern) -> Result<usize, StoreError> {
        Ok(self.remove_matching(pattern))
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(self.snapshot_stats())
    }

    async fn inspect(&self, key: &str) -> Result<Option<EntryInfo>, StoreError> {
        Ok(self.peek(key))
    }
}

fn publish_gauges(entries: &Entries) {
    gauge!("ogcache_store_entries").set(entries.map.len() as f64);
    gauge!("ogcache_store_bytes").set(entries.bytes as f64);
}

pub(crate) fn rfc3339(timestamp: OffsetDateTime) -> String {
    timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| timestamp.unix_timestamp().to_string())
}
