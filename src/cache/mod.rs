//! Keyed TTL artifact cache.
//!
//! Expensive artifacts (rendered OG cards, for instance) are addressed by a
//! fingerprint of their generation parameters and served from a bounded
//! in-process store until their TTL runs out:
//!
//! - **Keys**: SHA-256 of canonical JSON, truncated to 16 hex chars
//! - **Store**: LRU map with lazy expiry and a 90% staleness window
//! - **Orchestrator**: read-through `with_cache` with miss coalescing and
//!   HTTP caching headers (`ETag`, `Cache-Control`, CDN variants)
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! namespace = "og-image"
//! default_ttl = 86400
//! max_entries = 1000
//! max_bytes = 67108864
//! coalesce_misses = true
//! # ... see config.rs for all options
//! ```

mod clock;
mod config;
mod dev;
mod error;
mod headers;
mod keys;
mod lock;
mod orchestrator;
mod pattern;
mod store;
mod validator;
mod warm;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use dev::DevCache;
pub use error::{BoxError, CacheError, StoreError};
pub use headers::{
    CACHE_TAG, CDN_CACHE_CONTROL, CachePolicy, SURROGATE_CONTROL, X_CACHE_STALE, X_CACHE_STATUS,
    cache_headers, http_date,
};
pub use keys::{CacheKey, KEY_HEX_LEN, KeyParams, canonical_json, generate_key};
pub use orchestrator::{Artifact, ArtifactCache, CacheOptions, CacheResponse, CacheStatus};
pub use pattern::{DEFAULT_MAX_PATTERN_LEN, KeyPattern};
pub use store::{
    CacheEntry, CacheStore, CachedArtifact, EntryInfo, Freshness, Lookup, MemoryStore, STALE_RATIO,
    StoreStats,
};
pub use validator::{VALIDATOR_HEX_LEN, Validator, generate_validator};
pub use warm::{CacheMetrics, PreloadFailure, PreloadItem, PreloadReport};
