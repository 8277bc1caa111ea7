//! Cache error types.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error produced by a caller-supplied artifact generator.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Failure reported by a [`CacheStore`](super::CacheStore) backend.
///
/// The in-process store never produces one; external backends do.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache backend rejected `{key}`: {reason}")]
    Rejected { key: String, reason: String },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Fingerprint parameters could not be turned into canonical JSON.
    #[error("cache key parameters are not serializable: {0}")]
    Serialization(String),
    /// The generator failed; shared so coalesced callers observe the same error.
    #[error("artifact generation failed: {0}")]
    Generator(#[source] Arc<dyn StdError + Send + Sync + 'static>),
    #[error("invalid invalidation pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CacheError {
    pub fn generator(error: impl Into<BoxError>) -> Self {
        Self::Generator(Arc::from(error.into()))
    }

    pub fn invalid_pattern(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
