//! Key patterns for bulk invalidation.
//!
//! Patterns arrive from operators (admin routes, CLI), so parsing bounds both
//! the source length and the compiled program size. The `regex` crate matches
//! in linear time, so a hostile pattern cannot backtrack catastrophically.

use regex::{Regex, RegexBuilder};

use super::error::CacheError;

/// Default upper bound on the length of a pattern source.
pub const DEFAULT_MAX_PATTERN_LEN: usize = 256;

const REGEX_SIZE_LIMIT: usize = 1 << 20;
const PREFIX_MARKER: &str = "prefix:";

#[derive(Debug, Clone)]
pub enum KeyPattern {
    /// Every key.
    All,
    /// Exactly one key.
    Exact(String),
    /// Keys starting with a literal prefix.
    Prefix(String),
    /// Keys matched anywhere by a regular expression.
    Regex(Regex),
}

impl KeyPattern {
    /// Parse an operator-supplied pattern.
    ///
    /// An empty string selects every key, `prefix:<literal>` selects a literal
    /// prefix, and anything else is compiled as a regular expression. A regex
    /// that itself starts with `prefix:` must be written as `(?:prefix:)...`.
    pub fn parse(source: &str, max_len: usize) -> Result<Self, CacheError> {
        if source.len() > max_len {
            return Err(CacheError::invalid_pattern(
                truncated(source),
                format!("pattern is longer than {max_len} bytes"),
            ));
        }

        if source.is_empty() {
            return Ok(Self::All);
        }

        if let Some(prefix) = source.strip_prefix(PREFIX_MARKER) {
            return Ok(Self::Prefix(prefix.to_string()));
        }

        RegexBuilder::new(source)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map(Self::Regex)
            .map_err(|err| CacheError::invalid_pattern(source, err.to_string()))
    }

    /// Parse an optional pattern; `None` selects every key.
    pub fn parse_optional(source: Option<&str>, max_len: usize) -> Result<Self, CacheError> {
        match source {
            Some(source) => Self::parse(source, max_len),
            None => Ok(Self::All),
        }
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::Prefix(prefix.into())
    }

    pub fn exact(key: impl Into<String>) -> Self {
        Self::Exact(key.into())
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::All => true,
            Self::Exact(exact) => key == exact,
            Self::Prefix(prefix) => key.starts_with(prefix.as_str()),
            Self::Regex(regex) => regex.is_match(key),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    pub fn describe(&self) -> String {
        match self {
            Self::All => "*".to_string(),
            Self::Exact(key) => key.clone(),
            Self::Prefix(prefix) => format!("{PREFIX_MARKER}{prefix}"),
            Self::Regex(regex) => regex.as_str().to_string(),
        }
    }
}

fn truncated(source: &str) -> &str {
    let mut end = source.len().min(32);
    while !source.is_char_boundary(end) {
        end -= 1;
    }
    &source[..end]
}
