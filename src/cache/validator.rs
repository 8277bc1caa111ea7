//! Content-addressed validators (ETags).

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hex characters kept from the content digest.
pub const VALIDATOR_HEX_LEN: usize = 16;

/// Strong entity tag derived from artifact bytes, stored with its quotes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Validator(String);

impl Validator {
    /// The quoted form, ready for an `ETag` header.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The token without its surrounding quotes.
    pub fn opaque(&self) -> &str {
        self.0.trim_matches('"')
    }

    /// Weak comparison against an `If-None-Match` header value.
    pub fn matches_if_none_match(&self, header: &str) -> bool {
        let header = header.trim();
        if header == "*" {
            return true;
        }

        header
            .split(',')
            .map(|candidate| candidate.trim())
            .map(|candidate| candidate.strip_prefix("W/").unwrap_or(candidate))
            .any(|candidate| candidate == self.0)
    }
}

impl fmt::Display for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn generate_validator(data: &[u8]) -> Validator {
    let digest = Sha256::digest(data);
    let mut hex = hex::encode(digest);
    hex.truncate(VALIDATOR_HEX_LEN);
    Validator(format!("\"{hex}\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validator_is_quoted() {
        let validator = generate_validator(b"<svg/>");
        let raw = validator.as_str();
        assert!(raw.starts_with('"') && raw.ends_with('"'));
        assert_eq!(validator.opaque().len(), VALIDATOR_HEX_LEN);
    }

    #[test]
    fn same_bytes_same_validator() {
        assert_eq!(generate_validator(b"card"), generate_validator(b"card"));
        assert_ne!(generate_validator(b"card"), generate_validator(b"card "));
    }

    #[test]
    fn empty_input_has_known_digest() {
        // SHA-256 of the empty string starts with e3b0c44298fc1c14.
        assert_eq!(generate_validator(b"").as_str(), "\"e3b0c44298fc1c14\"");
    }

    #[test]
    fn if_none_match_handles_lists_and_weak_tags() {
        let validator = generate_validator(b"card");
        let tag = validator.as_str().to_string();

        assert!(validator.matches_if_none_match(&tag));
        assert!(validator.matches_if_none_match(&format!("W/{tag}")));
        assert!(validator.matches_if_none_match(&format!("\"other\", {tag}")));
        assert!(validator.matches_if_none_match("*"));
        assert!(!validator.matches_if_none_match("\"other\""));
        assert!(!validator.matches_if_none_match(validator.opaque()));
    }
}
