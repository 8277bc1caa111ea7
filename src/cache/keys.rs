//! Request fingerprints.
//!
//! A [`CacheKey`] is the truncated SHA-256 of a canonical JSON rendering of the
//! request parameters. `serde_json::Map` keeps object keys ordered, so two
//! parameter sets that differ only in insertion order produce the same key.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::error::CacheError;

/// Number of hex characters kept from the digest.
pub const KEY_HEX_LEN: usize = 16;

/// Opaque fingerprint of a parameter set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap an already-derived key string (e.g. a caller-chosen raw key).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix the key with a consumer namespace: `<namespace>:<key>`.
    pub fn namespaced(&self, namespace: &str) -> String {
        namespaced(namespace, &self.0)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub(crate) fn namespaced(namespace: &str, key: &str) -> String {
    if namespace.is_empty() {
        key.to_string()
    } else {
        format!("{namespace}:{key}")
    }
}

/// Ordered parameter builder for fingerprinting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyParams {
    params: Map<String, Value>,
}

impl KeyParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.params.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn fingerprint(&self) -> Result<CacheKey, CacheError> {
        generate_key(&self.params)
    }
}

impl<K, V> FromIterator<(K, V)> for KeyParams
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

impl Serialize for KeyParams {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.params.serialize(serializer)
    }
}

/// Derive the fingerprint for any serializable parameter set.
pub fn generate_key<T: Serialize + ?Sized>(params: &T) -> Result<CacheKey, CacheError> {
    let canonical = canonical_json(params)?;
    let digest = Sha256::digest(canonical.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(KEY_HEX_LEN);
    Ok(CacheKey(hex))
}

/// Render parameters as compact JSON with every object's keys sorted.
pub fn canonical_json<T: Serialize + ?Sized>(params: &T) -> Result<String, CacheError> {
    let value = sort_value(serde_json::to_value(params)?);
    Ok(serde_json::to_string(&value)?)
}

// `Map` is ordered unless serde_json's `preserve_order` feature gets unified in
// by another crate, so sort explicitly.
fn sort_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(name, inner)| (name, sort_value(inner)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_value).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use serde_json::json;

    use super::*;

    #[test]
    fn insertion_order_does_not_change_key() {
        let a = KeyParams::new()
            .with("title", "Hello")
            .with("template", "post")
            .with("theme", "dark");
        let b = KeyParams::new()
            .with("theme", "dark")
            .with("title", "Hello")
            .with("template", "post");

        assert_eq!(
            a.fingerprint().expect("key a"),
            b.fingerprint().expect("key b")
        );
    }

    #[test]
    fn hash_map_and_struct_agree() {
        #[derive(Serialize)]
        struct Card<'a> {
            title: &'a str,
            theme: &'a str,
        }

        let mut map = HashMap::new();
        map.insert("theme", "light");
        map.insert("title", "Notes");

        let from_map = generate_key(&map).expect("map key");
        let from_struct = generate_key(&Card {
            title: "Notes",
            theme: "light",
        })
        .expect("struct key");

        assert_eq!(from_map, from_struct);
    }

    #[test]
    fn key_is_sixteen_hex_chars() {
        let key = generate_key(&json!({ "title": "Hello" })).expect("key");
        assert_eq!(key.as_str().len(), KEY_HEX_LEN);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_params_produce_different_keys() {
        let a = generate_key(&json!({ "title": "Hello" })).expect("a");
        let b = generate_key(&json!({ "title": "Hello!" })).expect("b");
        let c = generate_key(&json!({ "title": "Hello", "theme": "dark" })).expect("c");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn nested_objects_are_canonicalized() {
        let a = json!({ "style": { "font": "serif", "size": 64 } });
        let b = json!({ "style": { "size": 64, "font": "serif" } });
        assert_eq!(
            canonical_json(&a).expect("a"),
            r#"{"style":{"font":"serif","size":64}}"#
        );
        assert_eq!(generate_key(&a).expect("a"), generate_key(&b).expect("b"));
    }

    #[test]
    fn non_string_map_keys_are_rejected() {
        let mut params = BTreeMap::new();
        params.insert(vec![1u8, 2], "value");

        let err = generate_key(&params).expect_err("tuple keys cannot be serialized");
        assert!(matches!(err, CacheError::Serialization(_)));
    }

    #[test]
    fn namespaced_key_uses_colon_separator() {
        let key = CacheKey::from_raw("title=Hello");
        assert_eq!(key.namespaced("og-image"), "og-image:title=Hello");
        assert_eq!(key.namespaced(""), "title=Hello");
    }
}
