//! HTTP caching header synthesis.

use axum::http::{
    HeaderMap, HeaderName, HeaderValue,
    header::{AGE, CACHE_CONTROL, ETAG, LAST_MODIFIED, VARY},
};
use time::{OffsetDateTime, UtcOffset, macros::format_description};

use super::config::{
    CacheConfig, DEFAULT_HEADER_TTL_SECS, DEFAULT_STALE_WHILE_REVALIDATE_SECS, DEFAULT_VARY,
};
use super::validator::Validator;

pub const X_CACHE_STATUS: HeaderName = HeaderName::from_static("x-cache-status");
pub const X_CACHE_STALE: HeaderName = HeaderName::from_static("x-cache-stale");
pub const CDN_CACHE_CONTROL: HeaderName = HeaderName::from_static("cdn-cache-control");
pub const SURROGATE_CONTROL: HeaderName = HeaderName::from_static("surrogate-control");
pub const CACHE_TAG: HeaderName = HeaderName::from_static("cache-tag");

/// Downstream caching policy for one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl_secs: u64,
    pub stale_while_revalidate_secs: u64,
    /// Surrogate keys for CDN bulk purges.
    pub tags: Vec<String>,
    pub vary: Option<String>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_HEADER_TTL_SECS,
            stale_while_revalidate_secs: DEFAULT_STALE_WHILE_REVALIDATE_SECS,
            tags: Vec::new(),
            vary: Some(DEFAULT_VARY.to_string()),
        }
    }
}

impl CachePolicy {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            ttl_secs: config.header_ttl_secs,
            stale_while_revalidate_secs: config.stale_while_revalidate_secs,
            tags: Vec::new(),
            vary: (!config.vary.is_empty()).then(|| config.vary.clone()),
        }
    }

    pub fn cache_control(&self) -> String {
        format!(
            "public, max-age={ttl}, s-maxage={ttl}, stale-while-revalidate={swr}, immutable",
            ttl = self.ttl_secs,
            swr = self.stale_while_revalidate_secs,
        )
    }
}

/// Build the `Cache-Control` family of headers for a policy.
pub fn cache_headers(policy: &CachePolicy) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Ok(value) = HeaderValue::from_str(&policy.cache_control()) {
        headers.insert(CACHE_CONTROL, value.clone());
        headers.insert(CDN_CACHE_CONTROL, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("max-age={}", policy.ttl_secs)) {
        headers.insert(SURROGATE_CONTROL, value);
    }

    let tags: Vec<&str> = policy
        .tags
        .iter()
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty() && !tag.contains(','))
        .collect();
    if !tags.is_empty()
        && let Ok(value) = HeaderValue::from_str(&tags.join(","))
    {
        headers.insert(CACHE_TAG, value);
    }

    if let Some(vary) = policy.vary.as_deref().filter(|vary| !vary.is_empty())
        && let Ok(value) = HeaderValue::from_str(vary)
    {
        headers.insert(VARY, value);
    }

    headers
}

/// Validator headers attached to every orchestrated response.
pub(crate) fn insert_validator_headers(
    headers: &mut HeaderMap,
    validator: &Validator,
    last_modified: OffsetDateTime,
) {
    if let Ok(value) = HeaderValue::from_str(validator.as_str()) {
        headers.insert(ETAG, value);
    }
    if let Some(value) = http_date(last_modified).and_then(|date| HeaderValue::from_str(&date).ok())
    {
        headers.insert(LAST_MODIFIED, value);
    }
}

pub(crate) fn insert_age(headers: &mut HeaderMap, age_secs: u64) {
    headers.insert(AGE, HeaderValue::from(age_secs));
}

/// Format a timestamp as an IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`).
pub fn http_date(timestamp: OffsetDateTime) -> Option<String> {
    timestamp
        .to_offset(UtcOffset::UTC)
        .format(format_description!(
            "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
        ))
        .ok()
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn header<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
        headers.get(name).and_then(|value| value.to_str().ok())
    }

    #[test]
    fn default_policy_is_one_year_with_one_day_swr() {
        let headers = cache_headers(&CachePolicy::default());

        assert_eq!(
            header(&headers, &CACHE_CONTROL),
            Some(
                "public, max-age=31536000, s-maxage=31536000, stale-while-revalidate=86400, immutable"
            )
        );
        assert_eq!(
            header(&headers, &CDN_CACHE_CONTROL),
            header(&headers, &CACHE_CONTROL)
        );
        assert_eq!(header(&headers, &SURROGATE_CONTROL), Some("max-age=31536000"));
        assert_eq!(header(&headers, &VARY), Some("User-Agent"));
        assert!(headers.get(CACHE_TAG).is_none());
    }

    #[test]
    fn tags_are_comma_joined() {
        let policy = CachePolicy {
            ttl_secs: 60,
            stale_while_revalidate_secs: 30,
            tags: vec!["og".into(), " post-42 ".into(), "".into(), "bad,tag".into()],
            vary: Some("Accept".into()),
        };
        let headers = cache_headers(&policy);

        assert_eq!(header(&headers, &CACHE_TAG), Some("og,post-42"));
        assert_eq!(header(&headers, &VARY), Some("Accept"));
        assert_eq!(
            header(&headers, &CACHE_CONTROL),
            Some("public, max-age=60, s-maxage=60, stale-while-revalidate=30, immutable")
        );
    }

    #[test]
    fn empty_vary_is_omitted() {
        let policy = CachePolicy {
            vary: None,
            ..Default::default()
        };
        assert!(cache_headers(&policy).get(VARY).is_none());

        let config = CacheConfig {
            vary: String::new(),
            ..Default::default()
        };
        assert!(CachePolicy::from_config(&config).vary.is_none());
    }

    #[test]
    fn http_date_is_imf_fixdate() {
        let timestamp = datetime!(1994-11-06 08:49:37 UTC);
        assert_eq!(
            http_date(timestamp).as_deref(),
            Some("Sun, 06 Nov 1994 08:49:37 GMT")
        );
    }

    #[test]
    fn http_date_normalizes_offsets() {
        let timestamp = datetime!(1994-11-06 10:49:37 +02:00);
        assert_eq!(
            http_date(timestamp).as_deref(),
            Some("Sun, 06 Nov 1994 08:49:37 GMT")
        );
    }
}
