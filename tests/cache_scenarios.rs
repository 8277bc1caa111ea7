use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration as StdDuration;

use bytes::Bytes;
use ogcache::cache::{
    Artifact, ArtifactCache, BoxError, CacheConfig, CacheOptions, CacheStore, KeyParams,
    KeyPattern, Lookup, ManualClock, MemoryStore, generate_key, generate_validator,
};
use serde_json::json;
use time::Duration;

fn counting_cache(coalesce_misses: bool) -> ArtifactCache {
    ArtifactCache::in_memory(CacheConfig {
        coalesce_misses,
        ..Default::default()
    })
}

async fn slow_generate(
    cache: &ArtifactCache,
    calls: &Arc<AtomicUsize>,
) -> ogcache::cache::CacheResponse {
    let calls = Arc::clone(calls);
    cache
        .with_cache(
            "title=Concurrent",
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(StdDuration::from_millis(50)).await;
                Ok::<_, BoxError>(Artifact::from("<svg>concurrent</svg>"))
            },
            &CacheOptions::default(),
        )
        .await
        .expect("generation succeeds")
}

#[test]
fn fingerprints_are_deterministic_and_content_addressed() {
    let a = KeyParams::new().with("title", "Hello").with("theme", "dark");
    let b = KeyParams::new().with("theme", "dark").with("title", "Hello");

    assert_eq!(
        generate_key(&a).expect("key"),
        generate_key(&b).expect("key")
    );
    assert_eq!(
        generate_key(&a).expect("key"),
        generate_key(&json!({ "title": "Hello", "theme": "dark" })).expect("key")
    );
    assert_ne!(
        generate_key(&a).expect("key"),
        generate_key(&KeyParams::new().with("title", "Hello")).expect("key")
    );

    assert_eq!(generate_validator(b"abc"), generate_validator(b"abc"));
    assert_ne!(generate_validator(b"abc"), generate_validator(b"abd"));
}

#[tokio::test]
async fn two_calls_generate_once() {
    let cache = counting_cache(true);
    let calls = Arc::new(AtomicUsize::new(0));

    let first = slow_generate(&cache, &calls).await;
    let second = slow_generate(&cache, &calls).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.etag, second.etag);
    assert_eq!(first.data.to_bytes(), second.data.to_bytes());
}

#[tokio::test]
async fn concurrent_misses_without_coalescing_both_generate() {
    let cache = counting_cache(false);
    let calls = Arc::new(AtomicUsize::new(0));

    let (a, b) = tokio::join!(slow_generate(&cache, &calls), slow_generate(&cache, &calls));

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!a.cached);
    assert!(!b.cached);
    assert_eq!(a.etag, b.etag);
}

#[tokio::test]
async fn concurrent_misses_with_coalescing_generate_once() {
    let cache = counting_cache(true);
    let calls = Arc::new(AtomicUsize::new(0));

    let (a, b) = tokio::join!(slow_generate(&cache, &calls), slow_generate(&cache, &calls));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!a.cached);
    assert!(!b.cached);
    assert_eq!(a.etag, b.etag);
    assert_eq!(cache.in_flight(), 0);

    let third = slow_generate(&cache, &calls).await;
    assert!(third.cached);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn coalesced_callers_share_generator_failure() {
    let cache = counting_cache(true);
    let calls = Arc::new(AtomicUsize::new(0));

    let failing = || {
        let calls = Arc::clone(&calls);
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(StdDuration::from_millis(20)).await;
            Err::<Artifact, _>(std::io::Error::other("renderer crashed"))
        }
    };

    let options = CacheOptions::default();
    let (a, b) = tokio::join!(
        cache.with_cache("broken", failing(), &options),
        cache.with_cache("broken", failing(), &options)
    );

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(a.is_err());
    assert!(b.is_err());
    assert_eq!(cache.in_flight(), 0);
}

#[tokio::test]
async fn abandoned_first_caller_still_completes_and_clears_slot() {
    let cache = counting_cache(true);
    let calls = Arc::new(AtomicUsize::new(0));

    let generation = {
        let calls = Arc::clone(&calls);
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(StdDuration::from_millis(100)).await;
            Ok::<_, BoxError>(Artifact::from("<svg>late</svg>"))
        }
    };
    let abandoned = tokio::time::timeout(
        StdDuration::from_millis(10),
        cache.with_cache("late", generation, &CacheOptions::default()),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(cache.in_flight(), 1);

    tokio::time::sleep(StdDuration::from_millis(200)).await;
    assert_eq!(cache.in_flight(), 0);

    let later = cache
        .with_cache(
            "late",
            || async { Ok::<_, BoxError>(Artifact::from("<svg>other</svg>")) },
            &CacheOptions::default(),
        )
        .await
        .expect("stored by the abandoned generation");
    assert!(later.cached);
    assert_eq!(later.data.to_bytes(), Bytes::from_static(b"<svg>late</svg>"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn entries_expire_after_ttl() {
    let config = CacheConfig::default();
    let store = MemoryStore::new(&config);

    store
        .set("og:short", Bytes::from_static(b"x"), Some(1))
        .await
        .expect("set");
    assert!(store.get("og:short").await.expect("get").is_hit());

    tokio::time::sleep(StdDuration::from_millis(1_100)).await;

    assert!(matches!(
        store.get("og:short").await.expect("get"),
        Lookup::Miss
    ));
    assert!(store.is_empty());
}

#[tokio::test]
async fn staleness_window_is_ninety_percent_of_ttl() {
    let config = CacheConfig::default();
    let clock = ManualClock::default();
    let store = MemoryStore::with_clock(&config, Arc::new(clock.clone()));

    store
        .set("og:window", Bytes::from_static(b"x"), Some(10))
        .await
        .expect("set");

    clock.advance(Duration::seconds(5));
    let fresh = store
        .get("og:window")
        .await
        .expect("get")
        .into_hit()
        .expect("hit");
    assert!(!fresh.stale);

    clock.advance(Duration::milliseconds(4_500));
    let stale = store
        .get("og:window")
        .await
        .expect("get")
        .into_hit()
        .expect("hit");
    assert!(stale.stale);
}

#[tokio::test]
async fn pattern_invalidation_is_selective_and_idempotent() {
    let config = CacheConfig::default();
    let store = MemoryStore::new(&config);
    for key in ["og:a", "og:b", "other:c"] {
        store
            .set(key, Bytes::from_static(b"x"), None)
            .await
            .expect("set");
    }

    let pattern = KeyPattern::parse("^og:", config.max_pattern_len).expect("pattern");
    assert_eq!(store.invalidate(&pattern).await.expect("invalidate"), 2);
    assert_eq!(store.invalidate(&pattern).await.expect("invalidate"), 0);

    assert!(store.get("other:c").await.expect("get").is_hit());
    assert!(!store.get("og:a").await.expect("get").is_hit());
}
