use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use bytes::Bytes;
use metrics_util::debugging::DebuggingRecorder;
use ogcache::cache::{
    Artifact, ArtifactCache, BoxError, CacheConfig, CacheOptions, CacheStore, ManualClock,
    MemoryStore,
};
use ogcache::infra::telemetry::describe_metrics;
use time::Duration;

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    describe_metrics();

    // Store hit/miss/evict/expired
    let config = CacheConfig {
        max_entries: 1,
        ..Default::default()
    };
    let clock = ManualClock::default();
    let store = Arc::new(MemoryStore::with_clock(&config, Arc::new(clock.clone())));

    assert!(!store.get("og:first").await.expect("get").is_hit());
    store
        .set("og:first", Bytes::from_static(b"one"), Some(5))
        .await
        .expect("set");
    assert!(store.get("og:first").await.expect("get").is_hit());
    store
        .set("og:second", Bytes::from_static(b"two"), Some(5))
        .await
        .expect("set");
    clock.advance(Duration::seconds(6));
    assert!(!store.get("og:second").await.expect("get").is_hit());

    // Generation, coalescing and latency through the orchestrator
    let cache = ArtifactCache::with_clock(store, config, Arc::new(clock.clone()));
    let generate = || async {
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        Ok::<_, BoxError>(Artifact::from("<svg/>"))
    };
    let options = CacheOptions::default();
    let (a, b) = tokio::join!(
        cache.with_cache("card", generate, &options),
        cache.with_cache("card", generate, &options)
    );
    assert!(a.is_ok());
    assert!(b.is_ok());

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "ogcache_store_hit_total",
        "ogcache_store_miss_total",
        "ogcache_store_evict_total",
        "ogcache_store_expired_total",
        "ogcache_store_entries",
        "ogcache_store_bytes",
        "ogcache_generate_total",
        "ogcache_generate_ms",
        "ogcache_coalesced_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
