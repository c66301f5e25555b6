// Tests for QueryCache read-through, staleness and invalidation

use concierge_realtime::{CachePolicy, QueryCache, QueryKey};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn policy() -> CachePolicy {
    CachePolicy::new(Duration::from_secs(10), Duration::from_secs(60))
}

async fn counted_fetch(
    cache: &QueryCache,
    key: &QueryKey,
    calls: &Arc<AtomicUsize>,
) -> Result<usize, String> {
    let calls = calls.clone();
    cache
        .fetch(key, policy(), || async move {
            Ok::<_, String>(calls.fetch_add(1, Ordering::SeqCst) + 1)
        })
        .await
}

#[tokio::test]
async fn test_fresh_value_is_served_from_cache() {
    let cache = QueryCache::new();
    let key = QueryKey::guest_messages("c1");
    let calls = Arc::new(AtomicUsize::new(0));

    assert_eq!(counted_fetch(&cache, &key, &calls).await.unwrap(), 1);
    assert_eq!(counted_fetch(&cache, &key, &calls).await.unwrap(), 1);

    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.entries, 1);
}

#[tokio::test]
async fn test_invalidate_forces_refetch() {
    let cache = QueryCache::new();
    let key = QueryKey::guest_messages("c1");
    let calls = Arc::new(AtomicUsize::new(0));

    counted_fetch(&cache, &key, &calls).await.unwrap();
    assert_eq!(cache.invalidate(&key), 1);
    assert!(cache.is_stale(&key));

    assert_eq!(counted_fetch(&cache, &key, &calls).await.unwrap(), 2);
    assert!(!cache.is_stale(&key));
}

#[tokio::test]
async fn test_prefix_invalidation_covers_derived_keys() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let c1 = QueryKey::guest_messages("c1");
    let c2 = QueryKey::guest_messages("c2");
    let other = QueryKey::guest_conversations("g1");

    counted_fetch(&cache, &c1, &calls).await.unwrap();
    counted_fetch(&cache, &c2, &calls).await.unwrap();
    counted_fetch(&cache, &other, &calls).await.unwrap();

    assert_eq!(cache.invalidate(&QueryKey::new("guest-messages")), 2);
    assert!(cache.is_stale(&c1));
    assert!(cache.is_stale(&c2));
    assert!(!cache.is_stale(&other));
}

#[tokio::test]
async fn test_fetch_error_is_not_cached() {
    let cache = QueryCache::new();
    let key = QueryKey::guest_conversations("g1");

    let failed: Result<String, String> = cache
        .fetch(&key, policy(), || async { Err("connection refused".to_string()) })
        .await;
    assert_eq!(failed.unwrap_err(), "connection refused");
    assert!(cache.is_stale(&key));

    let ok: Result<String, String> = cache
        .fetch(&key, policy(), || async { Ok("conversation".to_string()) })
        .await;
    assert_eq!(ok.unwrap(), "conversation");
}

#[tokio::test]
async fn test_invalidation_during_fetch_leaves_entry_stale() {
    let cache = QueryCache::new();
    let key = QueryKey::guest_messages("c1");
    let racing = cache.clone();
    let racing_key = key.clone();

    let value: Result<u32, String> = cache
        .fetch(&key, policy(), || async move {
            racing.invalidate(&racing_key);
            Ok(7)
        })
        .await;

    assert_eq!(value.unwrap(), 7);
    assert!(cache.is_stale(&key));
}

#[tokio::test(start_paused = true)]
async fn test_stale_time_and_gc() {
    let cache = QueryCache::new();
    let key = QueryKey::guest_messages("c1");
    let calls = Arc::new(AtomicUsize::new(0));

    counted_fetch(&cache, &key, &calls).await.unwrap();
    tokio::time::advance(Duration::from_secs(11)).await;
    assert!(cache.is_stale(&key));
    assert_eq!(counted_fetch(&cache, &key, &calls).await.unwrap(), 2);

    assert_eq!(cache.collect_garbage(), 0);
    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(cache.collect_garbage(), 1);
    assert_eq!(cache.stats().entries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_gc_task_drops_idle_entries() {
    let cache = QueryCache::new();
    let gc = cache.spawn_gc(Duration::from_secs(30));
    let idle = QueryKey::guest_messages("c1");
    let busy = QueryKey::guest_messages("c2");
    let calls = Arc::new(AtomicUsize::new(0));

    counted_fetch(&cache, &idle, &calls).await.unwrap();
    counted_fetch(&cache, &busy, &calls).await.unwrap();
    assert_eq!(cache.stats().entries, 2);

    // Keep one entry warm while the other sits past its gc time
    for _ in 0..4 {
        tokio::time::sleep(Duration::from_secs(9)).await;
        counted_fetch(&cache, &busy, &calls).await.unwrap();
    }
    tokio::time::sleep(Duration::from_secs(60)).await;
    counted_fetch(&cache, &busy, &calls).await.unwrap();

    assert_eq!(cache.stats().entries, 1);
    assert!(cache.is_stale(&idle));
    assert!(!cache.is_stale(&busy));

    gc.abort();
}

#[tokio::test]
async fn test_invalidation_stream_reports_each_call() {
    let cache = QueryCache::new();
    let mut events = cache.subscribe();

    cache.invalidate(&QueryKey::guest_messages("c1"));
    cache.invalidate(&QueryKey::unread_messages("g1"));

    assert_eq!(events.recv().await.unwrap(), QueryKey::guest_messages("c1"));
    assert_eq!(events.recv().await.unwrap(), QueryKey::unread_messages("g1"));
}

#[test]
fn test_set_and_clear() {
    let cache = QueryCache::new();
    let key = QueryKey::guest_conversations("g1");

    cache.set(&key, policy(), "row".to_string());
    assert_eq!(cache.get::<String>(&key), Some("row".to_string()));
    assert_eq!(cache.get::<u32>(&key), None);

    cache.clear();
    assert_eq!(cache.get::<String>(&key), None);
}
