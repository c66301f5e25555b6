//! Key-addressed query cache with staleness and explicit invalidation

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

const INVALIDATION_BUFFER: usize = 256;

/// Structured cache key, e.g. `["guest-messages", "<conversation id>"]`.
///
/// Invalidating a key also invalidates every key that extends it, so a
/// scope can be refreshed without enumerating derived keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new(scope: impl Into<String>) -> Self {
        Self(vec![scope.into()])
    }

    /// Append a segment
    pub fn with(mut self, segment: impl fmt::Display) -> Self {
        self.0.push(segment.to_string());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// True if `prefix` is equal to this key or a leading part of it
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn guest_conversations(guest_id: &str) -> Self {
        Self::new("guest-conversations").with(guest_id)
    }

    pub fn guest_messages(conversation_id: &str) -> Self {
        Self::new("guest-messages").with(conversation_id)
    }

    pub fn pending_requests(guest_id: &str) -> Self {
        Self::new("pending-requests").with(guest_id)
    }

    pub fn unread_messages(guest_id: &str) -> Self {
        Self::new("unread-messages").with(guest_id)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(":"))
    }
}

/// Freshness policy for one cached query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Age after which a cached value is refetched on the next read
    pub stale_time: Duration,
    /// Idle time after which an entry is dropped by [`QueryCache::collect_garbage`]
    pub gc_time: Duration,
}

impl CachePolicy {
    pub fn new(stale_time: Duration, gc_time: Duration) -> Self {
        Self {
            stale_time,
            gc_time,
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(5 * 60),
            gc_time: Duration::from_secs(10 * 60),
        }
    }
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub entries: usize,
}

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    policy: CachePolicy,
    fetched_at: Instant,
    last_read: Instant,
    invalidated: bool,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        !self.invalidated && now.duration_since(self.fetched_at) < self.policy.stale_time
    }
}

struct CacheInner {
    entries: Mutex<HashMap<QueryKey, CacheEntry>>,
    events: broadcast::Sender<QueryKey>,
    epoch: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

/// Read-through cache shared by data producers and consumers.
///
/// Cloning is cheap; clones share the same entries and invalidation stream.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(INVALIDATION_BUFFER);
        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(HashMap::new()),
                events,
                epoch: AtomicU64::new(0),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                invalidations: AtomicU64::new(0),
            }),
        }
    }

    /// Return the cached value for `key` if fresh, otherwise run `fetcher`
    /// and cache its result. Fetch errors are returned and nothing is cached.
    pub async fn fetch<T, E, F, Fut>(
        &self,
        key: &QueryKey,
        policy: CachePolicy,
        fetcher: F,
    ) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get::<T>(key) {
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Cache hit: {}", key);
            return Ok(value);
        }

        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Cache miss: {}", key);

        let started_at = self.inner.epoch.load(Ordering::Acquire);
        let value = fetcher().await?;

        // An invalidation that raced the fetch may describe newer data than
        // what we just read, so keep the value but leave it stale.
        let raced = self.inner.epoch.load(Ordering::Acquire) != started_at;
        self.insert(key, policy, value.clone(), raced);

        Ok(value)
    }

    /// Fresh cached value for `key`, if any
    pub fn get<T>(&self, key: &QueryKey) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let now = Instant::now();
        let mut entries = self.inner.entries.lock();
        let entry = entries.get_mut(key)?;
        if !entry.is_fresh(now) {
            return None;
        }
        entry.last_read = now;
        entry.value.downcast_ref::<T>().cloned()
    }

    /// Store a value directly, e.g. after a mutation returned the new row
    pub fn set<T>(&self, key: &QueryKey, policy: CachePolicy, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.insert(key, policy, value, false);
    }

    fn insert<T>(&self, key: &QueryKey, policy: CachePolicy, value: T, invalidated: bool)
    where
        T: Send + Sync + 'static,
    {
        let now = Instant::now();
        self.inner.entries.lock().insert(
            key.clone(),
            CacheEntry {
                value: Arc::new(value),
                policy,
                fetched_at: now,
                last_read: now,
                invalidated,
            },
        );
    }

    /// True if `key` is missing, invalidated, or older than its stale time
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        let now = Instant::now();
        self.inner
            .entries
            .lock()
            .get(key)
            .map(|entry| !entry.is_fresh(now))
            .unwrap_or(true)
    }

    /// Mark every entry under `prefix` stale and notify subscribers.
    ///
    /// One event is emitted per call, even when nothing was cached, so
    /// consumers that have not read yet still learn about the change.
    /// Returns the number of entries marked.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let marked = {
            let mut entries = self.inner.entries.lock();
            let mut marked = 0;
            for (key, entry) in entries.iter_mut() {
                if key.starts_with(prefix) {
                    entry.invalidated = true;
                    marked += 1;
                }
            }
            marked
        };

        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        self.inner.invalidations.fetch_add(1, Ordering::Relaxed);
        // No receivers is fine: nobody is watching yet.
        let _ = self.inner.events.send(prefix.clone());

        debug!("Invalidated {} ({} entries)", prefix, marked);
        marked
    }

    /// Stream of invalidated key prefixes
    pub fn subscribe(&self) -> broadcast::Receiver<QueryKey> {
        self.inner.events.subscribe()
    }

    /// Drop entries that have not been read for their `gc_time`
    pub fn collect_garbage(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.inner.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.last_read) < entry.policy.gc_time);
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Cache GC removed {} entries", removed);
        }
        removed
    }

    /// Run [`QueryCache::collect_garbage`] every `period` until the task is
    /// aborted or the last clone of the cache is dropped.
    pub fn spawn_gc(&self, period: Duration) -> JoinHandle<()> {
        let inner: Weak<CacheInner> = Arc::downgrade(&self.inner);
        let period = period.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                QueryCache { inner }.collect_garbage();
            }
            debug!("Cache GC stopped");
        })
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.inner.entries.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            invalidations: self.inner.invalidations.load(Ordering::Relaxed),
            entries: self.inner.entries.lock().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_prefix_matching() {
        let scope = QueryKey::new("guest-messages");
        let key = QueryKey::guest_messages("c1");

        assert!(key.starts_with(&scope));
        assert!(key.starts_with(&key));
        assert!(!scope.starts_with(&key));
        assert!(!key.starts_with(&QueryKey::guest_messages("c2")));
        assert_eq!(key.to_string(), "guest-messages:c1");
    }

    #[test]
    fn test_invalidate_emits_event_without_entries() {
        let cache = QueryCache::new();
        let mut rx = cache.subscribe();

        assert_eq!(cache.invalidate(&QueryKey::pending_requests("g1")), 0);
        assert_eq!(rx.try_recv().unwrap(), QueryKey::pending_requests("g1"));
        assert_eq!(cache.stats().invalidations, 1);
    }
}
