//! Bounded, time-expiring memo table.
//!
//! Entries live for a fixed TTL from the moment they are stored. Expired
//! entries are dropped lazily on lookup; when the table is full the least
//! recently used entry is evicted. The lock is never held while a value is
//! being computed, so two concurrent misses on the same key may both compute.

use lru::LruCache;
use parking_lot::Mutex;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of "now" for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        match self.created_at.checked_add(self.ttl) {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }
}

/// Hit/miss counters and current size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct TtlLruCache<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, CacheEntry<V>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K: Hash + Eq, V: Clone> TtlLruCache<K, V> {
    /// A capacity of zero is treated as one.
    pub fn with_clock(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Live value for `key`, promoting it to most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let expired = match entries.get(key) {
            Some(entry) if entry.is_live(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store `value` with a fresh timestamp, evicting the LRU entry if full.
    pub fn insert(&self, key: K, value: V) {
        let entry = CacheEntry {
            value,
            created_at: self.clock.now(),
            ttl: self.ttl,
        };
        // `push` hands back whatever it displaced (same key or the LRU entry).
        let _displaced = self.entries.lock().push(key, entry);
    }

    /// Return the live cached value, or run `compute`, store its success, and
    /// return it. Failures are returned as-is and never cached.
    pub async fn get_or_compute<F, Fut, E>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let value = compute().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    /// Timestamp of the stored entry, without touching recency or expiry.
    pub fn created_at(&self, key: &K) -> Option<Instant> {
        self.entries.lock().peek(key).map(|e| e.created_at)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn cache_with_clock(capacity: usize, ttl_secs: u64) -> (TtlLruCache<String, u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = TtlLruCache::with_clock(capacity, Duration::from_secs(ttl_secs), clock.clone());
        (cache, clock)
    }

    #[tokio::test]
    async fn test_hit_skips_compute() {
        let (cache, _clock) = cache_with_clock(10, 60);
        let calls = AtomicUsize::new(0);
        let calls = &calls;

        for _ in 0..3 {
            let v = cache
                .get_or_compute("k".to_string(), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(7)
                })
                .await
                .unwrap();
            assert_eq!(v, 7);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_recomputed_with_fresh_timestamp() {
        let (cache, clock) = cache_with_clock(10, 60);
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let compute = move || async move { Ok::<_, ()>(calls.fetch_add(1, Ordering::SeqCst) as u32) };

        assert_eq!(cache.get_or_compute("k".to_string(), compute).await.unwrap(), 0);
        let first = cache.created_at(&"k".to_string()).unwrap();

        clock.advance(Duration::from_secs(59));
        assert_eq!(cache.get_or_compute("k".to_string(), compute).await.unwrap(), 0);

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get_or_compute("k".to_string(), compute).await.unwrap(), 1);
        let second = cache.created_at(&"k".to_string()).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(second > first);
        assert_eq!(second - first, Duration::from_secs(60));
    }

    #[test]
    fn test_expired_entry_lazily_removed_on_lookup() {
        let (cache, clock) = cache_with_clock(10, 5);
        cache.insert("k".to_string(), 1);
        clock.advance(Duration::from_secs(5));
        assert!(cache.contains(&"k".to_string()));
        assert_eq!(cache.get(&"k".to_string()), None);
        assert!(!cache.contains(&"k".to_string()));
    }

    #[test]
    fn test_lru_eviction_when_full() {
        let (cache, _clock) = cache_with_clock(2, 60);
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);
        // Touch "a" so "b" becomes least recently used.
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        cache.insert("c".to_string(), 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"b".to_string()), None);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"c".to_string()), Some(3));
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let (cache, _clock) = cache_with_clock(10, 60);
        let err = cache
            .get_or_compute("k".to_string(), || async { Err::<u32, _>("boom") })
            .await
            .unwrap_err();
        assert_eq!(err, "boom");
        assert!(cache.is_empty());

        let v = cache
            .get_or_compute("k".to_string(), || async { Ok::<_, &str>(9) })
            .await
            .unwrap();
        assert_eq!(v, 9);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let (cache, _clock) = cache_with_clock(0, 60);
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"b".to_string()), Some(2));
    }
}
