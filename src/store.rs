//! Bounded in-memory response store with per-entry TTL and LRU eviction.
//!
//! Both the entry map and the access-order map live behind a single mutex so a
//! read's access-time update can never interleave with an eviction pass.
//! Expired entries are dropped lazily on read and eagerly before every write.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Stored value with its creation time and lifetime.
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        CacheEntry {
            value,
            created_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }
}

/// Mutable state guarded by the store lock.
///
/// `access` maps every live key to a logical access tick. Ticks come from a
/// counter that only moves forward, so recency order is total and eviction
/// never has to break ties.
struct StoreState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    access: HashMap<String, u64>,
    clock: u64,
}

impl<V> StoreState<V> {
    fn new() -> Self {
        StoreState {
            entries: HashMap::new(),
            access: HashMap::new(),
            clock: 0,
        }
    }

    fn touch(&mut self, key: &str) {
        self.clock += 1;
        match self.access.get_mut(key) {
            Some(tick) => *tick = self.clock,
            None => {
                self.access.insert(key.to_string(), self.clock);
            }
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        self.access.remove(key);
        self.entries.remove(key).is_some()
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    fn evict_lru(&mut self) -> Option<String> {
        let victim = self
            .access
            .iter()
            .min_by_key(|(_, tick)| **tick)
            .map(|(key, _)| key.clone())?;
        self.remove(&victim);
        Some(victim)
    }

    fn remove_matching<P: Fn(&str) -> bool>(&mut self, predicate: P) -> usize {
        let matched: Vec<String> = self
            .entries
            .keys()
            .filter(|key| predicate(key))
            .cloned()
            .collect();

        for key in &matched {
            self.remove(key);
        }
        matched.len()
    }
}

/// Thread-safe key/value store with TTL expiry and bounded size.
///
/// # Example
///
/// ```
/// use hotel_kit::store::CacheStore;
/// use std::time::Duration;
///
/// let store = CacheStore::new(2, Duration::from_secs(100));
/// store.set("a", 1, None);
/// store.set("b", 2, None);
/// assert_eq!(store.get("a"), Some(1)); // "a" is now the most recent
///
/// store.set("c", 3, None); // evicts "b"
/// assert_eq!(store.get("b"), None);
/// assert_eq!(store.size(), 2);
/// ```
pub struct CacheStore<V> {
    state: Mutex<StoreState<V>>,
    max_size: usize,
    default_ttl: Duration,
}

impl<V: Clone> CacheStore<V> {
    /// Create a store holding at most `max_size` entries (minimum 1).
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        if max_size == 0 {
            warn!("CacheStore created with max_size 0, using 1");
        }

        CacheStore {
            state: Mutex::new(StoreState::new()),
            max_size: max_size.max(1),
            default_ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a live entry, refreshing its recency on a hit.
    ///
    /// An expired entry is removed and reported as absent.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut state = self.lock();

        let expired = match state.entries.get(key) {
            None => return None,
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            state.remove(key);
            debug!("✓ Store GET {} -> EXPIRED", key);
            return None;
        }

        state.touch(key);
        state.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Insert or overwrite `key`.
    ///
    /// Expired entries are purged first. When the store is full and `key` is
    /// new, the least recently accessed key is evicted. A missing `ttl` uses
    /// the store default.
    pub fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        let now = Instant::now();
        let ttl = ttl.unwrap_or(self.default_ttl);
        let mut state = self.lock();

        let purged = state.purge_expired(now);
        if purged > 0 {
            debug!("Store purged {} expired entries", purged);
        }

        if state.entries.len() >= self.max_size && !state.entries.contains_key(key) {
            if let Some(victim) = state.evict_lru() {
                debug!("Store evicted LRU key {}", victim);
            }
        }

        state.entries.insert(key.to_string(), CacheEntry::new(value, ttl));
        state.touch(key);

        assert!(
            state.entries.len() <= self.max_size,
            "cache store holds {} entries, capacity is {}",
            state.entries.len(),
            self.max_size
        );
        debug!("✓ Store SET {} (TTL: {:?})", key, ttl);
    }

    /// Remove a single key. Returns whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.lock().remove(key)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.access.clear();
        warn!("⚠ Store CLEAR executed - all entries dropped");
    }

    /// Remove every key containing `pattern`. Returns the number removed.
    pub fn invalidate_by_substring(&self, pattern: &str) -> usize {
        let removed = self.lock().remove_matching(|key| key.contains(pattern));
        debug!("Store invalidated {} keys matching '{}'", removed, pattern);
        removed
    }

    /// Remove every key starting with `prefix`. Returns the number removed.
    pub fn invalidate_by_prefix(&self, prefix: &str) -> usize {
        let removed = self.lock().remove_matching(|key| key.starts_with(prefix));
        debug!("Store invalidated {} keys with prefix '{}'", removed, prefix);
        removed
    }

    /// Number of stored entries, including ones that expired but were not yet swept.
    pub fn size(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Snapshot of store bounds and occupancy.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            size: self.size(),
            max_size: self.max_size,
            default_ttl_secs: self.default_ttl.as_secs(),
        }
    }
}

/// Store statistics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub size: usize,
    pub max_size: usize,
    pub default_ttl_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_store_set_get() {
        let store = CacheStore::new(10, Duration::from_secs(60));
        store.set("key1", "value1".to_string(), None);

        assert_eq!(store.get("key1"), Some("value1".to_string()));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn test_lru_eviction_respects_reads() {
        let store = CacheStore::new(2, Duration::from_secs(100));
        store.set("a", 1, None);
        store.set("b", 2, None);
        assert_eq!(store.get("a"), Some(1));

        store.set("c", 3, None);

        assert_eq!(store.get("a"), Some(1));
        assert_eq!(store.get("b"), None);
        assert_eq!(store.get("c"), Some(3));
        assert_eq!(store.size(), 2);
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let store = CacheStore::new(2, Duration::from_secs(100));
        store.set("a", 1, None);
        store.set("b", 2, None);
        store.set("a", 10, None);

        assert_eq!(store.size(), 2);
        assert_eq!(store.get("a"), Some(10));
        assert_eq!(store.get("b"), Some(2));
    }

    #[test]
    fn test_eviction_without_reads_is_insertion_order() {
        let store = CacheStore::new(3, Duration::from_secs(100));
        for (i, key) in ["k1", "k2", "k3", "k4"].iter().enumerate() {
            store.set(key, i, None);
        }

        assert_eq!(store.get("k1"), None);
        assert_eq!(store.size(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_without_sweep() {
        let store = CacheStore::new(10, Duration::from_secs(100));
        store.set("short", 1, Some(Duration::from_secs(5)));
        store.set("long", 2, None);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(store.get("short"), Some(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("short"), None);
        assert_eq!(store.get("long"), Some(2));
        // Lazy expiry removed it on read
        assert_eq!(store.size(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_purges_expired_before_evicting() {
        let store = CacheStore::new(2, Duration::from_secs(100));
        store.set("stale", 1, Some(Duration::from_secs(1)));
        store.set("fresh", 2, None);

        tokio::time::advance(Duration::from_secs(2)).await;
        store.set("new", 3, None);

        // The expired entry made room; the live one survives
        assert_eq!(store.get("fresh"), Some(2));
        assert_eq!(store.get("new"), Some(3));
        assert_eq!(store.size(), 2);
    }

    #[test]
    fn test_invalidate_by_substring() {
        let store = CacheStore::new(10, Duration::from_secs(60));
        store.set("hotels:abc", 1, None);
        store.set("hotels:def", 2, None);
        store.set("offers:abc", 3, None);

        assert_eq!(store.invalidate_by_substring("abc"), 2);
        assert_eq!(store.get("hotels:def"), Some(2));
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn test_invalidate_by_prefix() {
        let store = CacheStore::new(10, Duration::from_secs(60));
        store.set("hotels:abc", 1, None);
        store.set("offers:hotels:", 2, None);

        assert_eq!(store.invalidate_by_prefix("hotels:"), 1);
        assert_eq!(store.get("offers:hotels:"), Some(2));
    }

    #[test]
    fn test_clear_and_stats() {
        let store = CacheStore::new(5, Duration::from_secs(300));
        store.set("a", 1, None);
        store.set("b", 2, None);

        assert_eq!(
            store.stats(),
            StoreStats {
                size: 2,
                max_size: 5,
                default_ttl_secs: 300,
            }
        );

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.get("a"), None);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let store = CacheStore::new(0, Duration::from_secs(60));
        store.set("a", 1, None);
        store.set("b", 2, None);
        assert_eq!(store.max_size(), 1);
        assert_eq!(store.size(), 1);
        assert_eq!(store.get("b"), Some(2));
    }

    #[test]
    fn test_store_thread_safe() {
        let store = Arc::new(CacheStore::new(64, Duration::from_secs(60)));
        let mut handles = vec![];

        for t in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    let key = format!("key_{}_{}", t, i % 16);
                    store.set(&key, i, None);
                    let _ = store.get(&key);
                }
            }));
        }

        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        assert!(store.size() <= 64);
    }
}
