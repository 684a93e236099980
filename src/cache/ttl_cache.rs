//! Time-to-live cache for upstream results.
//!
//! Entries carry their own TTL (defaulting to the cache's) and are treated as
//! absent once expired. Expired entries stay in the map until they are
//! overwritten or [`TtlCache::cleanup`] runs.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use portfolio_guard::cache::TtlCache;
//!
//! let mut cache: TtlCache<String, i64> = TtlCache::new(Duration::from_secs(60));
//!
//! cache.set("market-data".to_string(), 42);
//! assert_eq!(cache.get("market-data"), Some(&42));
//! assert_eq!(cache.remaining_ttl("market-data"), 60);
//! assert_eq!(cache.remaining_ttl("unknown"), 0);
//! ```

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock, ceil_secs};

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    stored_at: u64,
    ttl_ms: u64,
}

impl<V> Entry<V> {
    fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.stored_at)
    }

    fn is_fresh(&self, now: u64) -> bool {
        self.age(now) < self.ttl_ms
    }
}

/// A cache that expires entries after a configurable TTL.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    cache: HashMap<K, Entry<V>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq,
{
    /// Create a new TTL cache reading the system clock.
    ///
    /// `ttl` applies to every entry stored without an explicit TTL.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Create a new TTL cache with an explicit time source.
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache: HashMap::new(),
            ttl,
            clock,
        }
    }

    /// Store a value with the cache's default TTL, replacing any previous entry.
    pub fn set(&mut self, key: K, value: V) {
        self.set_with_ttl(key, value, self.ttl);
    }

    /// Store a value with its own TTL, replacing any previous entry.
    pub fn set_with_ttl(&mut self, key: K, value: V, ttl: Duration) {
        let entry = Entry {
            value,
            stored_at: self.clock.now_ms(),
            ttl_ms: duration_ms(ttl),
        };
        self.cache.insert(key, entry);
    }

    /// Get a reference to a value if it exists and hasn't expired.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now_ms();
        self.cache
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| &entry.value)
    }

    /// Get a mutable reference to a value if it exists and hasn't expired.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now_ms();
        self.cache
            .get_mut(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| &mut entry.value)
    }

    /// Whole seconds of freshness left, rounded up.
    ///
    /// Returns `0` for missing or expired keys, and reaches `0` exactly when
    /// [`get`](Self::get) starts missing.
    pub fn remaining_ttl<Q>(&self, key: &Q) -> u64
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now_ms();
        self.cache.get(key).map_or(0, |entry| {
            ceil_secs(entry.ttl_ms.saturating_sub(entry.age(now)))
        })
    }

    /// Get the age of an entry in the cache.
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    pub fn age<Q>(&self, key: &Q) -> Option<Duration>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now_ms();
        self.cache
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| Duration::from_millis(entry.age(now)))
    }

    /// Remove an entry from the cache.
    ///
    /// Returns the value if it existed and hadn't expired, `None` otherwise.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now_ms();
        self.cache
            .remove(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.value)
    }

    /// Check if a key exists and hasn't expired.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Remove all expired entries from the cache.
    pub fn cleanup(&mut self) {
        let now = self.clock.now_ms();
        self.cache.retain(|_, entry| entry.is_fresh(now));
    }

    /// Get the number of entries in the cache (including expired ones).
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Get the number of non-expired entries.
    pub fn active_count(&self) -> usize {
        let now = self.clock.now_ms();
        self.cache
            .values()
            .filter(|entry| entry.is_fresh(now))
            .count()
    }

    /// Clear all entries from the cache.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Get the default TTL for this cache.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Set a new default TTL.
    ///
    /// Only entries stored afterwards use it; existing entries keep their own TTL.
    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::new(super::MARKET_DATA_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn cache(ttl_ms: u64, clock: &Arc<ManualClock>) -> TtlCache<String, i32> {
        TtlCache::with_clock(Duration::from_millis(ttl_ms), clock.clone())
    }

    #[test]
    fn test_set_and_get() {
        let clock = Arc::new(ManualClock::new(0));
        let mut cache = cache(60_000, &clock);

        cache.set("key1".to_string(), 100);
        assert_eq!(cache.get("key1"), Some(&100));
        assert_eq!(cache.get("key2"), None);
    }

    #[test]
    fn test_expiration() {
        let clock = Arc::new(ManualClock::new(0));
        let mut cache = cache(50, &clock);

        cache.set("key1".to_string(), 100);
        clock.set(49);
        assert!(cache.get("key1").is_some());

        clock.set(50);
        assert!(cache.get("key1").is_none());
    }

    #[test]
    fn test_per_entry_ttl() {
        let clock = Arc::new(ManualClock::new(0));
        let mut cache = cache(60_000, &clock);

        cache.set_with_ttl("short".to_string(), 1, Duration::from_millis(100));
        cache.set("long".to_string(), 2);

        clock.set(100);
        assert!(cache.get("short").is_none());
        assert_eq!(cache.get("long"), Some(&2));
    }

    #[test]
    fn test_remaining_ttl_decays_to_zero_with_expiry() {
        let clock = Arc::new(ManualClock::new(5_000));
        let mut cache = cache(3_000, &clock);
        cache.set("k".to_string(), 7);

        assert_eq!(cache.remaining_ttl("k"), 3);
        clock.set(5_001);
        assert_eq!(cache.remaining_ttl("k"), 3);
        clock.set(6_000);
        assert_eq!(cache.remaining_ttl("k"), 2);
        clock.set(7_999);
        assert_eq!(cache.remaining_ttl("k"), 1);
        assert!(cache.get("k").is_some());

        clock.set(8_000);
        assert_eq!(cache.remaining_ttl("k"), 0);
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_overwrite_resets_stored_at() {
        let clock = Arc::new(ManualClock::new(0));
        let mut cache = cache(1_000, &clock);

        cache.set("k".to_string(), 1);
        clock.set(900);
        cache.set("k".to_string(), 2);
        clock.set(1_500);
        assert_eq!(cache.get("k"), Some(&2));
    }

    #[test]
    fn test_remove() {
        let clock = Arc::new(ManualClock::new(0));
        let mut cache = cache(60_000, &clock);

        cache.set("key1".to_string(), 100);
        assert_eq!(cache.remove("key1"), Some(100));
        assert_eq!(cache.get("key1"), None);
    }

    #[test]
    fn test_cleanup() {
        let clock = Arc::new(ManualClock::new(0));
        let mut cache = cache(50, &clock);

        cache.set("key1".to_string(), 100);
        cache.set("key2".to_string(), 200);
        assert_eq!(cache.len(), 2);

        clock.set(60);

        // Entry still in HashMap but expired
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.active_count(), 0);

        cache.cleanup();
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_age_and_contains() {
        let clock = Arc::new(ManualClock::new(0));
        let mut cache = cache(60_000, &clock);

        cache.set("key1".to_string(), 100);
        clock.set(50);

        assert_eq!(cache.age("key1"), Some(Duration::from_millis(50)));
        assert!(cache.contains("key1"));
        assert!(!cache.contains("key2"));
    }

    #[test]
    fn test_get_mut() {
        let clock = Arc::new(ManualClock::new(0));
        let mut cache = cache(60_000, &clock);

        cache.set("counter".to_string(), 1);
        if let Some(v) = cache.get_mut("counter") {
            *v += 1;
        }
        assert_eq!(cache.get("counter"), Some(&2));
    }
}
