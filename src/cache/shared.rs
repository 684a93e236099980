//! Cloneable, thread-safe handle over a [`TtlCache`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::cache::{MARKET_DATA_TTL, TtlCache};
use crate::clock::{Clock, SystemClock};

/// A string-keyed TTL cache shared between request handlers.
///
/// Reads return clones so no lock is held while the caller uses the value.
/// Concurrent misses may both fetch upstream; the last `set` wins.
#[derive(Debug)]
pub struct SharedTtlCache<V> {
    inner: Arc<Mutex<TtlCache<String, V>>>,
}

impl<V> Clone for SharedTtlCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V: Clone> SharedTtlCache<V> {
    /// Create a shared cache reading the system clock.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Create a shared cache with an explicit time source.
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TtlCache::with_clock(ttl, clock))),
        }
    }

    /// The market-data cache, refreshed at most once per [`MARKET_DATA_TTL`].
    pub fn market_data() -> Self {
        Self::new(MARKET_DATA_TTL)
    }

    fn lock(&self) -> MutexGuard<'_, TtlCache<String, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// See [`TtlCache::set`].
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.lock().set(key.into(), value);
    }

    /// See [`TtlCache::set_with_ttl`].
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.lock().set_with_ttl(key.into(), value, ttl);
    }

    /// Clone of the fresh value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<V> {
        self.lock().get(key).cloned()
    }

    /// Fresh value and its remaining TTL in seconds, read under one lock.
    pub fn get_with_ttl(&self, key: &str) -> Option<(V, u64)> {
        let cache = self.lock();
        cache
            .get(key)
            .cloned()
            .map(|value| (value, cache.remaining_ttl(key)))
    }

    /// See [`TtlCache::remaining_ttl`].
    pub fn remaining_ttl(&self, key: &str) -> u64 {
        self.lock().remaining_ttl(key)
    }

    /// See [`TtlCache::remove`].
    pub fn remove(&self, key: &str) -> Option<V> {
        self.lock().remove(key)
    }

    /// See [`TtlCache::cleanup`].
    pub fn cleanup(&self) {
        self.lock().cleanup();
    }

    /// See [`TtlCache::active_count`].
    pub fn active_count(&self) -> usize {
        self.lock().active_count()
    }
}
