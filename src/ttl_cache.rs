//! Time-bounded LRU cache
//!
//! Entries expire a fixed `ttl` after they were last written. Expired entries
//! are swept lazily: every `get`, `set` and `stats` call first removes all dead
//! entries (O(size), acceptable for the small bounded caches this is used
//! for). Capacity overflow evicts the least-recently-used entry, where both
//! reads and writes count as a use.
//!
//! # Design
//!
//! ```text
//! entries:  HashMap<K, CacheEntry { value, created_at, tick }>
//! recency:  BTreeMap<tick, K>      first = LRU, last = MRU
//! ```
//!
//! Every access assigns the key a fresh, strictly increasing tick, so the
//! recency index never holds duplicates and moving a key to the MRU end is
//! O(log n). Both maps are mutated under one lock, so no caller can observe
//! a key in one but not the other.

use crate::clock::{Clock, SystemClock};
use crate::config::PerfConfig;
use crate::error::ConfigError;
use parking_lot::Mutex;
use serde::Serialize;
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    tick: u64,
}

#[derive(Debug)]
struct CacheInner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    recency: BTreeMap<u64, K>,
    next_tick: u64,
    hits: u64,
    requests: u64,
}

impl<K, V> CacheInner<K, V>
where
    K: Eq + Hash + Clone,
{
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            next_tick: 0,
            hits: 0,
            requests: 0,
        }
    }

    fn bump_tick(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    /// Remove every entry older than `ttl`; returns how many were dropped
    fn sweep(&mut self, now: Instant, ttl: Duration) -> usize {
        let expired: Vec<(K, u64)> = self
            .entries
            .iter()
            .filter(|(_, e)| now.saturating_duration_since(e.created_at) > ttl)
            .map(|(k, e)| (k.clone(), e.tick))
            .collect();

        for (key, tick) in &expired {
            self.entries.remove(key);
            self.recency.remove(tick);
        }
        expired.len()
    }

    fn evict_lru(&mut self) -> Option<K> {
        let (_, key) = self.recency.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// Snapshot of cache occupancy and effectiveness
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Entries currently stored (after sweeping expired ones)
    pub size: usize,
    pub maxsize: usize,
    pub ttl_seconds: f64,
    /// Cumulative hits / lookups since construction or the last `clear`
    pub hit_ratio: f64,
    pub hits: u64,
    pub requests: u64,
}

/// Thread-safe TTL + LRU cache
///
/// Values are returned by clone; store `Arc<T>` to share large payloads
/// without copying them.
///
/// # Example
/// ```
/// use perfcache::ttl_cache::TtlCache;
/// use std::time::Duration;
///
/// let cache = TtlCache::new(2, Duration::from_secs(60)).unwrap();
/// cache.set("a", 1);
/// cache.set("b", 2);
/// assert_eq!(cache.get(&"a"), Some(1));
///
/// // "b" is now least recently used and gets evicted
/// cache.set("c", 3);
/// assert_eq!(cache.get(&"b"), None);
/// assert_eq!(cache.len(), 2);
/// ```
pub struct TtlCache<K, V> {
    inner: Mutex<CacheInner<K, V>>,
    maxsize: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache on the system clock
    pub fn new(maxsize: usize, ttl: Duration) -> Result<Self, ConfigError> {
        Self::with_clock(maxsize, ttl, Arc::new(SystemClock))
    }

    /// Create a cache reading time from `clock`
    pub fn with_clock(
        maxsize: usize,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        if maxsize == 0 {
            return Err(ConfigError::OutOfRange(
                "cache capacity must be > 0".to_string(),
            ));
        }
        if ttl.is_zero() {
            return Err(ConfigError::OutOfRange("cache ttl must be > 0".to_string()));
        }
        Ok(Self {
            inner: Mutex::new(CacheInner::new()),
            maxsize,
            ttl,
            clock,
        })
    }

    /// Create the shared API cache described by `config`
    pub fn from_config(config: &PerfConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        Self::with_clock(config.api_cache_size, config.cache_ttl(), clock)
    }

    pub fn maxsize(&self) -> usize {
        self.maxsize
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a live value and mark it most recently used
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        inner.requests += 1;
        inner.sweep(now, self.ttl);

        let new_tick = inner.next_tick;
        let entry = inner.entries.get_mut(key)?;
        let old_tick = std::mem::replace(&mut entry.tick, new_tick);
        let value = entry.value.clone();

        inner.next_tick += 1;
        inner.hits += 1;
        if let Some(k) = inner.recency.remove(&old_tick) {
            inner.recency.insert(new_tick, k);
        }
        Some(value)
    }

    /// Insert or overwrite, refreshing the entry's age and recency
    pub fn set(&self, key: K, value: V) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        inner.sweep(now, self.ttl);

        let tick = inner.bump_tick();
        let previous = inner.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                created_at: now,
                tick,
            },
        );
        if let Some(old) = previous {
            inner.recency.remove(&old.tick);
        }
        inner.recency.insert(tick, key);

        while inner.entries.len() > self.maxsize {
            if inner.evict_lru().is_none() {
                break;
            }
            debug!("ttl cache evicted least recently used entry");
        }
    }

    /// True if `key` holds a live value; does not count as a use
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        let inner = self.inner.lock();
        inner
            .entries
            .get(key)
            .is_some_and(|e| now.saturating_duration_since(e.created_at) <= self.ttl)
    }

    /// Remove an entry, returning its value if it was still live
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let entry = inner.entries.remove(key)?;
        inner.recency.remove(&entry.tick);

        (now.saturating_duration_since(entry.created_at) <= self.ttl).then_some(entry.value)
    }

    /// Drop every entry and reset the hit counters
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.recency.clear();
        inner.hits = 0;
        inner.requests = 0;
        drop(inner);
        info!("Cache cleared");
    }

    /// Entries currently stored, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.sweep(now, self.ttl);

        CacheStats {
            size: inner.entries.len(),
            maxsize: self.maxsize,
            ttl_seconds: self.ttl.as_secs_f64(),
            hit_ratio: inner.hits as f64 / inner.requests.max(1) as f64,
            hits: inner.hits,
            requests: inner.requests,
        }
    }

    /// Keys from least to most recently used
    pub fn keys_by_recency(&self) -> Vec<K> {
        self.inner.lock().recency.values().cloned().collect()
    }

    /// Verify that the entry map and the recency index agree
    pub fn check_invariants(&self) -> Result<(), String> {
        let inner = self.inner.lock();
        if inner.entries.len() != inner.recency.len() {
            return Err(format!(
                "entries ({}) and recency index ({}) differ in length",
                inner.entries.len(),
                inner.recency.len()
            ));
        }
        if inner.entries.len() > self.maxsize {
            return Err(format!(
                "{} entries exceed maxsize {}",
                inner.entries.len(),
                self.maxsize
            ));
        }
        for (tick, key) in &inner.recency {
            match inner.entries.get(key) {
                Some(entry) if entry.tick == *tick => {}
                Some(entry) => {
                    return Err(format!(
                        "recency tick {} does not match entry tick {}",
                        tick, entry.tick
                    ))
                }
                None => return Err(format!("recency tick {} points at a missing key", tick)),
            }
        }
        Ok(())
    }
}

impl<K, V> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("maxsize", &self.maxsize)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
