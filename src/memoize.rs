//! Memoizing call wrapper over [`TtlCache`]
//!
//! Only successful results are stored. Presence in the cache is decided by
//! the cache's own `Option`, so a memoized value that is itself empty (an
//! empty `Vec`, `None`, `0`) is still a hit and is never recomputed.
//!
//! The lookup and the store are two separate critical sections. Two threads
//! that miss on the same key at the same time will both run the operation;
//! the later store wins. There is no single-flight guarantee.

use crate::ttl_cache::TtlCache;
use std::hash::Hash;
use tracing::trace;

/// Return the cached value for `key`, or run `op` once and cache its `Ok`
///
/// # Example
/// ```
/// use perfcache::memoize::cached_call;
/// use perfcache::ttl_cache::TtlCache;
/// use std::time::Duration;
///
/// let cache = TtlCache::new(16, Duration::from_secs(60)).unwrap();
/// let first: Result<u32, String> = cached_call(&cache, "answer".to_string(), || Ok(42));
/// let second: Result<u32, String> =
///     cached_call(&cache, "answer".to_string(), || Err("not called".into()));
/// assert_eq!(first, Ok(42));
/// assert_eq!(second, Ok(42));
/// ```
pub fn cached_call<K, V, E, F>(cache: &TtlCache<K, V>, key: K, op: F) -> Result<V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
    F: FnOnce() -> Result<V, E>,
{
    if let Some(hit) = cache.get(&key) {
        return Ok(hit);
    }

    trace!("cache miss, invoking operation");
    let value = op()?;
    cache.set(key, value.clone());
    Ok(value)
}

/// [`cached_call`] for operations that cannot fail
pub fn cached_call_infallible<K, V, F>(cache: &TtlCache<K, V>, key: K, op: F) -> V
where
    K: Eq + Hash + Clone,
    V: Clone,
    F: FnOnce() -> V,
{
    match cached_call::<_, _, std::convert::Infallible, _>(cache, key, || Ok(op())) {
        Ok(value) => value,
        Err(never) => match never {},
    }
}
