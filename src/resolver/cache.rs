//! LRU + TTL resolution cache, keyed by normalized address or a quantized
//! `(lat, lng)` pair.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::boundary::Boundary;

/// Cache key: either a normalized address string or a quantized coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// A normalized free-text address.
    Address(String),
    /// A `(lat, lng)` pair quantized to the configured precision.
    Coordinate((i64, i64)),
}

struct Entry {
    boundary: Boundary,
    inserted_at: Instant,
}

/// LRU-evicting, per-entry-TTL resolution cache.
pub struct ResolutionCache {
    inner: Mutex<LruCache<CacheKey, Entry>>,
    ttl: Duration,
}

impl ResolutionCache {
    /// Construct a cache holding up to `capacity` entries (clamped to at
    /// least 1), each valid for `ttl`.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to at least 1");
        Self { inner: Mutex::new(LruCache::new(capacity)), ttl }
    }

    /// Look up `key`, returning `None` if absent or expired. An expired hit
    /// is evicted on the way out.
    pub fn get(&self, key: &CacheKey) -> Option<Boundary> {
        let mut inner = self.inner.lock();
        let expired = match inner.peek(key) {
            Some(entry) => entry.inserted_at.elapsed() > self.ttl,
            None => return None,
        };
        if expired {
            inner.pop(key);
            return None;
        }
        inner.get(key).map(|entry| entry.boundary.clone())
    }

    /// Insert or replace `key`'s cached boundary, refreshing its TTL clock.
    /// If the cache is at capacity, the least-recently-used entry (oldest
    /// by insertion among those not recently accessed) is evicted.
    pub fn put(&self, key: CacheKey, boundary: Boundary) {
        self.inner.lock().put(key, Entry { boundary, inserted_at: Instant::now() });
    }

    /// Empty the cache entirely.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Current number of live (not necessarily unexpired) entries.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the cache currently holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::single_polygon_boundary;
    use crate::geometry::{Coordinate, Ring};
    use crate::ids::{AuthorityLevel, LayerType};
    use chrono::{TimeZone, Utc};

    fn fixture_boundary(id: &str) -> Boundary {
        single_polygon_boundary(
            id,
            LayerType::Ward,
            "Fixture",
            Ring::new(vec![
                Coordinate::new(0.0, 0.0),
                Coordinate::new(1.0, 0.0),
                Coordinate::new(1.0, 1.0),
                Coordinate::new(0.0, 1.0),
                Coordinate::new(0.0, 0.0),
            ]),
            AuthorityLevel::new(2).unwrap(),
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn miss_then_hit_after_insertion() {
        let cache = ResolutionCache::new(10, Duration::from_secs(60));
        let key = CacheKey::Address("123 main st".to_string());
        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), fixture_boundary("ward-1"));
        assert!(cache.get(&key).is_some());
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = ResolutionCache::new(10, Duration::from_millis(1));
        let key = CacheKey::Address("123 main st".to_string());
        cache.put(key.clone(), fixture_boundary("ward-1"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn capacity_overflow_evicts_the_least_recently_used_entry() {
        let cache = ResolutionCache::new(2, Duration::from_secs(60));
        cache.put(CacheKey::Address("a".to_string()), fixture_boundary("a"));
        cache.put(CacheKey::Address("b".to_string()), fixture_boundary("b"));
        cache.put(CacheKey::Address("c".to_string()), fixture_boundary("c"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&CacheKey::Address("a".to_string())).is_none());
        assert!(cache.get(&CacheKey::Address("c".to_string())).is_some());
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = ResolutionCache::new(10, Duration::from_secs(60));
        cache.put(CacheKey::Address("a".to_string()), fixture_boundary("a"));
        cache.clear();
        assert!(cache.is_empty());
    }
}
