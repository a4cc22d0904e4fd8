//! In-process cache backend.
//!
//! Keys are spread over a fixed number of shards, each behind its own
//! `RwLock`, so operations on keys in different shards never contend. Entries
//! carry an expiry instant checked on read; every `set` sweeps the expired
//! entries of the shard it writes to.

use crate::ports::cache_port::{CacheError, MetricCachePort};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

pub const DEFAULT_SHARDS: usize = 16;

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug)]
pub struct MemoryCacheAdapter {
    shards: Vec<RwLock<HashMap<String, CacheEntry>>>,
}

impl MemoryCacheAdapter {
    pub fn new(shards: usize) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, key: &str) -> &RwLock<HashMap<String, CacheEntry>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }
}

impl Default for MemoryCacheAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}

impl MetricCachePort for MemoryCacheAdapter {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let map = self.shard(key).read();
        Ok(map
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.payload.clone()))
    }

    fn set(&self, key: &str, payload: String, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| CacheError::Payload {
                key: key.to_string(),
                reason: format!("ttl {ttl:?} overflows the clock"),
            })?;
        let now = Instant::now();
        let mut map = self.shard(key).write();
        map.retain(|_, entry| entry.is_live(now));
        map.insert(key.to_string(), CacheEntry { payload, expires_at });
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.shard(key).write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    impl MemoryCacheAdapter {
        fn len(&self) -> usize {
            self.shards.iter().map(|shard| shard.read().len()).sum()
        }

        fn shard_count(&self) -> usize {
            self.shards.len()
        }
    }

    #[test]
    fn miss_then_hit() {
        let cache = MemoryCacheAdapter::default();
        assert_eq!(cache.get("a").unwrap(), None);

        cache.set("a", "one".into(), Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get("a").unwrap().as_deref(), Some("one"));

        cache.set("a", "two".into(), Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get("a").unwrap().as_deref(), Some("two"));
    }

    #[test]
    fn delete_removes_entry() {
        let cache = MemoryCacheAdapter::new(4);
        cache.set("a", "one".into(), Duration::from_secs(60)).unwrap();
        cache.delete("a").unwrap();
        assert_eq!(cache.get("a").unwrap(), None);
        cache.delete("never-set").unwrap();
    }

    #[test]
    fn zero_ttl_is_never_served() {
        let cache = MemoryCacheAdapter::new(1);
        cache.set("a", "one".into(), Duration::ZERO).unwrap();
        assert_eq!(cache.get("a").unwrap(), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn set_sweeps_expired_entries() {
        let cache = MemoryCacheAdapter::new(1);
        cache.set("short", "x".into(), Duration::from_millis(20)).unwrap();
        cache.set("long", "y".into(), Duration::from_secs(60)).unwrap();
        thread::sleep(Duration::from_millis(40));

        assert_eq!(cache.get("short").unwrap(), None);
        assert_eq!(cache.len(), 2);

        cache.set("next", "z".into(), Duration::from_secs(60)).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("long").unwrap().as_deref(), Some("y"));
    }

    #[test]
    fn churn_does_not_grow_the_map() {
        let cache = MemoryCacheAdapter::new(1);
        for i in 0..100 {
            cache
                .set(&format!("k{i}"), i.to_string(), Duration::ZERO)
                .unwrap();
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn shard_count_at_least_one() {
        assert_eq!(MemoryCacheAdapter::new(0).shard_count(), 1);
        assert_eq!(MemoryCacheAdapter::default().shard_count(), DEFAULT_SHARDS);
    }

    #[test]
    fn concurrent_writers_on_distinct_keys() {
        let cache = Arc::new(MemoryCacheAdapter::new(8));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..50 {
                        let key = format!("t{t}-{i}");
                        cache.set(&key, key.clone(), Duration::from_secs(60)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 400);
        assert_eq!(cache.get("t3-17").unwrap().as_deref(), Some("t3-17"));
    }
}
