//! Expiring lookup cache shared by the reputation client
//!
//! Entries live for a fixed TTL. When the cache is full the oldest tenth of
//! the entries is evicted before inserting.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};
use parking_lot::RwLock;

/// Swappable key/value cache with expiry
pub trait ExpiringCache<K, V>: Send + Sync {
    /// Fresh value for `key`, if any
    fn get(&self, key: &K) -> Option<V>;
    fn insert(&self, key: K, value: V);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct CachedEntry<V> {
    value: V,
    cached_at: Instant,
}

/// In-process TTL cache
pub struct TtlCache<K, V> {
    ttl: Duration,
    max_entries: usize,
    entries: RwLock<HashMap<K, CachedEntry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn evict_oldest(entries: &mut HashMap<K, CachedEntry<V>>, max_entries: usize) {
        let mut ages: Vec<_> = entries
            .iter()
            .map(|(k, v)| (k.clone(), v.cached_at))
            .collect();
        ages.sort_by(|a, b| a.1.cmp(&b.1));

        let to_remove = (max_entries / 10).max(1);
        for (key, _) in ages.into_iter().take(to_remove) {
            entries.remove(&key);
        }
    }
}

impl<K, V> ExpiringCache<K, V> for TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|entry| entry.cached_at.elapsed() < self.ttl)
            .map(|entry| entry.value.clone())
    }

    fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.write();

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            // Expired entries go first, then the oldest live ones
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.cached_at.elapsed() < ttl);
            if entries.len() >= self.max_entries {
                Self::evict_oldest(&mut entries, self.max_entries);
            }
        }

        entries.insert(key, CachedEntry {
            value,
            cached_at: Instant::now(),
        });
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_fresh_values() {
        let cache = TtlCache::new(Duration::from_secs(60), 10);
        cache.insert("8.8.8.8".to_string(), 42u8);
        assert_eq!(cache.get(&"8.8.8.8".to_string()), Some(42));
        assert_eq!(cache.get(&"1.1.1.1".to_string()), None);
    }

    #[test]
    fn expired_values_are_misses() {
        let cache = TtlCache::new(Duration::from_millis(0), 10);
        cache.insert(1u32, "stale");
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn full_cache_evicts_oldest_tenth() {
        let cache = TtlCache::new(Duration::from_secs(60), 20);
        for i in 0..20u32 {
            cache.insert(i, i);
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(cache.len(), 20);

        cache.insert(100, 100);
        assert_eq!(cache.len(), 19);
        assert_eq!(cache.get(&0), None);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(2));
        assert_eq!(cache.get(&100), Some(100));
    }

    #[test]
    fn overwriting_a_key_does_not_evict() {
        let cache = TtlCache::new(Duration::from_secs(60), 2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), Some(3));
    }
}
