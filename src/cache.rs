//! Bounded TTL cache for contextual query results.
//!
//! Keys embed the user scope unconditionally — an unscoped query and a
//! scoped one can never collide, and two users can never share an entry.
//! Entries expire after the configured TTL; when the map is full, expired
//! entries are dropped first, then the oldest.

use dashmap::DashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use crate::hsg::types::{ScoredMemory, Sector};

#[derive(Clone)]
struct CacheEntry {
    inserted: Instant,
    results: Vec<ScoredMemory>,
    degraded: bool,
}

pub struct QueryCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    capacity: usize,
    enabled: bool,
}

impl QueryCache {
    pub fn new(enabled: bool, ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
            enabled,
        }
    }

    pub fn from_config(config: &crate::config::RetrievalConfig) -> Self {
        Self::new(
            config.cache_enabled,
            Duration::from_secs(config.cache_ttl_secs),
            config.cache_capacity,
        )
    }

    /// Cache key: (user scope, sector set, query text hash, k). The user
    /// component distinguishes "no scope" from any literal user id.
    pub fn key(user: Option<&str>, sectors: Option<&[Sector]>, query: &str, k: usize) -> String {
        let user_part = match user {
            Some(u) => format!("u:{u}"),
            None => "g:*".to_string(),
        };
        let sector_part = match sectors {
            Some(list) => {
                let mut names: Vec<&str> = list.iter().map(Sector::as_str).collect();
                names.sort_unstable();
                names.dedup();
                names.join("+")
            }
            None => "all".to_string(),
        };
        let mut hasher = DefaultHasher::new();
        query.hash(&mut hasher);
        format!("{user_part}|{sector_part}|{:016x}|{k}", hasher.finish())
    }

    pub fn get(&self, key: &str) -> Option<(Vec<ScoredMemory>, bool)> {
        if !self.enabled {
            return None;
        }
        let entry = self.entries.get(key)?;
        if entry.inserted.elapsed() > self.ttl {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some((entry.results.clone(), entry.degraded))
    }

    pub fn put(&self, key: String, results: Vec<ScoredMemory>, degraded: bool) {
        if !self.enabled {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.evict();
        }
        self.entries.insert(
            key,
            CacheEntry {
                inserted: Instant::now(),
                results,
                degraded,
            },
        );
    }

    /// Drop everything a write may have staled.
    pub fn invalidate_all(&self) {
        self.entries.clear();
    }

    fn evict(&self) {
        self.entries.retain(|_, entry| entry.inserted.elapsed() <= self.ttl);
        while self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|e| e.value().inserted)
                .map(|e| e.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hsg::types::{Memory, Sector};

    fn hit(id: &str) -> ScoredMemory {
        ScoredMemory {
            memory: Memory {
                id: id.to_string(),
                user_id: "alice".into(),
                content: "c".into(),
                primary_sector: Sector::Semantic,
                sectors: vec![Sector::Semantic],
                tags: vec![],
                metadata: None,
                salience: 0.5,
                created_at: 0,
                last_seen_at: 0,
            },
            similarity: 0.9,
            score: 0.9,
            path: vec![],
        }
    }

    #[test]
    fn keys_differ_per_user_and_scope() {
        let alice = QueryCache::key(Some("alice"), None, "programming", 10);
        let bob = QueryCache::key(Some("bob"), None, "programming", 10);
        let unscoped = QueryCache::key(None, None, "programming", 10);
        assert_ne!(alice, bob);
        assert_ne!(alice, unscoped);
        assert_ne!(bob, unscoped);
    }

    #[test]
    fn key_ignores_sector_order() {
        let a = QueryCache::key(None, Some(&[Sector::Semantic, Sector::Episodic]), "q", 5);
        let b = QueryCache::key(None, Some(&[Sector::Episodic, Sector::Semantic]), "q", 5);
        assert_eq!(a, b);
    }

    #[test]
    fn hit_within_ttl_miss_after() {
        let cache = QueryCache::new(true, Duration::from_millis(30), 8);
        let key = QueryCache::key(Some("alice"), None, "q", 5);
        cache.put(key.clone(), vec![hit("m1")], false);

        let (results, degraded) = cache.get(&key).unwrap();
        assert_eq!(results.len(), 1);
        assert!(!degraded);

        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn disabled_cache_never_stores() {
        let cache = QueryCache::new(false, Duration::from_secs(60), 8);
        let key = QueryCache::key(Some("alice"), None, "q", 5);
        cache.put(key.clone(), vec![hit("m1")], false);
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn capacity_is_bounded() {
        let cache = QueryCache::new(true, Duration::from_secs(60), 4);
        for i in 0..20 {
            cache.put(
                QueryCache::key(Some("alice"), None, &format!("q{i}"), 5),
                vec![],
                false,
            );
        }
        assert!(cache.len() <= 5);
    }

    #[test]
    fn invalidate_all_clears() {
        let cache = QueryCache::new(true, Duration::from_secs(60), 8);
        let key = QueryCache::key(Some("alice"), None, "q", 5);
        cache.put(key.clone(), vec![hit("m1")], false);
        cache.invalidate_all();
        assert!(cache.get(&key).is_none());
    }
}
