//! Bounded, TTL-expiring response cache with least-recently-used eviction.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::CacheConfig;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Hit and miss counters plus current occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Entries past their expiry are never served. Expired entries are removed
/// lazily on lookup; the capacity bound is enforced on insert.
#[derive(Debug)]
pub struct ResponseCache<V> {
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
    default_ttl: Duration,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            default_ttl: config.ttl,
            enabled: config.enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns the cached value if present and unexpired; a hit refreshes
    /// the entry's recency.
    pub fn lookup(&self, key: &str) -> Option<V> {
        if !self.enabled {
            return None;
        }
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let mut expired = false;
        let fresh = match entries.get(key) {
            Some(entry) if now < entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                expired = true;
                None
            }
            None => None,
        };
        if expired {
            entries.pop(key);
        }
        drop(entries);

        match fresh {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `value` under `key` for `ttl`. Returns the key of the entry
    /// evicted to make room, if any.
    pub fn insert(&self, key: impl Into<String>, value: V, ttl: Duration) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let key = key.into();
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        let evicted = self
            .entries
            .lock()
            .push(key.clone(), entry)
            .map(|(old_key, _)| old_key)
            .filter(|old_key| *old_key != key);
        if let Some(old_key) = &evicted {
            tracing::debug!(evicted = %old_key, "Cache entry evicted");
        }
        evicted
    }

    pub fn insert_default(&self, key: impl Into<String>, value: V) -> Option<String> {
        self.insert(key, value, self.default_ttl)
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.entries.lock().pop(key).map(|e| e.value)
    }

    /// Number of stored entries, including expired ones not yet looked up.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
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

    fn cache(max_entries: usize, ttl: Duration) -> ResponseCache<String> {
        ResponseCache::new(&CacheConfig {
            enabled: true,
            ttl,
            max_entries,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn hit_before_expiry_miss_after() {
        let cache = cache(10, Duration::from_secs(60));
        cache.insert_default("k", "v".to_string());
        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.lookup("k").as_deref(), Some("v"));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.lookup("k"), None);
        // Expired entry is dropped on lookup.
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn per_entry_ttl_overrides_default() {
        let cache = cache(10, Duration::from_secs(3600));
        cache.insert("short", "v".to_string(), Duration::from_secs(5));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.lookup("short").is_none());
    }

    #[tokio::test]
    async fn evicts_least_recently_used() {
        let cache = cache(2, Duration::from_secs(60));
        cache.insert_default("a", "1".to_string());
        cache.insert_default("b", "2".to_string());
        // Touch "a" so "b" becomes the eviction candidate.
        assert!(cache.lookup("a").is_some());
        let evicted = cache.insert_default("c", "3".to_string());
        assert_eq!(evicted.as_deref(), Some("b"));
        assert_eq!(cache.len(), 2);
        assert!(cache.lookup("b").is_none());
        assert!(cache.lookup("a").is_some());
        assert!(cache.lookup("c").is_some());
    }

    #[tokio::test]
    async fn overwrite_is_not_an_eviction() {
        let cache = cache(2, Duration::from_secs(60));
        cache.insert_default("a", "1".to_string());
        assert_eq!(cache.insert_default("a", "2".to_string()), None);
        assert_eq!(cache.lookup("a").as_deref(), Some("2"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn disabled_cache_stores_nothing() {
        let cache: ResponseCache<String> = ResponseCache::new(&CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        });
        cache.insert_default("k", "v".to_string());
        assert!(cache.lookup("k").is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 0);
    }

    #[tokio::test]
    async fn stats_count_hits_and_misses() {
        let cache = cache(4, Duration::from_secs(60));
        cache.insert_default("k", "v".to_string());
        cache.lookup("k");
        cache.lookup("k");
        cache.lookup("missing");
        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let cache = cache(4, Duration::from_secs(60));
        cache.insert_default("a", "1".to_string());
        cache.insert_default("b", "2".to_string());
        assert_eq!(cache.remove("a").as_deref(), Some("1"));
        cache.clear();
        assert!(cache.is_empty());
    }
}
