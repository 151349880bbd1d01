//! Advisory key/value cache for dedup verdicts.
//!
//! Nothing here carries a correctness obligation: a miss, an eviction or a
//! poisoned lock all read as "not cached" and the caller recomputes.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

#[async_trait::async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: String, ttl: Duration);
}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// LRU-bounded cache with absolute (non-sliding) TTL per entry.
pub struct InMemoryCache {
    entries: Mutex<LruCache<String, Entry>>,
}

impl InMemoryCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl std::fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("len", &self.len())
            .finish()
    }
}

#[async_trait::async_trait]
impl ResultCache for InMemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut guard = self.entries.lock().ok()?;
        let expired = match guard.get(key) {
            Some(e) if e.expires_at > Instant::now() => return Some(e.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            guard.pop(key);
        }
        None
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.put(
                key.to_string(),
                Entry {
                    value,
                    expires_at: Instant::now() + ttl,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hit_then_expire() {
        let cache = InMemoryCache::new(4);
        cache.set("k", "v".into(), Duration::from_millis(30)).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.get("k").await, None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn capacity_evicts_least_recent() {
        let cache = InMemoryCache::new(2);
        let ttl = Duration::from_secs(60);
        cache.set("a", "1".into(), ttl).await;
        cache.set("b", "2".into(), ttl).await;
        // touch a so b becomes the eviction candidate
        assert!(cache.get("a").await.is_some());
        cache.set("c", "3".into(), ttl).await;
        assert!(cache.get("b").await.is_none());
        assert!(cache.get("a").await.is_some());
        assert!(cache.get("c").await.is_some());
    }

    #[tokio::test]
    async fn zero_capacity_still_works() {
        let cache = InMemoryCache::new(0);
        cache.set("a", "1".into(), Duration::from_secs(1)).await;
        assert_eq!(cache.get("a").await.as_deref(), Some("1"));
    }
}
