use std::time::Duration;
use async_trait::async_trait;
// tokio's Instant so paused-clock tests can drive expiry deterministically
use tokio::time::Instant;
use dashmap::DashMap;
use crate::entry::CacheEntry;
use super::traits::{CacheStore, StoreError};

/// An entry held in the local tier, with its eviction deadline.
#[derive(Clone)]
struct StoredEntry {
    deadline: Instant,
    entry: CacheEntry,
}

/// The in-process (local) tier.
///
/// Expiration is evaluated lazily on read: a `get` past the deadline removes
/// the entry and reports a miss. [`InMemoryStore::sweep`] additionally drops
/// expired entries in bulk to bound memory between reads; the engine runs it
/// periodically. Racing writes to the same key resolve last-write-wins;
/// operations on different keys never block each other.
pub struct InMemoryStore {
    data: DashMap<String, StoredEntry>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Get current entry count (including not-yet-swept expired entries)
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Clear all entries
    pub fn clear(&self) {
        self.data.clear();
    }

    /// Drop every expired entry, returning how many were removed.
    ///
    /// The count comes from the retain predicate itself: length snapshots
    /// taken around the pass race with concurrent writers.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.data.retain(|_, stored| {
            let keep = stored.deadline > now;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        match self.data.get(key) {
            Some(stored) if stored.deadline > Instant::now() => {
                Ok(Some(stored.entry.clone()))
            }
            Some(stored) => {
                // Expired: drop the guard before removing to avoid deadlock
                drop(stored);
                self.data.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, entry: &CacheEntry, ttl: Duration) -> Result<(), StoreError> {
        self.data.insert(
            entry.key.clone(),
            StoredEntry {
                deadline: Instant::now() + ttl,
                entry: entry.clone(),
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.data.remove(key).is_some())
    }

    async fn remove_all(&self, keys: &[String]) -> Result<u64, StoreError> {
        let mut removed = 0;
        for key in keys {
            if self.data.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_entry(key: &str, ttl_secs: u64) -> CacheEntry {
        CacheEntry::new(
            key.to_string(),
            json!({"test": "data", "key": key}),
            Duration::from_secs(ttl_secs * 2),
            Duration::from_secs(ttl_secs),
        )
    }

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = InMemoryStore::new();
        let entry = test_entry("product:1", 60);

        store.set(&entry, Duration::from_secs(60)).await.unwrap();

        let result = store.get("product:1").await.unwrap();
        assert!(result.is_some());
        assert_eq!(result.unwrap().key, "product:1");
    }

    #[tokio::test]
    async fn test_get_nonexistent_returns_none() {
        let store = InMemoryStore::new();
        let result = store.get("nonexistent").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_expired_read_removes_entry() {
        let store = InMemoryStore::new();
        let entry = test_entry("short", 60);

        store.set(&entry, Duration::ZERO).await.unwrap();
        assert_eq!(store.len(), 1);

        // Lazy expiry: the read both misses and evicts
        let result = store.get("short").await.unwrap();
        assert!(result.is_none());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = InMemoryStore::new();
        let entry = test_entry("to-delete", 60);

        store.set(&entry, Duration::from_secs(60)).await.unwrap();
        assert!(store.remove("to-delete").await.unwrap());
        assert!(store.get("to-delete").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_nonexistent_is_ok() {
        let store = InMemoryStore::new();
        assert!(!store.remove("nonexistent").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = InMemoryStore::new();

        let first = CacheEntry::new(
            "same-key".into(),
            json!({"version": 1}),
            Duration::from_secs(60),
            Duration::from_secs(60),
        );
        let second = CacheEntry::new(
            "same-key".into(),
            json!({"version": 2}),
            Duration::from_secs(60),
            Duration::from_secs(60),
        );

        store.set(&first, Duration::from_secs(60)).await.unwrap();
        store.set(&second, Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.len(), 1);
        let result = store.get("same-key").await.unwrap().unwrap();
        assert_eq!(result.content["version"], 2);
    }

    #[tokio::test]
    async fn test_remove_all_counts_existing() {
        let store = InMemoryStore::new();
        for i in 0..3 {
            let entry = test_entry(&format!("k{}", i), 60);
            store.set(&entry, Duration::from_secs(60)).await.unwrap();
        }

        let keys: Vec<String> = (0..5).map(|i| format!("k{}", i)).collect();
        let removed = store.remove_all(&keys).await.unwrap();
        assert_eq!(removed, 3);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_drops_only_expired() {
        let store = InMemoryStore::new();

        let live = test_entry("live", 60);
        let dead = test_entry("dead", 60);
        store.set(&live, Duration::from_secs(60)).await.unwrap();
        store.set(&dead, Duration::ZERO).await.unwrap();

        let removed = store.sweep();
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("live").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_on_paused_clock() {
        let store = InMemoryStore::new();
        let entry = test_entry("timed", 60);
        store.set(&entry, Duration::from_secs(30)).await.unwrap();

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(store.get("timed").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("timed").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sweep_count_unaffected_by_concurrent_inserts() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryStore::new());
        for i in 0..500 {
            let entry = test_entry(&format!("dead-{}", i), 60);
            store.set(&entry, Duration::ZERO).await.unwrap();
        }

        // Writers racing the retain pass must not distort the removal count
        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for i in 0..2000 {
                    let entry = test_entry(&format!("live-{}", i), 60);
                    store.set(&entry, Duration::from_secs(60)).await.unwrap();
                }
            })
        };

        let mut total_removed = 0;
        for _ in 0..50 {
            total_removed += store.sweep();
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();

        assert_eq!(total_removed, 500);
        assert_eq!(store.len(), 2000);
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryStore::new());
        let mut handles = vec![];

        for batch in 0..10 {
            let store_clone = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    let entry = test_entry(&format!("batch-{}-key-{}", batch, i), 60);
                    store_clone.set(&entry, Duration::from_secs(60)).await.unwrap();
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len(), 100);
    }
}
