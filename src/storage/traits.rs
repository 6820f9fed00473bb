use async_trait::async_trait;
use std::time::Duration;
use crate::entry::CacheEntry;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("codec error: {0}")]
    Codec(String),
}

/// Contract shared by the local and remote tiers.
///
/// Absent keys are not errors: `get` returns `None`, `remove` reports
/// whether anything was there, `remove_all` reports how many were. TTL
/// enforcement is each tier's own business (lazy-on-read plus sweep for the
/// memory tier, server-side expiry for Redis).
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError>;
    async fn set(&self, entry: &CacheEntry, ttl: Duration) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<bool, StoreError>;

    /// Remove a batch of keys, returning how many existed.
    /// Default implementation falls back to sequential removes.
    async fn remove_all(&self, keys: &[String]) -> Result<u64, StoreError> {
        let mut removed = 0;
        for key in keys {
            if self.remove(key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
