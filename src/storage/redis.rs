//! Redis storage backend for the remote tier.
//!
//! Entries are stored as serialized JSON blobs under `SETEX`, so Redis
//! enforces the remote TTL server-side. Tag associations live in Redis SETs
//! alongside the entries:
//!
//! ```text
//! {prefix}product:1          → serialized CacheEntry
//! {prefix}tag:products       → SET of keys tagged "products"
//! {prefix}tags-of:product:1  → SET of tags carried by "product:1"
//! ```
//!
//! The two-way mapping lets a tag purge clean up every association it
//! touches without a key scan, and lets a plain key removal drop the key
//! from every tag set it belongs to.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, pipe};
use std::time::Duration;
use crate::entry::CacheEntry;
use crate::resilience::retry::{retry, RetryConfig};
use super::traits::{CacheStore, StoreError};

pub struct RedisStore {
    connection: ConnectionManager,
    /// Optional key prefix for namespacing (e.g., "shop:" → "shop:product:1")
    prefix: String,
}

impl RedisStore {
    /// Create a new Redis store without a key prefix.
    pub async fn new(connection_string: &str) -> Result<Self, StoreError> {
        Self::with_prefix(connection_string, None).await
    }

    /// Create a new Redis store with an optional key prefix.
    ///
    /// The prefix is prepended to all keys (entries and tag sets), enabling
    /// namespacing when sharing a Redis instance with other applications.
    pub async fn with_prefix(
        connection_string: &str,
        prefix: Option<&str>,
    ) -> Result<Self, StoreError> {
        let client = Client::open(connection_string)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        // Use startup config: fast-fail after a few seconds, don't hang forever
        let connection = retry("redis_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| StoreError::Backend(e.to_string()))?;

        Ok(Self {
            connection,
            prefix: prefix.unwrap_or("").to_string(),
        })
    }

    /// Apply the prefix to an entry key.
    #[inline]
    fn prefixed_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }

    /// Redis key holding the SET of cache keys carrying `tag`.
    #[inline]
    fn tag_set_key(&self, tag: &str) -> String {
        format!("{}tag:{}", self.prefix, tag)
    }

    /// Redis key holding the SET of tags carried by `key`.
    #[inline]
    fn key_tags_key(&self, key: &str) -> String {
        format!("{}tags-of:{}", self.prefix, key)
    }

    /// Get the configured prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// TTL in whole seconds, rounded up so an entry never expires early.
    fn ttl_secs(ttl: Duration) -> u64 {
        ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Tag SET operations: O(1) membership, fan-out without key scans
    // ═══════════════════════════════════════════════════════════════════════

    /// Associate `key` with `tag` in both directions. Idempotent (SADD).
    ///
    /// Both sets carry a TTL of at least `ttl` so associations for entries
    /// that expire naturally (never purged) do not accumulate forever:
    /// `EXPIRE NX` starts the clock on a fresh set, `EXPIRE GT` only ever
    /// extends it, leaving the set alive as long as its longest-lived member.
    pub async fn tag_associate(
        &self,
        tag: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let conn = self.connection.clone();
        let tag_set = self.tag_set_key(tag);
        let key_tags = self.key_tags_key(key);
        let tag = tag.to_string();
        let key = key.to_string();
        let secs = Self::ttl_secs(ttl) as i64;

        retry("redis_tag_associate", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let (tag_set, key_tags, tag, key) =
                (tag_set.clone(), key_tags.clone(), tag.clone(), key.clone());
            async move {
                let mut pipeline = pipe();
                pipeline.sadd(&tag_set, &key).sadd(&key_tags, &tag);
                pipeline.cmd("EXPIRE").arg(&tag_set).arg(secs).arg("NX");
                pipeline.cmd("EXPIRE").arg(&tag_set).arg(secs).arg("GT");
                pipeline.cmd("EXPIRE").arg(&key_tags).arg(secs).arg("NX");
                pipeline.cmd("EXPIRE").arg(&key_tags).arg(secs).arg("GT");
                pipeline.query_async::<()>(&mut conn).await?;
                Ok(())
            }
        })
        .await
        .map_err(|e: redis::RedisError| StoreError::Backend(e.to_string()))
    }

    /// All cache keys currently associated with `tag`.
    pub async fn tag_members(&self, tag: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.connection.clone();
        let tag_set = self.tag_set_key(tag);

        retry("redis_tag_members", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let tag_set = tag_set.clone();
            async move {
                let members: Vec<String> = conn.smembers(&tag_set).await?;
                Ok(members)
            }
        })
        .await
        .map_err(|e: redis::RedisError| StoreError::Backend(e.to_string()))
    }

    /// Drop every tag association `key` participates in: remove it from each
    /// tag set it belongs to, then delete its reverse set. Leaves other keys'
    /// associations untouched.
    pub async fn dissociate_key(&self, key: &str) -> Result<(), StoreError> {
        let tags: Vec<String> = {
            let conn = self.connection.clone();
            let key_tags = self.key_tags_key(key);
            retry("redis_tags_of", &RetryConfig::query(), || {
                let mut conn = conn.clone();
                let key_tags = key_tags.clone();
                async move {
                    let tags: Vec<String> = conn.smembers(&key_tags).await?;
                    Ok(tags)
                }
            })
            .await
            .map_err(|e: redis::RedisError| StoreError::Backend(e.to_string()))?
        };

        if tags.is_empty() {
            return Ok(());
        }

        let conn = self.connection.clone();
        let key_tags = self.key_tags_key(key);
        let tag_sets: Vec<String> = tags.iter().map(|t| self.tag_set_key(t)).collect();
        let key = key.to_string();

        retry("redis_dissociate", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let (tag_sets, key_tags, key) = (tag_sets.clone(), key_tags.clone(), key.clone());
            async move {
                let mut pipeline = pipe();
                for tag_set in &tag_sets {
                    pipeline.srem(tag_set, &key);
                }
                pipeline.del(&key_tags);
                pipeline.query_async::<()>(&mut conn).await?;
                Ok(())
            }
        })
        .await
        .map_err(|e: redis::RedisError| StoreError::Backend(e.to_string()))
    }

    /// Delete the tag's key set itself. Member keys and their other tag
    /// associations are the caller's business (see [`Self::dissociate_key`]).
    pub async fn remove_tag(&self, tag: &str) -> Result<(), StoreError> {
        let conn = self.connection.clone();
        let tag_set = self.tag_set_key(tag);

        retry("redis_remove_tag", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let tag_set = tag_set.clone();
            async move {
                let _: () = conn.del(&tag_set).await?;
                Ok(())
            }
        })
        .await
        .map_err(|e: redis::RedisError| StoreError::Backend(e.to_string()))
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        let conn = self.connection.clone();
        let prefixed = self.prefixed_key(key);

        let data: Option<Vec<u8>> = retry("redis_get", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = prefixed.clone();
            async move {
                let data: Option<Vec<u8>> = conn.get(&key).await?;
                Ok(data)
            }
        })
        .await
        .map_err(|e: redis::RedisError| StoreError::Backend(e.to_string()))?;

        data.map(|bytes| {
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Codec(e.to_string()))
        })
        .transpose()
    }

    async fn set(&self, entry: &CacheEntry, ttl: Duration) -> Result<(), StoreError> {
        let conn = self.connection.clone();
        let prefixed = self.prefixed_key(&entry.key);
        let data =
            serde_json::to_vec(entry).map_err(|e| StoreError::Codec(e.to_string()))?;
        let secs = Self::ttl_secs(ttl);

        retry("redis_set", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = prefixed.clone();
            let data = data.clone();
            async move {
                let _: () = conn.set_ex(&key, data.as_slice(), secs).await?;
                Ok(())
            }
        })
        .await
        .map_err(|e: redis::RedisError| StoreError::Backend(e.to_string()))
    }

    async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let conn = self.connection.clone();
        let prefixed = self.prefixed_key(key);

        let removed: u64 = retry("redis_remove", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = prefixed.clone();
            async move {
                let removed: u64 = conn.del(&key).await?;
                Ok(removed)
            }
        })
        .await
        .map_err(|e: redis::RedisError| StoreError::Backend(e.to_string()))?;

        Ok(removed > 0)
    }

    /// Remove a batch of keys with a single pipelined round trip.
    async fn remove_all(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let conn = self.connection.clone();
        let prefixed: Vec<String> = keys.iter().map(|k| self.prefixed_key(k)).collect();

        let counts: Vec<u64> = retry("redis_remove_all", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let prefixed = prefixed.clone();
            async move {
                let mut pipeline = pipe();
                for key in &prefixed {
                    pipeline.del(key);
                }
                let counts: Vec<u64> = pipeline.query_async(&mut conn).await?;
                Ok(counts)
            }
        })
        .await
        .map_err(|e: redis::RedisError| StoreError::Backend(e.to_string()))?;

        Ok(counts.iter().sum())
    }
}
