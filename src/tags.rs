//! Reverse tag index: tag → set of cache keys.
//!
//! Tags group keys for bulk invalidation without a key scan. When a remote
//! tier is configured the authoritative index lives in Redis SETs so every
//! instance resolves the same key set; without one, a pair of in-process
//! maps serves the same contract for single-node deployments.
//!
//! Association is idempotent and two-way: removing a key also drops it from
//! every tag set it belongs to, so no tag set accumulates dangling keys.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use dashmap::DashMap;
use crate::storage::redis::RedisStore;
use crate::storage::traits::StoreError;

pub struct TagIndex {
    remote: Option<Arc<RedisStore>>,

    // Local-mode authoritative maps. Unused once a remote index exists:
    // tag resolution only happens on (rare) purges, and reading the
    // authoritative copy there beats serving a possibly stale mirror.
    tag_to_keys: DashMap<String, HashSet<String>>,
    key_to_tags: DashMap<String, HashSet<String>>,
}

impl TagIndex {
    #[must_use]
    pub fn new(remote: Option<Arc<RedisStore>>) -> Self {
        Self {
            remote,
            tag_to_keys: DashMap::new(),
            key_to_tags: DashMap::new(),
        }
    }

    /// Associate `key` with `tag`. Idempotent. `ttl` bounds how long the
    /// remote index keeps the association alive if the entry is never
    /// explicitly removed; pass the entry's remote lifetime.
    pub async fn associate(&self, tag: &str, key: &str, ttl: Duration) -> Result<(), StoreError> {
        if let Some(ref remote) = self.remote {
            return remote.tag_associate(tag, key, ttl).await;
        }

        // Local maps carry no per-association lifetime; dissociation on
        // removal keeps them bounded.
        self.tag_to_keys
            .entry(tag.to_string())
            .or_default()
            .insert(key.to_string());
        self.key_to_tags
            .entry(key.to_string())
            .or_default()
            .insert(tag.to_string());
        Ok(())
    }

    /// All keys currently associated with `tag`.
    pub async fn keys_for_tag(&self, tag: &str) -> Result<Vec<String>, StoreError> {
        if let Some(ref remote) = self.remote {
            return remote.tag_members(tag).await;
        }

        Ok(self
            .tag_to_keys
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Union of the key sets of several tags.
    pub async fn keys_for_tags(&self, tags: &[String]) -> Result<Vec<String>, StoreError> {
        let mut union = HashSet::new();
        for tag in tags {
            union.extend(self.keys_for_tag(tag).await?);
        }
        Ok(union.into_iter().collect())
    }

    /// Drop every association the given keys participate in, leaving other
    /// keys' tags untouched. Called on any removal so tag sets never hold
    /// dangling keys.
    pub async fn dissociate_keys(&self, keys: &[String]) -> Result<(), StoreError> {
        if let Some(ref remote) = self.remote {
            for key in keys {
                remote.dissociate_key(key).await?;
            }
            return Ok(());
        }

        for key in keys {
            if let Some((_, tags)) = self.key_to_tags.remove(key) {
                for tag in tags {
                    if let Some(mut entry) = self.tag_to_keys.get_mut(&tag) {
                        entry.remove(key);
                    }
                }
            }
        }
        Ok(())
    }

    /// Delete the tag's own key set. Callers dissociate member keys first.
    pub async fn remove_tag(&self, tag: &str) -> Result<(), StoreError> {
        if let Some(ref remote) = self.remote {
            return remote.remove_tag(tag).await;
        }

        self.tag_to_keys.remove(tag);
        Ok(())
    }
}
