//! Storage tiers.
//!
//! - [`traits`]: the [`CacheStore`](traits::CacheStore) contract both tiers implement
//! - [`memory`]: the in-process local tier (DashMap, lazy TTL + sweep)
//! - [`redis`]: the shared remote tier (Redis, server-side TTL, tag SETs)

pub mod traits;
pub mod memory;
pub mod redis;
