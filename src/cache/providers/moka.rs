//! In-memory cache provider using Moka
//!
//! In-process caching with a per-entry TTL taken from each `set`. Not shared
//! between processes: each warmer or API instance keeps its own entries.

use crate::cache::errors::CacheResult;
use crate::cache::keys::glob_match;
use crate::cache::traits::CacheService;
use moka::Expiry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Stored value plus the TTL it was written with
#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

/// Expires each entry after the TTL passed to its `set`, like Redis SETEX
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

#[derive(Clone)]
pub struct MokaCacheService {
    cache: moka::future::Cache<String, Entry>,
    /// Used when a caller passes a zero TTL
    default_ttl: Duration,
}

impl std::fmt::Debug for MokaCacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaCacheService")
            .field("max_capacity", &self.cache.policy().max_capacity())
            .field("entry_count", &self.cache.entry_count())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl MokaCacheService {
    pub fn new(max_capacity: u64, default_ttl: Duration) -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        debug!(
            max_capacity = max_capacity,
            ttl_seconds = default_ttl.as_secs(),
            "Moka in-memory cache service created"
        );

        Self { cache, default_ttl }
    }

    /// Entries currently held, after pending maintenance has run
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

impl CacheService for MokaCacheService {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.cache.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        let entry = Entry {
            value: value.to_string(),
            ttl,
        };
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        let matching: Vec<Arc<String>> = self
            .cache
            .iter()
            .filter(|(key, _)| glob_match(pattern, key))
            .map(|(key, _)| key)
            .collect();

        for key in &matching {
            self.cache.invalidate(key.as_str()).await;
        }

        debug!(pattern = pattern, deleted = matching.len(), "Cache pattern DEL (moka)");
        Ok(matching.len() as u64)
    }

    async fn reset(&self) -> CacheResult<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        debug!("Cache RESET (moka)");
        Ok(())
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "moka"
    }

    fn is_distributed(&self) -> bool {
        false
    }
}
