//! No-op cache provider
//!
//! Always misses and always succeeds. Used when caching is disabled or the
//! configured backend cannot be reached.

use crate::cache::errors::CacheResult;
use crate::cache::traits::CacheService;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct NoOpCacheService;

impl NoOpCacheService {
    pub fn new() -> Self {
        Self
    }
}

impl CacheService for NoOpCacheService {
    async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> CacheResult<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> CacheResult<()> {
        Ok(())
    }

    async fn delete_pattern(&self, _pattern: &str) -> CacheResult<u64> {
        Ok(0)
    }

    async fn reset(&self) -> CacheResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "noop"
    }

    fn is_distributed(&self) -> bool {
        true
    }
}
