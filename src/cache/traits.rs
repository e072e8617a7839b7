//! Cache service trait definition

use super::errors::CacheResult;
use std::time::Duration;

/// Operations every cache store supports
///
/// Values are opaque strings; typed encoding lives in the coordinator.
pub trait CacheService: Send + Sync {
    /// Returns `Ok(Some(value))` on cache hit, `Ok(None)` on cache miss.
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = CacheResult<Option<String>>> + Send;

    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = CacheResult<()>> + Send;

    fn delete(&self, key: &str) -> impl std::future::Future<Output = CacheResult<()>> + Send;

    /// Delete all keys matching a `*` glob, returning how many were removed
    fn delete_pattern(
        &self,
        pattern: &str,
    ) -> impl std::future::Future<Output = CacheResult<u64>> + Send;

    /// Drop every entry this service owns
    fn reset(&self) -> impl std::future::Future<Output = CacheResult<()>> + Send;

    fn health_check(&self) -> impl std::future::Future<Output = CacheResult<bool>> + Send;

    fn provider_name(&self) -> &'static str;

    /// Whether state is shared across processes
    fn is_distributed(&self) -> bool;
}
