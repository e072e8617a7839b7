//! Cache provider enum dispatch
//!
//! Consumers hold a `CacheProvider` and never see the concrete backend.
//! Backend construction degrades to NoOp instead of failing startup.

use super::errors::CacheResult;
use super::providers::{MokaCacheService, NoOpCacheService};
use super::traits::CacheService;
use crate::config::{CacheBackend, CacheConfig};
use std::time::Duration;
use tracing::{info, warn};

#[cfg(feature = "cache-redis")]
use super::providers::RedisCacheService;

#[derive(Debug, Clone)]
enum Backend {
    #[cfg(feature = "cache-redis")]
    Redis(Box<RedisCacheService>),
    Moka(Box<MokaCacheService>),
    NoOp(NoOpCacheService),
}

#[derive(Debug, Clone)]
pub struct CacheProvider {
    backend: Backend,
}

impl CacheProvider {
    /// Create a cache provider from configuration with graceful degradation
    pub async fn from_config_graceful(config: &CacheConfig) -> Self {
        if !config.enabled {
            info!("Analytics cache disabled by configuration");
            return Self::noop();
        }

        match config.backend {
            CacheBackend::Moka => {
                info!(
                    backend = "moka",
                    max_capacity = config.max_capacity,
                    ttl_seconds = config.ttl_seconds,
                    "In-memory cache provider initialized"
                );
                Self::moka(config.max_capacity, config.ttl())
            }
            CacheBackend::Redis => Self::create_redis(config).await,
            CacheBackend::Noop => Self::noop(),
        }
    }

    #[cfg(feature = "cache-redis")]
    async fn create_redis(config: &CacheConfig) -> Self {
        let Some(url) = config.redis_url.as_deref() else {
            warn!("Redis cache selected but no redis_url configured, falling back to NoOp");
            return Self::noop();
        };

        match RedisCacheService::connect(url, &config.key_prefix).await {
            Ok(service) => {
                info!(backend = "redis", "Distributed cache provider initialized");
                Self {
                    backend: Backend::Redis(Box::new(service)),
                }
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to connect to Redis, falling back to NoOp cache (graceful degradation)"
                );
                Self::noop()
            }
        }
    }

    #[cfg(not(feature = "cache-redis"))]
    async fn create_redis(_config: &CacheConfig) -> Self {
        warn!("Redis cache backend requested but 'cache-redis' feature not enabled, using NoOp");
        Self::noop()
    }

    pub fn noop() -> Self {
        Self {
            backend: Backend::NoOp(NoOpCacheService::new()),
        }
    }

    pub fn moka(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            backend: Backend::Moka(Box::new(MokaCacheService::new(max_capacity, ttl))),
        }
    }

    /// Whether entries are actually stored
    pub fn is_enabled(&self) -> bool {
        !matches!(self.backend, Backend::NoOp(_))
    }

    pub fn is_distributed(&self) -> bool {
        match &self.backend {
            #[cfg(feature = "cache-redis")]
            Backend::Redis(s) => s.is_distributed(),
            Backend::Moka(s) => s.is_distributed(),
            Backend::NoOp(s) => s.is_distributed(),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match &self.backend {
            #[cfg(feature = "cache-redis")]
            Backend::Redis(s) => s.provider_name(),
            Backend::Moka(s) => s.provider_name(),
            Backend::NoOp(s) => s.provider_name(),
        }
    }

    pub async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match &self.backend {
            #[cfg(feature = "cache-redis")]
            Backend::Redis(s) => s.get(key).await,
            Backend::Moka(s) => s.get(key).await,
            Backend::NoOp(s) => s.get(key).await,
        }
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        match &self.backend {
            #[cfg(feature = "cache-redis")]
            Backend::Redis(s) => s.set(key, value, ttl).await,
            Backend::Moka(s) => s.set(key, value, ttl).await,
            Backend::NoOp(s) => s.set(key, value, ttl).await,
        }
    }

    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        match &self.backend {
            #[cfg(feature = "cache-redis")]
            Backend::Redis(s) => s.delete(key).await,
            Backend::Moka(s) => s.delete(key).await,
            Backend::NoOp(s) => s.delete(key).await,
        }
    }

    pub async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        match &self.backend {
            #[cfg(feature = "cache-redis")]
            Backend::Redis(s) => s.delete_pattern(pattern).await,
            Backend::Moka(s) => s.delete_pattern(pattern).await,
            Backend::NoOp(s) => s.delete_pattern(pattern).await,
        }
    }

    pub async fn reset(&self) -> CacheResult<()> {
        match &self.backend {
            #[cfg(feature = "cache-redis")]
            Backend::Redis(s) => s.reset().await,
            Backend::Moka(s) => s.reset().await,
            Backend::NoOp(s) => s.reset().await,
        }
    }

    pub async fn health_check(&self) -> CacheResult<bool> {
        match &self.backend {
            #[cfg(feature = "cache-redis")]
            Backend::Redis(s) => s.health_check().await,
            Backend::Moka(s) => s.health_check().await,
            Backend::NoOp(s) => s.health_check().await,
        }
    }
}
