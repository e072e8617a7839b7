//! # Cache Coordinator
//!
//! Typed JSON access to the cache store under deterministic keys. Reads and
//! writes on the request path are soft: a failing store is logged and treated
//! as a miss, so callers fall through to the database. Explicit invalidation
//! and reset propagate their errors.

use super::keys::CacheKeyBuilder;
use super::provider::CacheProvider;
use crate::config::CacheConfig;
use crate::error::AnalyticsResult;
use crate::logging::log_cache_operation;
use crate::query::{DocType, QueryFilter};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CacheCoordinator {
    provider: CacheProvider,
    keys: CacheKeyBuilder,
    ttl: Duration,
}

impl CacheCoordinator {
    pub fn new(provider: CacheProvider, keys: CacheKeyBuilder, ttl: Duration) -> Self {
        Self {
            provider,
            keys,
            ttl,
        }
    }

    pub async fn from_config(config: &CacheConfig) -> Self {
        let provider = CacheProvider::from_config_graceful(config).await;
        Self::new(
            provider,
            CacheKeyBuilder::new(config.key_prefix.clone()),
            config.ttl(),
        )
    }

    pub fn keys(&self) -> &CacheKeyBuilder {
        &self.keys
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_enabled()
    }

    pub fn build_key(
        &self,
        domain: &str,
        tenant: &str,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> String {
        self.keys.build(domain, tenant, filter, doc_types)
    }

    /// Cached value for `key`, or `None` on miss or any store/decoding failure
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.provider.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                log_cache_operation("get", key, "miss", None);
                return None;
            }
            Err(e) => {
                warn!(key = key, error = %e, "Cache read failed, falling through to source");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                log_cache_operation("get", key, "hit", None);
                Some(value)
            }
            Err(e) => {
                warn!(key = key, error = %e, "Discarding undecodable cache entry");
                if let Err(e) = self.provider.delete(key).await {
                    warn!(key = key, error = %e, "Failed to delete undecodable cache entry");
                }
                None
            }
        }
    }

    /// Store `value` with the deployment TTL; returns whether it was written
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> bool {
        self.set_with_ttl(key, value, self.ttl).await
    }

    pub async fn set_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = key, error = %e, "Failed to encode cache value");
                return false;
            }
        };

        match self.provider.set(key, &raw, ttl).await {
            Ok(()) => {
                log_cache_operation("set", key, "stored", None);
                true
            }
            Err(e) => {
                warn!(key = key, error = %e, "Cache write failed, result served uncached");
                false
            }
        }
    }

    /// Whether an entry exists for `key`
    pub async fn exists(&self, key: &str) -> bool {
        matches!(self.provider.get(key).await, Ok(Some(_)))
    }

    /// Delete every key matching a `*` glob
    pub async fn del(&self, pattern: &str) -> AnalyticsResult<u64> {
        let deleted = self.provider.delete_pattern(pattern).await?;
        log_cache_operation("del", pattern, "deleted", Some(&deleted.to_string()));
        Ok(deleted)
    }

    /// Drop every entry
    pub async fn reset(&self) -> AnalyticsResult<()> {
        self.provider.reset().await?;
        info!(provider = self.provider_name(), "Analytics cache reset");
        Ok(())
    }

    pub async fn health_check(&self) -> bool {
        match self.provider.health_check().await {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!(error = %e, "Cache health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        code: String,
        revenue: f64,
    }

    fn coordinator() -> CacheCoordinator {
        CacheCoordinator::new(
            CacheProvider::moka(100, Duration::from_secs(60)),
            CacheKeyBuilder::new("analytics"),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_typed_round_trip_and_miss() {
        let cache = coordinator();
        assert_eq!(cache.get::<Vec<Row>>("analytics:x").await, None);

        let rows = vec![Row {
            code: "001".to_string(),
            revenue: 1275.0,
        }];
        assert!(cache.set("analytics:x", &rows).await);
        assert_eq!(cache.get::<Vec<Row>>("analytics:x").await, Some(rows));
        assert!(cache.exists("analytics:x").await);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss_and_is_dropped() {
        let cache = coordinator();
        assert!(cache.set("analytics:bad", &"not a row list").await);

        assert_eq!(cache.get::<Vec<Row>>("analytics:bad").await, None);
        assert!(!cache.exists("analytics:bad").await);
    }

    #[tokio::test]
    async fn test_del_and_reset() {
        let cache = coordinator();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let filter = QueryFilter::new(start, end).unwrap();

        let daily = cache.build_key("daily", "MY", &filter, DocType::REVENUE);
        let branch = cache.build_key("branch", "MY", &filter, DocType::REVENUE);
        cache.set(&daily, &1).await;
        cache.set(&branch, &2).await;
        cache.set("analytics:other", &3).await;

        let deleted = cache
            .del(&cache.keys().range_pattern(Some(start), Some(end)))
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert!(cache.exists("analytics:other").await);

        cache.reset().await.unwrap();
        assert!(!cache.exists("analytics:other").await);
    }

    #[tokio::test]
    async fn test_noop_provider_always_misses() {
        let cache = CacheCoordinator::new(
            CacheProvider::noop(),
            CacheKeyBuilder::new("analytics"),
            Duration::from_secs(60),
        );
        assert!(cache.set("analytics:x", &1).await);
        assert_eq!(cache.get::<i32>("analytics:x").await, None);
        assert!(!cache.is_enabled());
    }

    #[tokio::test]
    async fn test_set_with_ttl_overrides_deployment_ttl() {
        let cache = CacheCoordinator::new(
            CacheProvider::moka(100, Duration::from_secs(3_600)),
            CacheKeyBuilder::new("analytics"),
            Duration::from_secs(3_600),
        );
        assert!(cache.set_with_ttl("analytics:short", &1, Duration::from_millis(100)).await);
        assert!(cache.set("analytics:long", &2).await);

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(cache.get::<i32>("analytics:short").await, None);
        assert_eq!(cache.get::<i32>("analytics:long").await, Some(2));
    }
}
