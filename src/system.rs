//! # Analytics System
//!
//! Wires the connection registry, executor, cache, engine and warmer from
//! one [`AnalyticsConfig`] and exposes the operations callers outside the
//! core use.

use crate::aggregation::AggregationEngine;
use crate::cache::CacheCoordinator;
use crate::config::AnalyticsConfig;
use crate::database::{ConnectionRegistry, PgConnectionFactory};
use crate::diagnostics::{HealthReport, PoolInfo, TenantHealth};
use crate::error::AnalyticsResult;
use crate::query::{
    AllAggregations, BranchAggregation, CategoryAggregation, DailyAggregation, DocType,
    ProductAggregation, QueryFilter, RepositoryProvider, SalesHeader, SalesLine,
    SalesLineWithCategory, SalespersonAggregation,
};
use crate::resilience::ProtectedQueryExecutor;
use crate::warming::{CacheWarmer, IntervalScheduler, Scheduler, WarmingHandle, WarmingSummary};
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

pub struct AnalyticsSystem {
    config: AnalyticsConfig,
    provider: Arc<dyn RepositoryProvider>,
    executor: Arc<ProtectedQueryExecutor>,
    engine: AggregationEngine,
    warmer: Arc<CacheWarmer>,
    warming: Mutex<Option<WarmingHandle>>,
}

impl std::fmt::Debug for AnalyticsSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsSystem")
            .field("environment", &self.config.environment)
            .field("engine", &self.engine)
            .field("warming", &self.warming.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl AnalyticsSystem {
    /// Build the PostgreSQL-backed system; pools open lazily on first use
    pub async fn from_config(config: AnalyticsConfig) -> AnalyticsResult<Self> {
        config.validate()?;

        let registry =
            ConnectionRegistry::new(PgConnectionFactory::new(config.database.clone()), &config);
        let cache = CacheCoordinator::from_config(&config.cache).await;

        info!(
            environment = %config.environment,
            tenants = ?config.tenant_codes(),
            cache = cache.provider_name(),
            "Analytics system configured"
        );

        Ok(Self::with_provider(config, Arc::new(registry), cache))
    }

    /// Build the system over any repository provider
    pub fn with_provider(
        config: AnalyticsConfig,
        provider: Arc<dyn RepositoryProvider>,
        cache: CacheCoordinator,
    ) -> Self {
        let executor = ProtectedQueryExecutor::new(
            config.executor.clone(),
            config.database.pool.max_connections,
        );
        let engine = AggregationEngine::new(
            Arc::clone(&provider),
            Arc::clone(&executor),
            cache,
            config.chunking,
        );
        let warmer = CacheWarmer::new(engine.clone(), config.warming.clone());

        Self {
            config,
            provider,
            executor,
            engine,
            warmer,
            warming: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn engine(&self) -> &AggregationEngine {
        &self.engine
    }

    pub fn executor(&self) -> &Arc<ProtectedQueryExecutor> {
        &self.executor
    }

    pub fn warmer(&self) -> &Arc<CacheWarmer> {
        &self.warmer
    }

    pub async fn daily_aggregations(
        &self,
        filter: &QueryFilter,
        tenant: &str,
    ) -> AnalyticsResult<Vec<DailyAggregation>> {
        self.engine.daily_aggregations(filter, tenant).await
    }

    pub async fn branch_aggregations(
        &self,
        filter: &QueryFilter,
        tenant: &str,
    ) -> AnalyticsResult<Vec<BranchAggregation>> {
        self.engine.branch_aggregations(filter, tenant).await
    }

    pub async fn salesperson_aggregations(
        &self,
        filter: &QueryFilter,
        tenant: &str,
    ) -> AnalyticsResult<Vec<SalespersonAggregation>> {
        self.engine.salesperson_aggregations(filter, tenant).await
    }

    pub async fn category_aggregations(
        &self,
        filter: &QueryFilter,
        tenant: &str,
    ) -> AnalyticsResult<Vec<CategoryAggregation>> {
        self.engine.category_aggregations(filter, tenant).await
    }

    pub async fn product_aggregations(
        &self,
        filter: &QueryFilter,
        tenant: &str,
    ) -> AnalyticsResult<Vec<ProductAggregation>> {
        self.engine.product_aggregations(filter, tenant).await
    }

    pub async fn all_aggregations(
        &self,
        filter: &QueryFilter,
        tenant: &str,
    ) -> AnalyticsResult<AllAggregations> {
        self.engine.all_aggregations(filter, tenant).await
    }

    pub async fn sales_headers(
        &self,
        filter: &QueryFilter,
        tenant: &str,
    ) -> AnalyticsResult<Vec<SalesHeader>> {
        self.engine.sales_headers(filter, tenant).await
    }

    pub async fn sales_lines(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
        tenant: &str,
    ) -> AnalyticsResult<Vec<SalesLine>> {
        self.engine.sales_lines(filter, doc_types, tenant).await
    }

    pub async fn sales_lines_with_category(
        &self,
        filter: &QueryFilter,
        tenant: &str,
    ) -> AnalyticsResult<Vec<SalesLineWithCategory>> {
        self.engine.sales_lines_with_category(filter, tenant).await
    }

    pub async fn trigger_cache_warming(&self) -> WarmingSummary {
        self.warmer.trigger().await
    }

    pub async fn refresh_cache(&self) -> AnalyticsResult<WarmingSummary> {
        self.warmer.refresh().await
    }

    pub async fn clear_cache(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> AnalyticsResult<u64> {
        self.warmer.clear_cache(start, end).await
    }

    /// Start the background warming loop on the configured schedule
    ///
    /// Returns `false` when warming is disabled, the cache is off, or the
    /// loop is already running.
    pub fn start_warming(&self) -> bool {
        self.start_warming_with(IntervalScheduler::from_config(&self.config.warming))
    }

    pub fn start_warming_with(&self, scheduler: impl Scheduler + 'static) -> bool {
        if !self.config.warming.enabled {
            info!("Cache warming disabled by configuration");
            return false;
        }
        if !self.engine.cache().is_enabled() {
            warn!("Cache warming skipped: no cache backend is active");
            return false;
        }

        let mut warming = self.warming.lock();
        if warming.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }

        *warming = Some(self.warmer.spawn(scheduler));
        true
    }

    pub fn connection_pool_info(&self) -> PoolInfo {
        PoolInfo {
            pools: self.provider.pool_snapshots(),
            executor: self.executor.snapshot(),
            warming: self.warmer.phase(),
            captured_at: Utc::now(),
        }
    }

    /// Ping every tenant and the consolidated source, then fold in breaker and cache state
    pub async fn check_connection_health(&self) -> HealthReport {
        let timeout = self.config.database.pool.connect_timeout();
        let mut tenants = Vec::new();

        for tenant in self.provider.tenant_codes() {
            tenants.push(self.ping_tenant(&tenant, timeout).await);
        }

        let started = Instant::now();
        let consolidated = self
            .provider
            .ping_consolidated()
            .await
            .map(|result| TenantHealth {
                tenant: crate::database::CONSOLIDATED_KEY.to_string(),
                reachable: result.is_ok(),
                latency_ms: started.elapsed().as_millis() as u64,
                error: result.err().map(|err| err.to_string()),
                pool: self.provider.pool_snapshot(crate::database::CONSOLIDATED_KEY),
            });

        let breaker = self.executor.breaker_state();
        let cache_healthy = self.engine.cache().health_check().await;
        let status =
            HealthReport::evaluate(&tenants, consolidated.as_ref(), breaker, cache_healthy);

        HealthReport {
            status,
            tenants,
            consolidated,
            breaker,
            active_queries: self.executor.active_queries(),
            cache_provider: self.engine.cache().provider_name(),
            cache_healthy,
            checked_at: Utc::now(),
        }
    }

    async fn ping_tenant(&self, tenant: &str, timeout: Duration) -> TenantHealth {
        let started = Instant::now();
        let result = tokio::time::timeout(timeout, async {
            let repo = self.provider.repository(tenant).await?;
            repo.ping().await
        })
        .await;

        let error = match result {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(_) => Some(format!("ping timed out after {}ms", timeout.as_millis())),
        };

        TenantHealth {
            tenant: tenant.to_string(),
            reachable: error.is_none(),
            latency_ms: started.elapsed().as_millis() as u64,
            error,
            pool: self.provider.pool_snapshot(tenant),
        }
    }

    /// Stop warming and close every pool, logging failures individually
    pub async fn shutdown(&self) {
        let handle = self.warming.lock().take();
        if let Some(handle) = handle {
            handle.stop().await;
        }

        for (key, err) in self.provider.close().await {
            warn!(connection = %key, error = %err, "Failed to close connection");
        }
        info!("Analytics system shut down");
    }
}
