//! # Aggregation Engine
//!
//! The tenant read path. Every read normalizes its filter, consults the
//! cache, and on a miss runs through the protected executor against the
//! tenant's repository. Ranges wider than the chunking threshold are split,
//! each chunk going through the single-range path with its own cache entry,
//! and the chunk results are folded back together in order.
//!
//! Final results for exclude-mode filters never touch the cache.

use super::chunker::DateRangeChunker;
use super::prefilter::{filter_pre_grouped, tag_lines, CategoryPreFilter};
use super::shapes::RangeRead;
use crate::cache::CacheCoordinator;
use crate::config::ChunkingConfig;
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::logging::{log_error, log_query_operation};
use crate::query::{
    AllAggregations, BranchAggregation, CategoryAggregation, DailyAggregation, DocType,
    ProductAggregation, QueryFilter, RepositoryProvider, SalesHeader, SalesLine,
    SalesLineWithCategory, SalespersonAggregation,
};
use crate::resilience::ProtectedQueryExecutor;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AggregationEngine {
    provider: Arc<dyn RepositoryProvider>,
    executor: Arc<ProtectedQueryExecutor>,
    cache: CacheCoordinator,
    chunker: DateRangeChunker,
    prefilter: CategoryPreFilter,
}

impl std::fmt::Debug for AggregationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationEngine")
            .field("cache", &self.cache.provider_name())
            .field("chunker", &self.chunker)
            .field("breaker", &self.executor.breaker_state())
            .finish()
    }
}

impl AggregationEngine {
    pub fn new(
        provider: Arc<dyn RepositoryProvider>,
        executor: Arc<ProtectedQueryExecutor>,
        cache: CacheCoordinator,
        chunking: ChunkingConfig,
    ) -> Self {
        let prefilter =
            CategoryPreFilter::new(Arc::clone(&provider), Arc::clone(&executor), cache.clone());

        Self {
            provider,
            executor,
            cache,
            chunker: DateRangeChunker::new(chunking),
            prefilter,
        }
    }

    pub fn cache(&self) -> &CacheCoordinator {
        &self.cache
    }

    pub fn executor(&self) -> &Arc<ProtectedQueryExecutor> {
        &self.executor
    }

    pub fn provider(&self) -> &Arc<dyn RepositoryProvider> {
        &self.provider
    }

    pub fn chunker(&self) -> &DateRangeChunker {
        &self.chunker
    }

    pub async fn daily_aggregations(
        &self,
        filter: &QueryFilter,
        tenant: &str,
    ) -> AnalyticsResult<Vec<DailyAggregation>> {
        self.aggregate::<DailyAggregation>(filter, DailyAggregation::DOC_TYPES, tenant)
            .await
    }

    pub async fn branch_aggregations(
        &self,
        filter: &QueryFilter,
        tenant: &str,
    ) -> AnalyticsResult<Vec<BranchAggregation>> {
        self.aggregate::<BranchAggregation>(filter, BranchAggregation::DOC_TYPES, tenant)
            .await
    }

    pub async fn salesperson_aggregations(
        &self,
        filter: &QueryFilter,
        tenant: &str,
    ) -> AnalyticsResult<Vec<SalespersonAggregation>> {
        self.aggregate::<SalespersonAggregation>(filter, SalespersonAggregation::DOC_TYPES, tenant)
            .await
    }

    pub async fn category_aggregations(
        &self,
        filter: &QueryFilter,
        tenant: &str,
    ) -> AnalyticsResult<Vec<CategoryAggregation>> {
        self.aggregate::<CategoryAggregation>(filter, CategoryAggregation::DOC_TYPES, tenant)
            .await
    }

    pub async fn product_aggregations(
        &self,
        filter: &QueryFilter,
        tenant: &str,
    ) -> AnalyticsResult<Vec<ProductAggregation>> {
        self.aggregate::<ProductAggregation>(filter, ProductAggregation::DOC_TYPES, tenant)
            .await
    }

    /// Tax-invoice headers in the range
    pub async fn sales_headers(
        &self,
        filter: &QueryFilter,
        tenant: &str,
    ) -> AnalyticsResult<Vec<SalesHeader>> {
        self.aggregate::<SalesHeader>(filter, SalesHeader::DOC_TYPES, tenant)
            .await
    }

    /// Lines of the given document types, tax invoices when `doc_types` is empty
    pub async fn sales_lines(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
        tenant: &str,
    ) -> AnalyticsResult<Vec<SalesLine>> {
        let doc_types = if doc_types.is_empty() {
            SalesLine::DOC_TYPES
        } else {
            doc_types
        };
        self.aggregate::<SalesLine>(filter, doc_types, tenant).await
    }

    /// Tax-invoice lines tagged with customer category, filtered in memory
    ///
    /// Falls back to a filtered database read when pre-grouping fails.
    pub async fn sales_lines_with_category(
        &self,
        filter: &QueryFilter,
        tenant: &str,
    ) -> AnalyticsResult<Vec<SalesLineWithCategory>> {
        let filter = filter.normalized();
        let doc_types = SalesLine::DOC_TYPES;

        match self.prefilter.pre_grouped(&filter, doc_types, tenant).await {
            Ok(groups) => Ok(filter_pre_grouped(&groups, &filter)),
            Err(err) => {
                warn!(
                    tenant = tenant,
                    error = %err,
                    "Pre-grouping failed, reading filtered lines directly"
                );
                self.lines_with_category_direct(&filter, doc_types, tenant)
                    .await
            }
        }
    }

    async fn lines_with_category_direct(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
        tenant: &str,
    ) -> AnalyticsResult<Vec<SalesLineWithCategory>> {
        let repo = self.provider.repository(tenant).await?;
        let repo = repo.as_ref();

        let lines = self
            .run_query("lines_with_category", filter, tenant, || {
                repo.sales_lines(filter, doc_types)
            })
            .await?;
        let categories = self
            .prefilter
            .lookup_categories(repo, &lines, filter.span_days())
            .await?;

        Ok(tag_lines(lines, &categories))
    }

    /// All five aggregations for one filter, one after another
    ///
    /// The first failing step aborts the rest; its error carries the step,
    /// elapsed time and the executor and pool state at that moment.
    pub async fn all_aggregations(
        &self,
        filter: &QueryFilter,
        tenant: &str,
    ) -> AnalyticsResult<AllAggregations> {
        let operation_id = Uuid::new_v4();
        let started = Instant::now();
        info!(
            operation_id = %operation_id,
            tenant = tenant,
            start = %filter.start,
            end = %filter.end,
            "Running all aggregations"
        );

        let daily = self
            .step(operation_id, started, "daily", tenant, self.daily_aggregations(filter, tenant))
            .await?;
        let branch = self
            .step(operation_id, started, "branch", tenant, self.branch_aggregations(filter, tenant))
            .await?;
        let salesperson = self
            .step(
                operation_id,
                started,
                "salesperson",
                tenant,
                self.salesperson_aggregations(filter, tenant),
            )
            .await?;
        let category = self
            .step(
                operation_id,
                started,
                "category",
                tenant,
                self.category_aggregations(filter, tenant),
            )
            .await?;
        let product = self
            .step(
                operation_id,
                started,
                "product",
                tenant,
                self.product_aggregations(filter, tenant),
            )
            .await?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            operation_id = %operation_id,
            tenant = tenant,
            elapsed_ms = elapsed_ms,
            "All aggregations complete"
        );

        Ok(AllAggregations {
            operation_id,
            daily,
            branch,
            salesperson,
            category,
            product,
            elapsed_ms,
        })
    }

    async fn step<T>(
        &self,
        operation_id: Uuid,
        started: Instant,
        step: &str,
        tenant: &str,
        read: impl Future<Output = AnalyticsResult<T>>,
    ) -> AnalyticsResult<T> {
        read.await.map_err(|source| {
            let err = AnalyticsError::AggregationStep {
                operation_id,
                step: step.to_string(),
                elapsed: started.elapsed(),
                breaker: self.executor.breaker_state(),
                active_queries: self.executor.active_queries(),
                pool: self.provider.pool_snapshot(tenant),
                source: Box::new(source),
            };
            log_error(
                "aggregation_engine",
                step,
                &err.to_string(),
                Some(&format!("operation_id={operation_id} tenant={tenant}")),
            );
            err
        })
    }

    /// Stores with at least one tax invoice, cached per tenant
    pub async fn distinct_stores(&self, tenant: &str) -> AnalyticsResult<Vec<String>> {
        let key = self.cache.keys().build_master("stores", tenant);
        if let Some(stores) = self.cache.get::<Vec<String>>(&key).await {
            return Ok(stores);
        }

        let repo = self.provider.repository(tenant).await?;
        let repo = repo.as_ref();
        let stores = self
            .executor
            .execute("distinct_stores", 0, || repo.distinct_stores())
            .await?;

        self.cache.set(&key, &stores).await;
        Ok(stores)
    }

    /// Salespeople on at least one tax invoice, cached per tenant
    pub async fn distinct_salespeople(&self, tenant: &str) -> AnalyticsResult<Vec<String>> {
        let key = self.cache.keys().build_master("salespeople", tenant);
        if let Some(salespeople) = self.cache.get::<Vec<String>>(&key).await {
            return Ok(salespeople);
        }

        let repo = self.provider.repository(tenant).await?;
        let repo = repo.as_ref();
        let salespeople = self
            .executor
            .execute("distinct_salespeople", 0, || repo.distinct_salespeople())
            .await?;

        self.cache.set(&key, &salespeople).await;
        Ok(salespeople)
    }

    /// Keys a successful warm of `filter` leaves behind
    ///
    /// Empty for exclude-mode filters, whose results are never cached.
    pub fn expected_keys(&self, filter: &QueryFilter, tenant: &str) -> Vec<String> {
        let filter = filter.normalized();
        if filter.bypasses_cache() {
            return Vec::new();
        }

        vec![
            self.key_for::<DailyAggregation>(&filter, DailyAggregation::DOC_TYPES, tenant),
            self.key_for::<BranchAggregation>(&filter, BranchAggregation::DOC_TYPES, tenant),
            self.key_for::<SalespersonAggregation>(
                &filter,
                SalespersonAggregation::DOC_TYPES,
                tenant,
            ),
            self.key_for::<CategoryAggregation>(&filter, CategoryAggregation::DOC_TYPES, tenant),
            self.key_for::<ProductAggregation>(&filter, ProductAggregation::DOC_TYPES, tenant),
            self.key_for::<SalesHeader>(&filter, SalesHeader::DOC_TYPES, tenant),
        ]
    }

    fn key_for<T: RangeRead>(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
        tenant: &str,
    ) -> String {
        self.cache.build_key(T::DOMAIN, tenant, filter, doc_types)
    }

    fn cache_key<T: RangeRead>(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
        tenant: &str,
    ) -> Option<String> {
        if filter.bypasses_cache() {
            None
        } else {
            Some(self.key_for::<T>(filter, doc_types, tenant))
        }
    }

    /// Read `T` for a filter, chunking wide ranges
    pub async fn aggregate<T: RangeRead>(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
        tenant: &str,
    ) -> AnalyticsResult<Vec<T>> {
        let filter = filter.normalized();
        if !self.chunker.needs_chunking(filter.start, filter.end) {
            return self.single_range::<T>(&filter, doc_types, tenant).await;
        }

        let key = self.cache_key::<T>(&filter, doc_types, tenant);
        if let Some(key) = &key {
            if let Some(rows) = self.cache.get::<Vec<T>>(key).await {
                return Ok(rows);
            }
        }

        let chunks = self.chunker.chunks_for(filter.start, filter.end);
        debug!(
            domain = T::DOMAIN,
            tenant = tenant,
            span_days = filter.span_days(),
            chunks = chunks.len(),
            "Splitting range into chunks"
        );

        let mut rows = Vec::new();
        for chunk in &chunks {
            let chunk_filter = filter.for_range(chunk.start, chunk.end);
            rows.extend(
                self.single_range::<T>(&chunk_filter, doc_types, tenant)
                    .await?,
            );
        }
        let rows = T::merge_chunks(rows);

        if let Some(key) = &key {
            self.cache.set(key, &rows).await;
        }
        Ok(rows)
    }

    async fn single_range<T: RangeRead>(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
        tenant: &str,
    ) -> AnalyticsResult<Vec<T>> {
        let key = self.cache_key::<T>(filter, doc_types, tenant);
        if let Some(key) = &key {
            if let Some(rows) = self.cache.get::<Vec<T>>(key).await {
                return Ok(rows);
            }
        }

        let repo = self.provider.repository(tenant).await?;
        let repo = repo.as_ref();
        let rows = self
            .run_query(T::DOMAIN, filter, tenant, || T::fetch(repo, filter, doc_types))
            .await?;

        if let Some(key) = &key {
            self.cache.set(key, &rows).await;
        }
        Ok(rows)
    }

    async fn run_query<R, F, Fut>(
        &self,
        operation: &str,
        filter: &QueryFilter,
        tenant: &str,
        query: F,
    ) -> AnalyticsResult<Vec<R>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AnalyticsResult<Vec<R>>>,
    {
        let started = Instant::now();
        let result = self
            .executor
            .execute(operation, filter.span_days(), query)
            .await;
        let duration_ms = Some(started.elapsed().as_millis() as u64);

        match &result {
            Ok(rows) => log_query_operation(
                operation,
                tenant,
                filter.span_days(),
                "success",
                duration_ms,
                Some(rows.len()),
            ),
            Err(_) => log_query_operation(
                operation,
                tenant,
                filter.span_days(),
                "error",
                duration_ms,
                None,
            ),
        }

        result
    }
}
