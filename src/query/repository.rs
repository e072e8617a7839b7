//! Repository seams between the aggregation engine and tenant databases.

use crate::database::{ConnectionFactory, ConnectionRegistry, PoolSnapshot};
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::query::{
    BranchAggregation, CategoryAggregation, CustomerCategory, DailyAggregation, DocType,
    ProductAggregation, QueryFilter, SalesHeader, SalesLine, SalespersonAggregation,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Read access to one tenant's sales records
#[async_trait]
pub trait SalesRepository: Send + Sync {
    async fn daily_aggregations(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> AnalyticsResult<Vec<DailyAggregation>>;

    async fn branch_aggregations(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> AnalyticsResult<Vec<BranchAggregation>>;

    async fn salesperson_aggregations(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> AnalyticsResult<Vec<SalespersonAggregation>>;

    async fn category_aggregations(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> AnalyticsResult<Vec<CategoryAggregation>>;

    async fn product_aggregations(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> AnalyticsResult<Vec<ProductAggregation>>;

    async fn sales_headers(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> AnalyticsResult<Vec<SalesHeader>>;

    async fn sales_lines(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> AnalyticsResult<Vec<SalesLine>>;

    /// Batched category lookup for many customers in one round trip
    async fn customer_categories(
        &self,
        customer_codes: &[String],
    ) -> AnalyticsResult<Vec<CustomerCategory>>;

    /// Stores that issued at least one tax invoice
    async fn distinct_stores(&self) -> AnalyticsResult<Vec<String>>;

    /// Salespeople that appear on at least one tax invoice
    async fn distinct_salespeople(&self) -> AnalyticsResult<Vec<String>>;

    async fn ping(&self) -> AnalyticsResult<()>;
}

/// A pooled connection that can hand out a repository over itself
pub trait RepositoryHandle {
    fn repository(&self) -> Arc<dyn SalesRepository>;
}

impl RepositoryHandle for Arc<dyn SalesRepository> {
    fn repository(&self) -> Arc<dyn SalesRepository> {
        Arc::clone(self)
    }
}

/// Hands the engine a repository for a tenant
#[async_trait]
pub trait RepositoryProvider: Send + Sync {
    async fn repository(&self, tenant: &str) -> AnalyticsResult<Arc<dyn SalesRepository>>;

    /// Liveness of the consolidated source, `None` when it is not configured
    async fn ping_consolidated(&self) -> Option<AnalyticsResult<()>>;

    fn pool_snapshot(&self, tenant: &str) -> Option<PoolSnapshot>;

    fn pool_snapshots(&self) -> Vec<PoolSnapshot>;

    fn tenant_codes(&self) -> Vec<String>;

    /// Close all connections, returning per-tenant failures
    async fn close(&self) -> Vec<(String, AnalyticsError)>;
}

#[async_trait]
impl<F> RepositoryProvider for ConnectionRegistry<F>
where
    F: ConnectionFactory,
    F::Connection: RepositoryHandle,
{
    async fn repository(&self, tenant: &str) -> AnalyticsResult<Arc<dyn SalesRepository>> {
        let connection = self.get_connection(tenant).await?;
        Ok(connection.repository())
    }

    async fn ping_consolidated(&self) -> Option<AnalyticsResult<()>> {
        match self.consolidated_connection().await {
            Ok(connection) => Some(connection.repository().ping().await),
            Err(AnalyticsError::Config(_)) => None,
            Err(err) => Some(Err(err)),
        }
    }

    fn pool_snapshot(&self, tenant: &str) -> Option<PoolSnapshot> {
        ConnectionRegistry::pool_snapshot(self, tenant)
    }

    fn pool_snapshots(&self) -> Vec<PoolSnapshot> {
        ConnectionRegistry::pool_snapshots(self)
    }

    fn tenant_codes(&self) -> Vec<String> {
        ConnectionRegistry::tenant_codes(self)
    }

    async fn close(&self) -> Vec<(String, AnalyticsError)> {
        self.close_all().await
    }
}
