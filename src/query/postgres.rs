//! PostgreSQL implementation of [`SalesRepository`].
//!
//! Every filter value is bound as a parameter. The customer-category
//! include/exclude lists become `EXISTS` / `NOT EXISTS` subqueries against the
//! customer table so a header or line never multiplies into several rows.

use crate::error::AnalyticsResult;
use crate::query::repository::{RepositoryHandle, SalesRepository};
use crate::query::{
    BranchAggregation, CategoryAggregation, CategoryMode, CustomerCategory, DailyAggregation,
    DocType, ProductAggregation, QueryFilter, SalesHeader, SalesLine, SalespersonAggregation,
};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::sync::Arc;

const HEADER_TABLE: &str = "sales_header";
const LINE_TABLE: &str = "sales_line";
const CUSTOMER_TABLE: &str = "customer";

const HEADER_REVENUE: &str =
    "(COALESCE(SUM(h.total_incl), 0) - COALESCE(SUM(h.total_tax), 0))::float8";
const LINE_REVENUE: &str =
    "(COALESCE(SUM(l.total_incl), 0) - COALESCE(SUM(l.total_tax), 0))::float8";

/// Which table the product-category filter is evaluated against
#[derive(Clone, Copy, PartialEq, Eq)]
enum Level {
    Header,
    Line,
}

#[derive(Debug, Clone)]
pub struct PgSalesRepository {
    pool: PgPool,
}

impl PgSalesRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl RepositoryHandle for PgPool {
    fn repository(&self) -> Arc<dyn SalesRepository> {
        Arc::new(PgSalesRepository::new(self.clone()))
    }
}

/// Appends the shared `WHERE` clause; `h` is the header alias, `l` the line alias
fn push_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    filter: &QueryFilter,
    doc_types: &[DocType],
    level: Level,
) {
    let codes: Vec<String> = DocType::codes(doc_types)
        .into_iter()
        .map(str::to_string)
        .collect();

    builder
        .push(" WHERE h.doc_date BETWEEN ")
        .push_bind(filter.start)
        .push(" AND ")
        .push_bind(filter.end)
        .push(" AND h.doc_type = ANY(")
        .push_bind(codes)
        .push(")");

    if let Some(store) = &filter.store {
        builder.push(" AND h.store_code = ").push_bind(store.clone());
    }

    if !filter.salespeople.is_empty() {
        builder
            .push(" AND h.salesperson_code = ANY(")
            .push_bind(filter.salespeople.clone())
            .push(")");
    }

    if let Some(category) = &filter.category {
        match level {
            Level::Line => {
                builder.push(" AND l.category_code = ").push_bind(category.clone());
            }
            Level::Header => {
                builder
                    .push(" AND EXISTS (SELECT 1 FROM ")
                    .push(LINE_TABLE)
                    .push(" cl WHERE cl.doc_no = h.doc_no AND cl.doc_type = h.doc_type AND cl.category_code = ")
                    .push_bind(category.clone())
                    .push(")");
            }
        }
    }

    match filter.category_mode() {
        CategoryMode::All => {}
        CategoryMode::Include(categories) => {
            builder
                .push(" AND EXISTS (SELECT 1 FROM ")
                .push(CUSTOMER_TABLE)
                .push(" c WHERE c.customer_code = h.customer_code AND c.category_code = ANY(")
                .push_bind(categories.to_vec())
                .push("))");
        }
        CategoryMode::Exclude(categories) => {
            builder
                .push(" AND NOT EXISTS (SELECT 1 FROM ")
                .push(CUSTOMER_TABLE)
                .push(" c WHERE c.customer_code = h.customer_code AND c.category_code = ANY(")
                .push_bind(categories.to_vec())
                .push("))");
        }
    }
}

fn header_query(select: &str) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(select.to_string());
    builder.push(" FROM ").push(HEADER_TABLE).push(" h");
    builder
}

fn line_query(select: &str) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(select.to_string());
    builder
        .push(" FROM ")
        .push(LINE_TABLE)
        .push(" l JOIN ")
        .push(HEADER_TABLE)
        .push(" h ON h.doc_no = l.doc_no AND h.doc_type = l.doc_type");
    builder
}

#[async_trait]
impl SalesRepository for PgSalesRepository {
    async fn daily_aggregations(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> AnalyticsResult<Vec<DailyAggregation>> {
        let mut builder = header_query(&format!(
            "SELECT h.doc_date AS date, {HEADER_REVENUE} AS total_revenue, \
             COUNT(*) AS transaction_count, \
             COALESCE({HEADER_REVENUE} / NULLIF(COUNT(*), 0), 0)::float8 AS average_transaction"
        ));
        push_filters(&mut builder, filter, doc_types, Level::Header);
        builder.push(" GROUP BY h.doc_date ORDER BY h.doc_date");

        Ok(builder
            .build_query_as::<DailyAggregation>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn branch_aggregations(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> AnalyticsResult<Vec<BranchAggregation>> {
        let mut builder = header_query(&format!(
            "SELECT h.store_code, {HEADER_REVENUE} AS total_revenue, \
             COUNT(*) AS transaction_count, \
             COALESCE({HEADER_REVENUE} / NULLIF(COUNT(*), 0), 0)::float8 AS average_transaction"
        ));
        push_filters(&mut builder, filter, doc_types, Level::Header);
        builder.push(" GROUP BY h.store_code ORDER BY total_revenue DESC, h.store_code");

        Ok(builder
            .build_query_as::<BranchAggregation>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn salesperson_aggregations(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> AnalyticsResult<Vec<SalespersonAggregation>> {
        let mut builder = line_query(&format!(
            "SELECT h.salesperson_code, {LINE_REVENUE} AS total_revenue, \
             COALESCE(SUM(l.quantity), 0)::float8 AS total_quantity, \
             COUNT(DISTINCT h.doc_no) AS transaction_count"
        ));
        push_filters(&mut builder, filter, doc_types, Level::Line);
        builder.push(
            " AND h.salesperson_code IS NOT NULL \
             GROUP BY h.salesperson_code ORDER BY total_revenue DESC, h.salesperson_code",
        );

        Ok(builder
            .build_query_as::<SalespersonAggregation>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn category_aggregations(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> AnalyticsResult<Vec<CategoryAggregation>> {
        let mut builder = line_query(&format!(
            "SELECT COALESCE(l.category_code, '') AS category_code, {LINE_REVENUE} AS total_revenue, \
             COALESCE(SUM(l.quantity), 0)::float8 AS total_quantity, \
             COUNT(*) AS line_count"
        ));
        push_filters(&mut builder, filter, doc_types, Level::Line);
        builder.push(
            " GROUP BY COALESCE(l.category_code, '') ORDER BY total_revenue DESC, category_code",
        );

        Ok(builder
            .build_query_as::<CategoryAggregation>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn product_aggregations(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> AnalyticsResult<Vec<ProductAggregation>> {
        let mut builder = line_query(&format!(
            "SELECT l.product_code, MAX(l.description) AS description, \
             MAX(l.category_code) AS category_code, {LINE_REVENUE} AS total_revenue, \
             COALESCE(SUM(l.quantity), 0)::float8 AS total_quantity, \
             COUNT(*) AS line_count"
        ));
        push_filters(&mut builder, filter, doc_types, Level::Line);
        builder.push(" GROUP BY l.product_code ORDER BY total_revenue DESC, l.product_code");

        Ok(builder
            .build_query_as::<ProductAggregation>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn sales_headers(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> AnalyticsResult<Vec<SalesHeader>> {
        let mut builder = header_query(
            "SELECT h.doc_no, h.doc_type, h.doc_date, h.store_code, h.salesperson_code, \
             h.customer_code, h.total_incl::float8 AS total_incl, h.total_tax::float8 AS total_tax",
        );
        push_filters(&mut builder, filter, doc_types, Level::Header);
        builder.push(" ORDER BY h.doc_date, h.doc_no");

        Ok(builder
            .build_query_as::<SalesHeader>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn sales_lines(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> AnalyticsResult<Vec<SalesLine>> {
        let mut builder = line_query(
            "SELECT l.doc_no, l.doc_type, h.doc_date, l.line_no, h.store_code, \
             h.salesperson_code, h.customer_code, l.product_code, l.category_code, \
             l.quantity::float8 AS quantity, l.total_incl::float8 AS total_incl, \
             l.total_tax::float8 AS total_tax",
        );
        push_filters(&mut builder, filter, doc_types, Level::Line);
        builder.push(" ORDER BY h.doc_date, l.doc_no, l.line_no");

        Ok(builder
            .build_query_as::<SalesLine>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn customer_categories(
        &self,
        customer_codes: &[String],
    ) -> AnalyticsResult<Vec<CustomerCategory>> {
        if customer_codes.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT customer_code, category_code FROM ");
        builder
            .push(CUSTOMER_TABLE)
            .push(" WHERE customer_code = ANY(")
            .push_bind(customer_codes.to_vec())
            .push(")");

        Ok(builder
            .build_query_as::<CustomerCategory>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn distinct_stores(&self) -> AnalyticsResult<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT store_code FROM {HEADER_TABLE} WHERE doc_type = $1 ORDER BY store_code"
        );
        Ok(sqlx::query_scalar::<_, String>(&sql)
            .bind(DocType::TaxInvoice.code())
            .fetch_all(&self.pool)
            .await?)
    }

    async fn distinct_salespeople(&self) -> AnalyticsResult<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT salesperson_code FROM {HEADER_TABLE} \
             WHERE doc_type = $1 AND salesperson_code IS NOT NULL ORDER BY salesperson_code"
        );
        Ok(sqlx::query_scalar::<_, String>(&sql)
            .bind(DocType::TaxInvoice.code())
            .fetch_all(&self.pool)
            .await?)
    }

    async fn ping(&self) -> AnalyticsResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
