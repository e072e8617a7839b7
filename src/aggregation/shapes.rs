//! Read shapes the engine can cache and chunk generically.

use crate::error::AnalyticsResult;
use crate::query::{
    BranchAggregation, CategoryAggregation, DailyAggregation, DocType, ProductAggregation,
    QueryFilter, SalesHeader, SalesLine, SalesRepository, SalespersonAggregation,
};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

/// A row type read over a date range
pub trait RangeRead: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Cache domain and executor operation name
    const DOMAIN: &'static str;

    /// Document types used unless the caller asks for others
    const DOC_TYPES: &'static [DocType];

    fn fetch<'a>(
        repo: &'a dyn SalesRepository,
        filter: &'a QueryFilter,
        doc_types: &'a [DocType],
    ) -> BoxFuture<'a, AnalyticsResult<Vec<Self>>>;

    /// Combine rows concatenated from consecutive chunks
    fn merge_chunks(rows: Vec<Self>) -> Vec<Self> {
        rows
    }
}

/// Fold rows sharing a key, keeping first-seen order
fn merge_by_key<T>(
    rows: Vec<T>,
    key: impl Fn(&T) -> String,
    absorb: impl Fn(&mut T, T),
) -> Vec<T> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<T> = Vec::with_capacity(rows.len());

    for row in rows {
        let row_key = key(&row);
        match index.get(&row_key) {
            Some(&position) => absorb(&mut merged[position], row),
            None => {
                index.insert(row_key, merged.len());
                merged.push(row);
            }
        }
    }

    merged
}

fn average(revenue: f64, count: i64) -> f64 {
    if count == 0 {
        0.0
    } else {
        revenue / count as f64
    }
}

fn by_revenue_desc(a_revenue: f64, b_revenue: f64) -> std::cmp::Ordering {
    b_revenue.total_cmp(&a_revenue)
}

impl RangeRead for DailyAggregation {
    const DOMAIN: &'static str = "daily";
    const DOC_TYPES: &'static [DocType] = DocType::REVENUE;

    fn fetch<'a>(
        repo: &'a dyn SalesRepository,
        filter: &'a QueryFilter,
        doc_types: &'a [DocType],
    ) -> BoxFuture<'a, AnalyticsResult<Vec<Self>>> {
        repo.daily_aggregations(filter, doc_types)
    }

    fn merge_chunks(rows: Vec<Self>) -> Vec<Self> {
        let mut merged = merge_by_key(
            rows,
            |row| row.date.to_string(),
            |into, row| {
                into.total_revenue += row.total_revenue;
                into.transaction_count += row.transaction_count;
                into.average_transaction = average(into.total_revenue, into.transaction_count);
            },
        );
        merged.sort_by_key(|row| row.date);
        merged
    }
}

impl RangeRead for BranchAggregation {
    const DOMAIN: &'static str = "branch";
    const DOC_TYPES: &'static [DocType] = DocType::REVENUE;

    fn fetch<'a>(
        repo: &'a dyn SalesRepository,
        filter: &'a QueryFilter,
        doc_types: &'a [DocType],
    ) -> BoxFuture<'a, AnalyticsResult<Vec<Self>>> {
        repo.branch_aggregations(filter, doc_types)
    }

    fn merge_chunks(rows: Vec<Self>) -> Vec<Self> {
        let mut merged = merge_by_key(
            rows,
            |row| row.store_code.clone(),
            |into, row| {
                into.total_revenue += row.total_revenue;
                into.transaction_count += row.transaction_count;
                into.average_transaction = average(into.total_revenue, into.transaction_count);
            },
        );
        merged.sort_by(|a, b| {
            by_revenue_desc(a.total_revenue, b.total_revenue)
                .then_with(|| a.store_code.cmp(&b.store_code))
        });
        merged
    }
}

impl RangeRead for SalespersonAggregation {
    const DOMAIN: &'static str = "salesperson";
    const DOC_TYPES: &'static [DocType] = DocType::REVENUE;

    fn fetch<'a>(
        repo: &'a dyn SalesRepository,
        filter: &'a QueryFilter,
        doc_types: &'a [DocType],
    ) -> BoxFuture<'a, AnalyticsResult<Vec<Self>>> {
        repo.salesperson_aggregations(filter, doc_types)
    }

    fn merge_chunks(rows: Vec<Self>) -> Vec<Self> {
        // Chunks never share a document, so distinct counts add up
        let mut merged = merge_by_key(
            rows,
            |row| row.salesperson_code.clone(),
            |into, row| {
                into.total_revenue += row.total_revenue;
                into.total_quantity += row.total_quantity;
                into.transaction_count += row.transaction_count;
            },
        );
        merged.sort_by(|a, b| {
            by_revenue_desc(a.total_revenue, b.total_revenue)
                .then_with(|| a.salesperson_code.cmp(&b.salesperson_code))
        });
        merged
    }
}

impl RangeRead for CategoryAggregation {
    const DOMAIN: &'static str = "category";
    const DOC_TYPES: &'static [DocType] = DocType::REVENUE;

    fn fetch<'a>(
        repo: &'a dyn SalesRepository,
        filter: &'a QueryFilter,
        doc_types: &'a [DocType],
    ) -> BoxFuture<'a, AnalyticsResult<Vec<Self>>> {
        repo.category_aggregations(filter, doc_types)
    }

    fn merge_chunks(rows: Vec<Self>) -> Vec<Self> {
        let mut merged = merge_by_key(
            rows,
            |row| row.category_code.clone(),
            |into, row| {
                into.total_revenue += row.total_revenue;
                into.total_quantity += row.total_quantity;
                into.line_count += row.line_count;
            },
        );
        merged.sort_by(|a, b| {
            by_revenue_desc(a.total_revenue, b.total_revenue)
                .then_with(|| a.category_code.cmp(&b.category_code))
        });
        merged
    }
}

impl RangeRead for ProductAggregation {
    const DOMAIN: &'static str = "product";
    const DOC_TYPES: &'static [DocType] = DocType::REVENUE;

    fn fetch<'a>(
        repo: &'a dyn SalesRepository,
        filter: &'a QueryFilter,
        doc_types: &'a [DocType],
    ) -> BoxFuture<'a, AnalyticsResult<Vec<Self>>> {
        repo.product_aggregations(filter, doc_types)
    }

    fn merge_chunks(rows: Vec<Self>) -> Vec<Self> {
        let mut merged = merge_by_key(
            rows,
            |row| row.product_code.clone(),
            |into, row| {
                into.total_revenue += row.total_revenue;
                into.total_quantity += row.total_quantity;
                into.line_count += row.line_count;
                if into.description.is_none() {
                    into.description = row.description;
                }
                if into.category_code.is_none() {
                    into.category_code = row.category_code;
                }
            },
        );
        merged.sort_by(|a, b| {
            by_revenue_desc(a.total_revenue, b.total_revenue)
                .then_with(|| a.product_code.cmp(&b.product_code))
        });
        merged
    }
}

impl RangeRead for SalesHeader {
    const DOMAIN: &'static str = "headers";
    const DOC_TYPES: &'static [DocType] = DocType::LISTING;

    fn fetch<'a>(
        repo: &'a dyn SalesRepository,
        filter: &'a QueryFilter,
        doc_types: &'a [DocType],
    ) -> BoxFuture<'a, AnalyticsResult<Vec<Self>>> {
        repo.sales_headers(filter, doc_types)
    }
}

impl RangeRead for SalesLine {
    const DOMAIN: &'static str = "lines";
    const DOC_TYPES: &'static [DocType] = DocType::LISTING;

    fn fetch<'a>(
        repo: &'a dyn SalesRepository,
        filter: &'a QueryFilter,
        doc_types: &'a [DocType],
    ) -> BoxFuture<'a, AnalyticsResult<Vec<Self>>> {
        repo.sales_lines(filter, doc_types)
    }
}
