//! Typed result rows.
//!
//! Money columns are read as `float8`. Revenue is always `total_incl - total_tax`,
//! summed over headers for daily and branch results and over lines for
//! salesperson, category and product results.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DailyAggregation {
    pub date: NaiveDate,
    pub total_revenue: f64,
    pub transaction_count: i64,
    pub average_transaction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BranchAggregation {
    pub store_code: String,
    pub total_revenue: f64,
    pub transaction_count: i64,
    pub average_transaction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SalespersonAggregation {
    pub salesperson_code: String,
    pub total_revenue: f64,
    pub total_quantity: f64,
    /// Distinct documents the salesperson appears on
    pub transaction_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CategoryAggregation {
    pub category_code: String,
    pub total_revenue: f64,
    pub total_quantity: f64,
    pub line_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductAggregation {
    pub product_code: String,
    pub description: Option<String>,
    pub category_code: Option<String>,
    pub total_revenue: f64,
    pub total_quantity: f64,
    pub line_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SalesHeader {
    pub doc_no: String,
    pub doc_type: String,
    pub doc_date: NaiveDate,
    pub store_code: String,
    pub salesperson_code: Option<String>,
    pub customer_code: Option<String>,
    pub total_incl: f64,
    pub total_tax: f64,
}

impl SalesHeader {
    pub fn revenue(&self) -> f64 {
        self.total_incl - self.total_tax
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SalesLine {
    pub doc_no: String,
    pub doc_type: String,
    pub doc_date: NaiveDate,
    pub line_no: i32,
    pub store_code: String,
    pub salesperson_code: Option<String>,
    pub customer_code: Option<String>,
    pub product_code: String,
    pub category_code: Option<String>,
    pub quantity: f64,
    pub total_incl: f64,
    pub total_tax: f64,
}

impl SalesLine {
    pub fn revenue(&self) -> f64 {
        self.total_incl - self.total_tax
    }
}

/// A sales line tagged with its customer's category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesLineWithCategory {
    #[serde(flatten)]
    pub line: SalesLine,
    /// `None` when the customer has no category
    pub customer_category: Option<String>,
}

/// Customer code → customer category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CustomerCategory {
    pub customer_code: String,
    pub category_code: Option<String>,
}

/// The five aggregation shapes read together for one filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllAggregations {
    pub operation_id: Uuid,
    pub daily: Vec<DailyAggregation>,
    pub branch: Vec<BranchAggregation>,
    pub salesperson: Vec<SalespersonAggregation>,
    pub category: Vec<CategoryAggregation>,
    pub product: Vec<ProductAggregation>,
    pub elapsed_ms: u64,
}
