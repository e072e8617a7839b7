//! Query filters and document types.

use crate::error::{AnalyticsError, AnalyticsResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sales document type as stored in the `doc_type` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DocType {
    #[serde(rename = "IN")]
    TaxInvoice,
    #[serde(rename = "CR")]
    CreditNote,
    #[serde(rename = "QU")]
    Quotation,
}

impl DocType {
    /// Revenue-bearing aggregations
    pub const REVENUE: &'static [DocType] = &[DocType::TaxInvoice, DocType::CreditNote];

    /// Raw record listings and master-data enumeration
    pub const LISTING: &'static [DocType] = &[DocType::TaxInvoice];

    pub fn code(&self) -> &'static str {
        match self {
            DocType::TaxInvoice => "IN",
            DocType::CreditNote => "CR",
            DocType::Quotation => "QU",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "IN" => Some(DocType::TaxInvoice),
            "CR" => Some(DocType::CreditNote),
            "QU" => Some(DocType::Quotation),
            _ => None,
        }
    }

    /// Sorted, deduplicated codes for a doc type subset
    pub fn codes(doc_types: &[DocType]) -> Vec<&'static str> {
        let mut codes: Vec<&'static str> = doc_types.iter().map(DocType::code).collect();
        codes.sort_unstable();
        codes.dedup();
        codes
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// How the secondary (customer category) dimension restricts results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryMode<'a> {
    All,
    Include(&'a [String]),
    Exclude(&'a [String]),
}

/// Filter shared by every read operation
///
/// `category` is the product category on sales lines. The include and exclude
/// lists refer to the customer category; when both are given the include list
/// wins and the exclude list is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default)]
    pub store: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub salespeople: Vec<String>,
    #[serde(default)]
    pub include_categories: Vec<String>,
    #[serde(default)]
    pub exclude_categories: Vec<String>,
}

impl QueryFilter {
    pub fn new(start: NaiveDate, end: NaiveDate) -> AnalyticsResult<Self> {
        if end < start {
            return Err(AnalyticsError::Config(format!(
                "invalid date range: end {end} is before start {start}"
            )));
        }

        Ok(Self {
            start,
            end,
            store: None,
            category: None,
            salespeople: Vec::new(),
            include_categories: Vec::new(),
            exclude_categories: Vec::new(),
        })
    }

    pub fn with_store(mut self, store: impl Into<String>) -> Self {
        self.store = Some(store.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_salespeople<I, S>(mut self, salespeople: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.salespeople = salespeople.into_iter().map(Into::into).collect();
        self
    }

    pub fn including<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn excluding<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_categories = categories.into_iter().map(Into::into).collect();
        self
    }

    /// `end - start` in days
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn category_mode(&self) -> CategoryMode<'_> {
        if !self.include_categories.is_empty() {
            CategoryMode::Include(&self.include_categories)
        } else if !self.exclude_categories.is_empty() {
            CategoryMode::Exclude(&self.exclude_categories)
        } else {
            CategoryMode::All
        }
    }

    /// Final results for this filter must not be read from or written to the cache
    pub fn bypasses_cache(&self) -> bool {
        matches!(self.category_mode(), CategoryMode::Exclude(_))
    }

    /// The same filter without the customer-category dimension
    pub fn base(&self) -> Self {
        Self {
            include_categories: Vec::new(),
            exclude_categories: Vec::new(),
            ..self.clone()
        }
    }

    /// The same filter over another date range
    pub fn for_range(&self, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            ..self.clone()
        }
    }

    /// Trimmed values with sorted, deduplicated lists and blank options dropped
    pub fn normalized(&self) -> Self {
        fn clean_option(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }

        fn clean_list(values: &[String]) -> Vec<String> {
            let mut list: Vec<String> = values
                .iter()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect();
            list.sort();
            list.dedup();
            list
        }

        Self {
            start: self.start,
            end: self.end,
            store: clean_option(&self.store),
            category: clean_option(&self.category),
            salespeople: clean_list(&self.salespeople),
            include_categories: clean_list(&self.include_categories),
            exclude_categories: clean_list(&self.exclude_categories),
        }
    }
}
