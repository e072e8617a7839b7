//! Deterministic cache keys.
//!
//! Layout:
//!
//! ```text
//! {prefix}:{domain}:{TENANT}:start={date}:end={date}:store={..}:category={..}:sp={..}:inc={..}:exc={..}:docs={..}
//! ```
//!
//! Unset dimensions render as `all`. List dimensions are trimmed, sorted and
//! deduplicated before joining with `,`, so input order never changes a key.
//! Only the effective customer-category mode is encoded: an include list
//! hides any exclude list.

use crate::query::{CategoryMode, DocType, QueryFilter};
use chrono::NaiveDate;

/// Rendered for any dimension that is not set
pub const ALL: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeyBuilder {
    prefix: String,
}

impl CacheKeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key for a final result
    pub fn build(
        &self,
        domain: &str,
        tenant: &str,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> String {
        let (include, exclude) = match filter.category_mode() {
            CategoryMode::All => (ALL.to_string(), ALL.to_string()),
            CategoryMode::Include(categories) => (list_segment(categories), ALL.to_string()),
            CategoryMode::Exclude(categories) => (ALL.to_string(), list_segment(categories)),
        };

        format!(
            "{}:inc={}:exc={}:docs={}",
            self.base_key(domain, tenant, filter),
            include,
            exclude,
            docs_segment(doc_types)
        )
    }

    /// Key for data shared by every include/exclude variant of a filter
    pub fn build_base(
        &self,
        domain: &str,
        tenant: &str,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> String {
        format!(
            "{}:docs={}",
            self.base_key(domain, tenant, filter),
            docs_segment(doc_types)
        )
    }

    /// Key for tenant master data that does not depend on a date range
    pub fn build_master(&self, domain: &str, tenant: &str) -> String {
        format!(
            "{}:master:{}:{}",
            self.prefix,
            segment(domain),
            segment(&tenant.trim().to_uppercase())
        )
    }

    fn base_key(&self, domain: &str, tenant: &str, filter: &QueryFilter) -> String {
        format!(
            "{}:{}:{}:start={}:end={}:store={}:category={}:sp={}",
            self.prefix,
            segment(domain),
            segment(&tenant.trim().to_uppercase()),
            filter.start,
            filter.end,
            option_segment(filter.store.as_deref()),
            option_segment(filter.category.as_deref()),
            list_segment(&filter.salespeople),
        )
    }

    /// Pattern over every key whose range matches the given bounds
    pub fn range_pattern(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> String {
        match (start, end) {
            (Some(start), Some(end)) => format!("{}:*:start={start}:end={end}:*", self.prefix),
            (Some(start), None) => format!("{}:*:start={start}:*", self.prefix),
            (None, Some(end)) => format!("{}:*:end={end}:*", self.prefix),
            (None, None) => self.prefix_pattern(),
        }
    }

    /// Pattern over every key in this namespace
    pub fn prefix_pattern(&self) -> String {
        format!("{}:*", self.prefix)
    }
}

/// Characters that would break key structure or pattern matching are replaced
fn segment(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|c| match c {
            ':' | '*' | ',' | '?' | '[' | ']' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();

    if cleaned.is_empty() {
        ALL.to_string()
    } else {
        cleaned
    }
}

fn option_segment(value: Option<&str>) -> String {
    value.map(segment).unwrap_or_else(|| ALL.to_string())
}

fn list_segment(values: &[String]) -> String {
    let mut cleaned: Vec<String> = values
        .iter()
        .filter(|v| !v.trim().is_empty())
        .map(|v| segment(v))
        .collect();

    if cleaned.is_empty() {
        return ALL.to_string();
    }

    cleaned.sort();
    cleaned.dedup();
    cleaned.join(",")
}

fn docs_segment(doc_types: &[DocType]) -> String {
    let codes = DocType::codes(doc_types);
    if codes.is_empty() {
        ALL.to_string()
    } else {
        codes.join(",")
    }
}

/// `*`-only glob match, the subset of Redis MATCH syntax the keys need
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let pattern = pattern.as_bytes();
    let key = key.as_bytes();
    let (mut p, mut k) = (0, 0);
    let mut star: Option<usize> = None;
    let mut star_k = 0;

    while k < key.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            star = Some(p);
            star_k = k;
            p += 1;
        } else if p < pattern.len() && pattern[p] == key[k] {
            p += 1;
            k += 1;
        } else if let Some(star_p) = star {
            p = star_p + 1;
            star_k += 1;
            k = star_k;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}
