//! # Customer-Category Pre-Grouping
//!
//! Sales lines for a base filter are fetched once, tagged with their
//! customer's category through a single batched lookup, and grouped by that
//! category. The grouping is cached under a key without the include/exclude
//! dimension, so every include or exclude variant of the same base filter is
//! answered in memory from one database read.

use crate::cache::CacheCoordinator;
use crate::error::AnalyticsResult;
use crate::logging::log_query_operation;
use crate::query::{
    CategoryMode, DocType, QueryFilter, RepositoryProvider, SalesLine, SalesLineWithCategory,
    SalesRepository,
};
use crate::resilience::ProtectedQueryExecutor;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

/// Bucket for lines whose customer has no category
pub const UNCATEGORIZED: &str = "__uncategorized__";

/// Cache domain of the grouped lines
pub const GROUPED_DOMAIN: &str = "lines_by_category";

/// Customer category → tagged lines
pub type CategoryGroups = BTreeMap<String, Vec<SalesLineWithCategory>>;

#[derive(Clone)]
pub struct CategoryPreFilter {
    provider: Arc<dyn RepositoryProvider>,
    executor: Arc<ProtectedQueryExecutor>,
    cache: CacheCoordinator,
}

impl std::fmt::Debug for CategoryPreFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CategoryPreFilter")
            .field("cache", &self.cache.provider_name())
            .finish()
    }
}

impl CategoryPreFilter {
    pub fn new(
        provider: Arc<dyn RepositoryProvider>,
        executor: Arc<ProtectedQueryExecutor>,
        cache: CacheCoordinator,
    ) -> Self {
        Self {
            provider,
            executor,
            cache,
        }
    }

    /// Grouped lines for the base of `filter`, from cache when possible
    pub async fn pre_grouped(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
        tenant: &str,
    ) -> AnalyticsResult<CategoryGroups> {
        let base = filter.normalized().base();
        let key = self
            .cache
            .keys()
            .build_base(GROUPED_DOMAIN, tenant, &base, doc_types);

        if let Some(groups) = self.cache.get::<CategoryGroups>(&key).await {
            return Ok(groups);
        }

        let repo = self.provider.repository(tenant).await?;
        let repo = repo.as_ref();
        let started = Instant::now();

        let lines = self
            .executor
            .execute(GROUPED_DOMAIN, base.span_days(), || {
                repo.sales_lines(&base, doc_types)
            })
            .await;
        let lines = match lines {
            Ok(lines) => lines,
            Err(err) => {
                log_query_operation(GROUPED_DOMAIN, tenant, base.span_days(), "error", None, None);
                return Err(err);
            }
        };

        let categories = self
            .lookup_categories(repo, &lines, base.span_days())
            .await?;
        let row_count = lines.len();
        let groups = group_by_category(lines, &categories);

        log_query_operation(
            GROUPED_DOMAIN,
            tenant,
            base.span_days(),
            "success",
            Some(started.elapsed().as_millis() as u64),
            Some(row_count),
        );
        debug!(
            tenant = tenant,
            buckets = groups.len(),
            lines = row_count,
            "Grouped sales lines by customer category"
        );

        self.cache.set(&key, &groups).await;
        Ok(groups)
    }

    /// Customer code → category for every customer on `lines`, in one round trip
    pub(crate) async fn lookup_categories(
        &self,
        repo: &dyn SalesRepository,
        lines: &[SalesLine],
        span_days: i64,
    ) -> AnalyticsResult<HashMap<String, String>> {
        let customers: Vec<String> = lines
            .iter()
            .filter_map(|line| line.customer_code.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if customers.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = self
            .executor
            .execute("customer_categories", span_days, || {
                repo.customer_categories(&customers)
            })
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                row.category_code
                    .map(|category| category.trim().to_string())
                    .filter(|category| !category.is_empty())
                    .map(|category| (row.customer_code, category))
            })
            .collect())
    }
}

/// Tag each line with its customer's category, `None` when unknown
pub fn tag_lines(
    lines: Vec<SalesLine>,
    categories: &HashMap<String, String>,
) -> Vec<SalesLineWithCategory> {
    lines
        .into_iter()
        .map(|line| {
            let customer_category = line
                .customer_code
                .as_ref()
                .and_then(|customer| categories.get(customer))
                .cloned();
            SalesLineWithCategory {
                line,
                customer_category,
            }
        })
        .collect()
}

/// Group lines by customer category; the uncategorized bucket always exists
pub fn group_by_category(
    lines: Vec<SalesLine>,
    categories: &HashMap<String, String>,
) -> CategoryGroups {
    let mut groups = CategoryGroups::new();
    groups.insert(UNCATEGORIZED.to_string(), Vec::new());

    for tagged in tag_lines(lines, categories) {
        let bucket = tagged
            .customer_category
            .clone()
            .unwrap_or_else(|| UNCATEGORIZED.to_string());
        groups.entry(bucket).or_default().push(tagged);
    }

    groups
}

/// Apply the include/exclude dimension of `filter` to grouped lines
///
/// Include mode unions the listed buckets. Exclude mode keeps every bucket
/// not listed, and always keeps uncategorized lines.
pub fn filter_pre_grouped(
    groups: &CategoryGroups,
    filter: &QueryFilter,
) -> Vec<SalesLineWithCategory> {
    let mut selected: Vec<SalesLineWithCategory> = match filter.category_mode() {
        CategoryMode::All => groups.values().flatten().cloned().collect(),
        CategoryMode::Include(include) => groups
            .iter()
            .filter(|(category, _)| include.iter().any(|wanted| wanted.trim() == category.as_str()))
            .flat_map(|(_, lines)| lines.iter().cloned())
            .collect(),
        CategoryMode::Exclude(exclude) => groups
            .iter()
            .filter(|(category, _)| {
                category.as_str() == UNCATEGORIZED
                    || !exclude.iter().any(|unwanted| unwanted.trim() == category.as_str())
            })
            .flat_map(|(_, lines)| lines.iter().cloned())
            .collect(),
    };

    selected.sort_by(|a, b| {
        a.line
            .doc_date
            .cmp(&b.line.doc_date)
            .then_with(|| a.line.doc_no.cmp(&b.line.doc_no))
            .then_with(|| a.line.line_no.cmp(&b.line.line_no))
    });
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn line(doc_no: &str, customer: Option<&str>) -> SalesLine {
        SalesLine {
            doc_no: doc_no.to_string(),
            doc_type: "IN".to_string(),
            doc_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            line_no: 1,
            store_code: "001".to_string(),
            salesperson_code: None,
            customer_code: customer.map(str::to_string),
            product_code: "P1".to_string(),
            category_code: None,
            quantity: 1.0,
            total_incl: 115.0,
            total_tax: 15.0,
        }
    }

    fn groups() -> CategoryGroups {
        let categories = HashMap::from([
            ("C1".to_string(), "X".to_string()),
            ("C2".to_string(), "Y".to_string()),
        ]);
        group_by_category(
            vec![
                line("D1", Some("C1")),
                line("D2", Some("C2")),
                line("D3", Some("C3")),
                line("D4", None),
            ],
            &categories,
        )
    }

    fn january() -> QueryFilter {
        QueryFilter::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .unwrap()
    }

    fn doc_nos(lines: &[SalesLineWithCategory]) -> Vec<&str> {
        lines.iter().map(|l| l.line.doc_no.as_str()).collect()
    }

    #[test]
    fn test_unknown_and_missing_customers_are_uncategorized() {
        let groups = groups();
        assert_eq!(doc_nos(&groups[UNCATEGORIZED]), vec!["D3", "D4"]);
        assert_eq!(doc_nos(&groups["X"]), vec!["D1"]);
    }

    #[test]
    fn test_uncategorized_bucket_exists_when_empty() {
        let groups = group_by_category(Vec::new(), &HashMap::new());
        assert!(groups[UNCATEGORIZED].is_empty());
    }

    #[test]
    fn test_include_unions_listed_buckets() {
        let selected = filter_pre_grouped(&groups(), &january().including(["X", "Y"]));
        assert_eq!(doc_nos(&selected), vec!["D1", "D2"]);
    }

    #[test]
    fn test_exclude_keeps_uncategorized() {
        let selected = filter_pre_grouped(&groups(), &january().excluding(["X"]));
        assert_eq!(doc_nos(&selected), vec!["D2", "D3", "D4"]);
        assert!(selected
            .iter()
            .all(|l| l.customer_category.as_deref() != Some("X")));
    }

    #[test]
    fn test_include_wins_over_exclude() {
        let filter = january().including(["X"]).excluding(["X"]);
        assert_eq!(doc_nos(&filter_pre_grouped(&groups(), &filter)), vec!["D1"]);
    }
}
