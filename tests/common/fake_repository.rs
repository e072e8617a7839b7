//! In-memory sales repository with call counting and scripted failures.

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use sales_analytics::database::{ConnectionFactory, ConnectionTarget, PoolSnapshot};
use sales_analytics::query::{
    BranchAggregation, CategoryAggregation, CategoryMode, CustomerCategory, DailyAggregation,
    DocType, ProductAggregation, QueryFilter, SalesHeader, SalesLine, SalesRepository,
    SalespersonAggregation,
};
use sales_analytics::{AnalyticsError, AnalyticsResult};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// A document with its lines, as the fixture stores it
#[derive(Debug, Clone)]
pub struct Doc {
    pub header: SalesHeader,
    pub lines: Vec<(SalesLine, Option<String>)>,
    explicit_totals: bool,
}

impl Doc {
    fn new(doc_type: DocType, doc_no: &str, date: NaiveDate, store: &str) -> Self {
        Self {
            header: SalesHeader {
                doc_no: doc_no.to_string(),
                doc_type: doc_type.code().to_string(),
                doc_date: date,
                store_code: store.to_string(),
                salesperson_code: None,
                customer_code: None,
                total_incl: 0.0,
                total_tax: 0.0,
            },
            lines: Vec::new(),
            explicit_totals: false,
        }
    }

    pub fn invoice(doc_no: &str, date: NaiveDate, store: &str) -> Self {
        Self::new(DocType::TaxInvoice, doc_no, date, store)
    }

    pub fn credit_note(doc_no: &str, date: NaiveDate, store: &str) -> Self {
        Self::new(DocType::CreditNote, doc_no, date, store)
    }

    pub fn quotation(doc_no: &str, date: NaiveDate, store: &str) -> Self {
        Self::new(DocType::Quotation, doc_no, date, store)
    }

    pub fn salesperson(mut self, code: &str) -> Self {
        self.header.salesperson_code = Some(code.to_string());
        for (line, _) in &mut self.lines {
            line.salesperson_code = Some(code.to_string());
        }
        self
    }

    pub fn customer(mut self, code: &str) -> Self {
        self.header.customer_code = Some(code.to_string());
        for (line, _) in &mut self.lines {
            line.customer_code = Some(code.to_string());
        }
        self
    }

    /// Header totals independent of the lines
    pub fn totals(mut self, total_incl: f64, total_tax: f64) -> Self {
        self.header.total_incl = total_incl;
        self.header.total_tax = total_tax;
        self.explicit_totals = true;
        self
    }

    pub fn line(
        mut self,
        product: &str,
        category: Option<&str>,
        quantity: f64,
        total_incl: f64,
        total_tax: f64,
    ) -> Self {
        let line = SalesLine {
            doc_no: self.header.doc_no.clone(),
            doc_type: self.header.doc_type.clone(),
            doc_date: self.header.doc_date,
            line_no: self.lines.len() as i32 + 1,
            store_code: self.header.store_code.clone(),
            salesperson_code: self.header.salesperson_code.clone(),
            customer_code: self.header.customer_code.clone(),
            product_code: product.to_string(),
            category_code: category.map(str::to_string),
            quantity,
            total_incl,
            total_tax,
        };
        if !self.explicit_totals {
            self.header.total_incl += total_incl;
            self.header.total_tax += total_tax;
        }
        self.lines.push((line, Some(format!("{product} description"))));
        self
    }
}

#[derive(Debug, Default)]
struct Fixture {
    docs: Vec<Doc>,
    customers: HashMap<String, Option<String>>,
}

/// Scripted failure for one repository method
struct Failure {
    remaining: u32,
    error: fn() -> AnalyticsError,
}

#[derive(Default)]
pub struct FakeRepository {
    data: Mutex<Fixture>,
    calls: Mutex<BTreeMap<&'static str, usize>>,
    failures: Mutex<HashMap<&'static str, Failure>>,
}

impl FakeRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, doc: Doc) {
        self.data.lock().docs.push(doc);
    }

    pub fn set_customer(&self, code: &str, category: Option<&str>) {
        self.data
            .lock()
            .customers
            .insert(code.to_string(), category.map(str::to_string));
    }

    /// Make the next `times` calls of `method` fail with `error()`
    pub fn fail_next(&self, method: &'static str, times: u32, error: fn() -> AnalyticsError) {
        self.failures.lock().insert(
            method,
            Failure {
                remaining: times,
                error,
            },
        );
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().get(method).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    fn enter(&self, method: &'static str) -> AnalyticsResult<()> {
        *self.calls.lock().entry(method).or_default() += 1;

        let mut failures = self.failures.lock();
        if let Some(failure) = failures.get_mut(method) {
            if failure.remaining > 0 {
                failure.remaining -= 1;
                return Err((failure.error)());
            }
        }
        Ok(())
    }

    fn customer_category(fixture: &Fixture, customer: Option<&str>) -> Option<String> {
        customer
            .and_then(|code| fixture.customers.get(code))
            .cloned()
            .flatten()
    }

    /// Header-level predicates shared by headers and lines
    fn document_matches(
        fixture: &Fixture,
        header: &SalesHeader,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> bool {
        if header.doc_date < filter.start || header.doc_date > filter.end {
            return false;
        }
        if !DocType::codes(doc_types).contains(&header.doc_type.as_str()) {
            return false;
        }
        if let Some(store) = &filter.store {
            if &header.store_code != store {
                return false;
            }
        }
        if !filter.salespeople.is_empty() {
            match &header.salesperson_code {
                Some(code) if filter.salespeople.contains(code) => {}
                _ => return false,
            }
        }

        let customer_category =
            Self::customer_category(fixture, header.customer_code.as_deref());
        match filter.category_mode() {
            CategoryMode::All => true,
            CategoryMode::Include(include) => customer_category
                .as_ref()
                .is_some_and(|category| include.contains(category)),
            CategoryMode::Exclude(exclude) => !customer_category
                .as_ref()
                .is_some_and(|category| exclude.contains(category)),
        }
    }

    fn headers(&self, filter: &QueryFilter, doc_types: &[DocType]) -> Vec<SalesHeader> {
        let fixture = self.data.lock();
        let mut headers: Vec<SalesHeader> = fixture
            .docs
            .iter()
            .filter(|doc| Self::document_matches(&fixture, &doc.header, filter, doc_types))
            .filter(|doc| match &filter.category {
                Some(category) => doc
                    .lines
                    .iter()
                    .any(|(line, _)| line.category_code.as_ref() == Some(category)),
                None => true,
            })
            .map(|doc| doc.header.clone())
            .collect();
        headers.sort_by(|a, b| {
            a.doc_date
                .cmp(&b.doc_date)
                .then_with(|| a.doc_no.cmp(&b.doc_no))
        });
        headers
    }

    fn lines(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> Vec<(SalesLine, Option<String>)> {
        let fixture = self.data.lock();
        let mut lines: Vec<(SalesLine, Option<String>)> = fixture
            .docs
            .iter()
            .filter(|doc| Self::document_matches(&fixture, &doc.header, filter, doc_types))
            .flat_map(|doc| doc.lines.iter().cloned())
            .filter(|(line, _)| match &filter.category {
                Some(category) => line.category_code.as_ref() == Some(category),
                None => true,
            })
            .collect();
        lines.sort_by(|(a, _), (b, _)| {
            a.doc_date
                .cmp(&b.doc_date)
                .then_with(|| a.doc_no.cmp(&b.doc_no))
                .then_with(|| a.line_no.cmp(&b.line_no))
        });
        lines
    }
}

fn revenue_desc<T>(rows: &mut [T], revenue: impl Fn(&T) -> f64, key: impl Fn(&T) -> String) {
    rows.sort_by(|a, b| {
        revenue(b)
            .total_cmp(&revenue(a))
            .then_with(|| key(a).cmp(&key(b)))
    });
}

#[async_trait]
impl SalesRepository for FakeRepository {
    async fn daily_aggregations(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> AnalyticsResult<Vec<DailyAggregation>> {
        self.enter("daily_aggregations")?;

        let mut by_day: BTreeMap<NaiveDate, (f64, f64, i64)> = BTreeMap::new();
        for header in self.headers(filter, doc_types) {
            let entry = by_day.entry(header.doc_date).or_default();
            entry.0 += header.total_incl;
            entry.1 += header.total_tax;
            entry.2 += 1;
        }

        Ok(by_day
            .into_iter()
            .map(|(date, (incl, tax, count))| DailyAggregation {
                date,
                total_revenue: incl - tax,
                transaction_count: count,
                average_transaction: (incl - tax) / count as f64,
            })
            .collect())
    }

    async fn branch_aggregations(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> AnalyticsResult<Vec<BranchAggregation>> {
        self.enter("branch_aggregations")?;

        let mut by_store: BTreeMap<String, (f64, f64, i64)> = BTreeMap::new();
        for header in self.headers(filter, doc_types) {
            let entry = by_store.entry(header.store_code.clone()).or_default();
            entry.0 += header.total_incl;
            entry.1 += header.total_tax;
            entry.2 += 1;
        }

        let mut rows: Vec<BranchAggregation> = by_store
            .into_iter()
            .map(|(store_code, (incl, tax, count))| BranchAggregation {
                store_code,
                total_revenue: incl - tax,
                transaction_count: count,
                average_transaction: (incl - tax) / count as f64,
            })
            .collect();
        revenue_desc(&mut rows, |r| r.total_revenue, |r| r.store_code.clone());
        Ok(rows)
    }

    async fn salesperson_aggregations(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> AnalyticsResult<Vec<SalespersonAggregation>> {
        self.enter("salesperson_aggregations")?;

        let mut by_person: BTreeMap<String, (f64, f64, f64, BTreeSet<String>)> = BTreeMap::new();
        for (line, _) in self.lines(filter, doc_types) {
            let Some(code) = line.salesperson_code.clone() else {
                continue;
            };
            let entry = by_person.entry(code).or_default();
            entry.0 += line.total_incl;
            entry.1 += line.total_tax;
            entry.2 += line.quantity;
            entry.3.insert(line.doc_no.clone());
        }

        let mut rows: Vec<SalespersonAggregation> = by_person
            .into_iter()
            .map(|(code, (incl, tax, quantity, docs))| SalespersonAggregation {
                salesperson_code: code,
                total_revenue: incl - tax,
                total_quantity: quantity,
                transaction_count: docs.len() as i64,
            })
            .collect();
        revenue_desc(&mut rows, |r| r.total_revenue, |r| r.salesperson_code.clone());
        Ok(rows)
    }

    async fn category_aggregations(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> AnalyticsResult<Vec<CategoryAggregation>> {
        self.enter("category_aggregations")?;

        let mut by_category: BTreeMap<String, (f64, f64, f64, i64)> = BTreeMap::new();
        for (line, _) in self.lines(filter, doc_types) {
            let entry = by_category
                .entry(line.category_code.clone().unwrap_or_default())
                .or_default();
            entry.0 += line.total_incl;
            entry.1 += line.total_tax;
            entry.2 += line.quantity;
            entry.3 += 1;
        }

        let mut rows: Vec<CategoryAggregation> = by_category
            .into_iter()
            .map(|(category_code, (incl, tax, quantity, count))| CategoryAggregation {
                category_code,
                total_revenue: incl - tax,
                total_quantity: quantity,
                line_count: count,
            })
            .collect();
        revenue_desc(&mut rows, |r| r.total_revenue, |r| r.category_code.clone());
        Ok(rows)
    }

    async fn product_aggregations(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> AnalyticsResult<Vec<ProductAggregation>> {
        self.enter("product_aggregations")?;

        let mut by_product: BTreeMap<String, ProductAggregation> = BTreeMap::new();
        for (line, description) in self.lines(filter, doc_types) {
            let entry = by_product
                .entry(line.product_code.clone())
                .or_insert_with(|| ProductAggregation {
                    product_code: line.product_code.clone(),
                    description: None,
                    category_code: None,
                    total_revenue: 0.0,
                    total_quantity: 0.0,
                    line_count: 0,
                });
            entry.total_revenue += line.revenue();
            entry.total_quantity += line.quantity;
            entry.line_count += 1;
            entry.description = entry.description.clone().max(description);
            entry.category_code = entry.category_code.clone().max(line.category_code.clone());
        }

        let mut rows: Vec<ProductAggregation> = by_product.into_values().collect();
        revenue_desc(&mut rows, |r| r.total_revenue, |r| r.product_code.clone());
        Ok(rows)
    }

    async fn sales_headers(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> AnalyticsResult<Vec<SalesHeader>> {
        self.enter("sales_headers")?;
        Ok(self.headers(filter, doc_types))
    }

    async fn sales_lines(
        &self,
        filter: &QueryFilter,
        doc_types: &[DocType],
    ) -> AnalyticsResult<Vec<SalesLine>> {
        self.enter("sales_lines")?;
        Ok(self
            .lines(filter, doc_types)
            .into_iter()
            .map(|(line, _)| line)
            .collect())
    }

    async fn customer_categories(
        &self,
        customer_codes: &[String],
    ) -> AnalyticsResult<Vec<CustomerCategory>> {
        self.enter("customer_categories")?;
        let fixture = self.data.lock();
        Ok(customer_codes
            .iter()
            .filter_map(|code| {
                fixture.customers.get(code).map(|category| CustomerCategory {
                    customer_code: code.clone(),
                    category_code: category.clone(),
                })
            })
            .collect())
    }

    async fn distinct_stores(&self) -> AnalyticsResult<Vec<String>> {
        self.enter("distinct_stores")?;
        let fixture = self.data.lock();
        Ok(fixture
            .docs
            .iter()
            .filter(|doc| doc.header.doc_type == DocType::TaxInvoice.code())
            .map(|doc| doc.header.store_code.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect())
    }

    async fn distinct_salespeople(&self) -> AnalyticsResult<Vec<String>> {
        self.enter("distinct_salespeople")?;
        let fixture = self.data.lock();
        Ok(fixture
            .docs
            .iter()
            .filter(|doc| doc.header.doc_type == DocType::TaxInvoice.code())
            .filter_map(|doc| doc.header.salesperson_code.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect())
    }

    async fn ping(&self) -> AnalyticsResult<()> {
        self.enter("ping")
    }
}

/// Hands out fake repositories per tenant through the real registry
#[derive(Default)]
pub struct FakeFactory {
    repositories: HashMap<String, Arc<FakeRepository>>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(mut self, key: &str, repository: Arc<FakeRepository>) -> Self {
        self.repositories.insert(key.to_uppercase(), repository);
        self
    }
}

#[async_trait]
impl ConnectionFactory for FakeFactory {
    type Connection = Arc<dyn SalesRepository>;

    async fn connect(&self, target: &ConnectionTarget) -> AnalyticsResult<Self::Connection> {
        match self.repositories.get(&target.key) {
            Some(repository) => Ok(Arc::clone(repository) as Arc<dyn SalesRepository>),
            None => Err(AnalyticsError::connection(
                &target.database,
                "connection refused",
            )),
        }
    }

    async fn close(&self, _connection: &Self::Connection) -> AnalyticsResult<()> {
        Ok(())
    }

    fn snapshot(&self, key: &str, _connection: &Self::Connection) -> PoolSnapshot {
        PoolSnapshot {
            name: key.to_string(),
            size: 2,
            idle: 2,
            active: 0,
            max_connections: 10,
        }
    }
}
