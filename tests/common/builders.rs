//! Config, system and fixture builders shared by the integration tests.

use super::fake_repository::{Doc, FakeFactory, FakeRepository};
use chrono::NaiveDate;
use sales_analytics::cache::{CacheCoordinator, CacheKeyBuilder, CacheProvider};
use sales_analytics::config::AnalyticsConfig;
use sales_analytics::database::ConnectionRegistry;
use sales_analytics::query::QueryFilter;
use sales_analytics::resilience::{CircuitBreakerConfig, ExecutorConfig, RetryConfig};
use sales_analytics::AnalyticsSystem;
use std::sync::Arc;
use std::time::Duration;

pub const TENANT: &str = "MY";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn filter(start: NaiveDate, end: NaiveDate) -> QueryFilter {
    QueryFilter::new(start, end).unwrap()
}

/// Fast retries, no jitter, no warming delays, one tenant
pub fn test_config() -> AnalyticsConfig {
    let mut config = AnalyticsConfig::default();
    config.environment = "test".to_string();
    config
        .tenants
        .insert(TENANT.to_string(), "sales_my".to_string());
    config.database.connect_retries = 0;

    config.executor = ExecutorConfig {
        breaker: CircuitBreakerConfig {
            network_threshold: 3,
            schema_threshold: 5,
            total_threshold: 10,
            reset_timeout_ms: 1_000,
            half_open_max_probes: 1,
        },
        retry: RetryConfig {
            network_max_retries: 3,
            default_max_retries: 2,
            schema_max_retries: 1,
            base_delay_ms: 10,
            max_delay_ms: 100,
            max_jitter_ms: 0,
        },
        base_query_timeout_ms: 5_000,
        max_concurrent_queries: 4,
    };

    config.warming.startup_delay_seconds = 1;
    config.warming.interval_seconds = 60;
    config.warming.base_delay_ms = 10;
    config.warming.max_delay_ms = 50;
    config.warming.inter_range_delay_ms = 0;
    config
}

pub struct Harness {
    pub system: AnalyticsSystem,
    pub repo: Arc<FakeRepository>,
}

pub fn harness() -> Harness {
    harness_with(test_config(), CacheProvider::moka(10_000, Duration::from_secs(3_600)))
}

pub fn harness_without_cache() -> Harness {
    harness_with(test_config(), CacheProvider::noop())
}

pub fn harness_with(config: AnalyticsConfig, provider: CacheProvider) -> Harness {
    let repo = FakeRepository::new();
    let factory = FakeFactory::new().with_tenant(TENANT, Arc::clone(&repo));
    let registry = ConnectionRegistry::new(factory, &config);
    let cache = CacheCoordinator::new(
        provider,
        CacheKeyBuilder::new("analytics"),
        Duration::from_secs(3_600),
    );

    Harness {
        system: AnalyticsSystem::with_provider(config, Arc::new(registry), cache),
        repo,
    }
}

/// Three stores, two salespeople, customers in RETAIL, TRADE and none,
/// spread over the first quarter of 2024
pub fn seed_quarter(repo: &FakeRepository) {
    repo.set_customer("C-RETAIL", Some("RETAIL"));
    repo.set_customer("C-TRADE", Some("TRADE"));
    repo.set_customer("C-NONE", None);

    let customers = ["C-RETAIL", "C-TRADE", "C-NONE", "C-UNKNOWN"];
    let stores = ["001", "002", "003"];
    let salespeople = ["S1", "S2"];

    let mut day = date(2024, 1, 1);
    let mut n = 0;
    while day <= date(2024, 3, 31) {
        if n % 2 == 0 {
            let i = n / 2;
            let doc_no = format!("IN{n:05}");
            repo.insert(
                Doc::invoice(&doc_no, day, stores[i % stores.len()])
                    .salesperson(salespeople[i % salespeople.len()])
                    .customer(customers[i % customers.len()])
                    .line("P1", Some("FOOD"), 2.0, 230.0, 30.0)
                    .line("P2", Some("DRINK"), 1.0, 115.0 + n as f64, 15.0),
            );
        }
        if n % 7 == 0 {
            let doc_no = format!("CR{n:05}");
            repo.insert(
                Doc::credit_note(&doc_no, day, stores[n % stores.len()])
                    .salesperson("S1")
                    .customer("C-RETAIL")
                    .line("P1", Some("FOOD"), -1.0, -115.0, -15.0),
            );
        }
        day = day.succ_opt().unwrap();
        n += 1;
    }
}
