#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Sales Analytics Core
//!
//! Resilient multi-tenant data access and caching for sales analytics.
//!
//! ## Overview
//!
//! Each tenant is an isolated PostgreSQL database with the same sales schema.
//! The core hands reporting callers pre-aggregated results (by day, branch,
//! salesperson, category and product) plus raw header and line listings,
//! while protecting the shared, latency-sensitive tenant pools.
//!
//! ## Module Organization
//!
//! - [`database`] - Lazily created per-tenant pools behind a registry
//! - [`resilience`] - Circuit breaker, retry and the protected query executor
//! - [`cache`] - Deterministic keys and pluggable cache backends
//! - [`query`] - Filters, typed rows and the repository traits
//! - [`aggregation`] - The cached, chunked read path and category pre-grouping
//! - [`warming`] - Background cache warming over canonical date ranges
//! - [`diagnostics`] - Pool and health snapshots
//! - [`system`] - Wiring everything from one configuration
//! - [`config`] - Layered TOML and environment configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chrono::NaiveDate;
//! use sales_analytics::config::ConfigManager;
//! use sales_analytics::query::QueryFilter;
//! use sales_analytics::AnalyticsSystem;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let system = AnalyticsSystem::from_config(manager.config().clone()).await?;
//!
//! let filter = QueryFilter::new(
//!     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
//! )?
//! .with_store("001");
//!
//! let daily = system.daily_aggregations(&filter, "MY").await?;
//! println!("{} days with sales", daily.len());
//!
//! system.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod aggregation;
pub mod cache;
pub mod config;
pub mod database;
pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod query;
pub mod resilience;
pub mod system;
pub mod warming;

pub use aggregation::{AggregationEngine, DateChunk, DateRangeChunker};
pub use cache::{CacheCoordinator, CacheKeyBuilder, CacheProvider};
pub use config::{AnalyticsConfig, ConfigManager};
pub use database::{ConnectionRegistry, PgConnectionFactory, PoolSnapshot};
pub use diagnostics::{HealthReport, HealthStatus, PoolInfo};
pub use error::{AnalyticsError, AnalyticsResult, ErrorClass};
pub use query::{DocType, QueryFilter};
pub use resilience::{CircuitState, ProtectedQueryExecutor};
pub use system::AnalyticsSystem;
pub use warming::{CacheWarmer, WarmingSummary};
