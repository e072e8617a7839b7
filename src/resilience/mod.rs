//! # Resilience Module
//!
//! Fault tolerance for tenant queries: a failure-class aware circuit breaker,
//! per-class retry budgets with capped exponential backoff, span-adaptive
//! timeouts and a concurrency limiter, all composed by
//! [`ProtectedQueryExecutor`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sales_analytics::resilience::{ExecutorConfig, ProtectedQueryExecutor};
//!
//! # async fn example() -> sales_analytics::AnalyticsResult<()> {
//! let executor = ProtectedQueryExecutor::new(ExecutorConfig::default(), 10);
//!
//! let rows = executor
//!     .execute("daily_aggregations", 30, || async {
//!         Ok::<_, sales_analytics::AnalyticsError>(vec![1, 2, 3])
//!     })
//!     .await?;
//! assert_eq!(rows.len(), 3);
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod executor;
pub mod metrics;

pub use circuit_breaker::{CallPermit, CircuitBreaker, CircuitState};
pub use config::{CircuitBreakerConfig, ExecutorConfig, RetryConfig};
pub use executor::{ExecutorSnapshot, ProtectedQueryExecutor};
pub use metrics::CircuitBreakerMetrics;
