//! # Database Layer
//!
//! Per-tenant connection pools and PostgreSQL error classification.
//!
//! - [`registry`] - lazily created, memoized pools keyed by tenant code
//! - [`error_codes`] - SQLSTATE constants used to classify driver errors
//! - [`pool_stats`] - pool snapshots for diagnostics

pub mod error_codes;
pub mod pool_stats;
pub mod registry;

pub use error_codes::PgErrorCode;
pub use pool_stats::PoolSnapshot;
pub use registry::{
    ConnectionFactory, ConnectionRegistry, ConnectionTarget, PgConnectionFactory,
    CONSOLIDATED_KEY,
};
