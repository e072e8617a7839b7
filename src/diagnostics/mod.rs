//! # Diagnostics
//!
//! Serializable snapshots of pool, executor and cache state for operators.

pub mod health;

pub use health::{HealthReport, HealthStatus, PoolInfo, TenantHealth};
