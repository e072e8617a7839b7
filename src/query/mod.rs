//! # Query Layer
//!
//! Filters, typed rows and the repository traits the aggregation engine reads
//! through, plus the PostgreSQL implementation.

pub mod filter;
pub mod postgres;
pub mod repository;
pub mod rows;

pub use filter::{CategoryMode, DocType, QueryFilter};
pub use postgres::PgSalesRepository;
pub use repository::{RepositoryHandle, RepositoryProvider, SalesRepository};
pub use rows::{
    AllAggregations, BranchAggregation, CategoryAggregation, CustomerCategory, DailyAggregation,
    ProductAggregation, SalesHeader, SalesLine, SalesLineWithCategory, SalespersonAggregation,
};

/// Repository provider over PostgreSQL pools
pub type PgRepositoryProvider =
    crate::database::ConnectionRegistry<crate::database::PgConnectionFactory>;
