//! # Aggregation
//!
//! The cached, chunked, executor-protected read path over tenant sales data.

pub mod chunker;
pub mod engine;
pub mod prefilter;
pub mod shapes;

pub use chunker::{DateChunk, DateRangeChunker};
pub use engine::AggregationEngine;
pub use prefilter::{
    filter_pre_grouped, group_by_category, tag_lines, CategoryGroups, CategoryPreFilter,
    GROUPED_DOMAIN, UNCATEGORIZED,
};
pub use shapes::RangeRead;
