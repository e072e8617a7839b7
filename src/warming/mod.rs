//! # Cache Warming
//!
//! Background population of the analytics cache for the date ranges
//! dashboards ask for most.

pub mod ranges;
pub mod scheduler;
pub mod warmer;

pub use ranges::{canonical_ranges, WarmRange};
pub use scheduler::{IntervalScheduler, ManualScheduler, Scheduler};
pub use warmer::{CacheWarmer, RangeOutcome, WarmingHandle, WarmingPhase, WarmingSummary};
