//! # Analytics Cache
//!
//! ```text
//! CacheCoordinator               <- typed JSON get/set, deterministic keys
//!   └── CacheProvider (enum)     <- zero-cost dispatch, no vtable
//!         ├── Moka               <- in-process, per-entry TTL
//!         ├── Redis              <- shared store (feature `cache-redis`)
//!         └── NoOp               <- always miss, always succeed
//! ```
//!
//! Request-path reads and writes never fail a request; a broken store is a
//! cache miss. Values are JSON strings with a fixed TTL and last-write-wins.

pub mod coordinator;
pub mod errors;
pub mod keys;
pub mod provider;
pub mod providers;
pub mod traits;

pub use coordinator::CacheCoordinator;
pub use errors::{CacheError, CacheResult};
pub use keys::{glob_match, CacheKeyBuilder};
pub use provider::CacheProvider;
pub use providers::{MokaCacheService, NoOpCacheService};
pub use traits::CacheService;

#[cfg(feature = "cache-redis")]
pub use providers::RedisCacheService;
