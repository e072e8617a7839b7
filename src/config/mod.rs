//! # Analytics Configuration
//!
//! Typed configuration for the analytics core. Every section carries the
//! documented fallback values through `Default`, so a deployment only needs to
//! override what differs. Loading and layering lives in [`loader`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sales_analytics::config::ConfigManager;
//!
//! # fn main() -> sales_analytics::AnalyticsResult<()> {
//! let manager = ConfigManager::load()?;
//! let pool = &manager.config().database.pool;
//! println!("max connections: {}", pool.max_connections);
//! # Ok(())
//! # }
//! ```

pub mod loader;

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::resilience::ExecutorConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub use loader::ConfigManager;

/// Root configuration structure mirroring `config/analytics.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Deployment environment (test, development, production)
    pub environment: String,

    pub database: DatabaseConfig,

    /// Tenant code → database name
    pub tenants: BTreeMap<String, String>,

    pub executor: ExecutorConfig,
    pub cache: CacheConfig,
    pub chunking: ChunkingConfig,
    pub warming: WarmingConfig,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            database: DatabaseConfig::default(),
            tenants: BTreeMap::new(),
            executor: ExecutorConfig::default(),
            cache: CacheConfig::default(),
            chunking: ChunkingConfig::default(),
            warming: WarmingConfig::default(),
        }
    }
}

impl AnalyticsConfig {
    /// Validate every section; the first problem found is reported
    pub fn validate(&self) -> AnalyticsResult<()> {
        let invalid = |section: &str, message: String| {
            AnalyticsError::Config(format!("invalid [{section}] configuration: {message}"))
        };

        self.database
            .validate()
            .map_err(|e| invalid("database", e))?;
        self.executor
            .validate()
            .map_err(|e| invalid("executor", e))?;
        self.cache.validate().map_err(|e| invalid("cache", e))?;
        self.chunking
            .validate()
            .map_err(|e| invalid("chunking", e))?;
        self.warming
            .validate()
            .map_err(|e| invalid("warming", e))?;

        for (code, database) in &self.tenants {
            if code.trim().is_empty() || database.trim().is_empty() {
                return Err(invalid(
                    "tenants",
                    format!("tenant '{code}' must map to a non-empty database name"),
                ));
            }
        }

        for tenant in &self.warming.tenants {
            if self.tenant_database(tenant).is_none() {
                return Err(invalid(
                    "warming",
                    format!("warming tenant '{tenant}' is not a configured tenant"),
                ));
            }
        }

        Ok(())
    }

    /// Resolve a tenant code to its database name, ignoring case
    pub fn tenant_database(&self, tenant: &str) -> Option<&str> {
        self.tenants
            .iter()
            .find(|(code, _)| code.eq_ignore_ascii_case(tenant))
            .map(|(_, database)| database.as_str())
    }

    /// Uppercased tenant codes in a stable order
    pub fn tenant_codes(&self) -> Vec<String> {
        self.tenants.keys().map(|code| code.to_uppercase()).collect()
    }

    /// Concurrency cap actually used: strictly below the pool's max connections
    pub fn effective_max_concurrent_queries(&self) -> usize {
        let headroom = (self.database.pool.max_connections as usize)
            .saturating_sub(1)
            .max(1);
        self.executor.max_concurrent_queries.clamp(1, headroom)
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

/// Remote database connection settings shared by all tenants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,

    /// disable, prefer or require
    pub ssl_mode: String,

    /// Database holding cross-tenant reference data such as exchange rates
    pub consolidated_database: Option<String>,

    pub pool: PoolConfig,

    /// Extra attempts when a pool cannot be established
    pub connect_retries: u32,
    pub connect_retry_backoff_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            username: "analytics".to_string(),
            password: String::new(),
            ssl_mode: "prefer".to_string(),
            consolidated_database: None,
            pool: PoolConfig::default(),
            connect_retries: 3,
            connect_retry_backoff_ms: 2_000,
        }
    }
}

impl DatabaseConfig {
    /// `host:port/database`, safe to log
    pub fn target(&self, database: &str) -> String {
        format!("{}:{}/{}", self.host, self.port, database)
    }

    pub fn connect_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_retry_backoff_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("host must not be empty".to_string());
        }

        if self.port == 0 {
            return Err("port must be greater than 0".to_string());
        }

        if !matches!(self.ssl_mode.as_str(), "disable" | "prefer" | "require") {
            return Err(format!(
                "ssl_mode must be one of disable, prefer, require (got '{}')",
                self.ssl_mode
            ));
        }

        self.pool.validate()
    }
}

/// Per-tenant pool sizing and timeouts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
    pub max_lifetime_seconds: u64,

    /// Server-side `statement_timeout` applied to every pooled connection
    pub statement_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            connect_timeout_seconds: 30,
            acquire_timeout_seconds: 30,
            idle_timeout_seconds: 300,
            max_lifetime_seconds: 1_800,
            statement_timeout_ms: 180_000,
        }
    }
}

impl PoolConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_seconds)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections < 2 {
            return Err("pool.max_connections must be at least 2".to_string());
        }

        if self.min_connections > self.max_connections {
            return Err(format!(
                "pool.min_connections ({}) exceeds pool.max_connections ({})",
                self.min_connections, self.max_connections
            ));
        }

        if self.acquire_timeout_seconds == 0 || self.connect_timeout_seconds == 0 {
            return Err("pool timeouts must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Cache store selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[serde(alias = "memory")]
    Moka,
    Redis,
    Noop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub backend: CacheBackend,

    /// Fixed TTL for every entry
    pub ttl_seconds: u64,

    /// Entry bound for the in-process store
    pub max_capacity: u64,

    pub redis_url: Option<String>,

    /// Namespace prepended to every key
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Moka,
            ttl_seconds: 3_600,
            max_capacity: 10_000,
            redis_url: None,
            key_prefix: "analytics".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }

        if self.ttl_seconds == 0 {
            return Err("ttl_seconds must be greater than 0".to_string());
        }

        if self.key_prefix.is_empty() || self.key_prefix.contains(['*', ':']) {
            return Err("key_prefix must be non-empty and contain no '*' or ':'".to_string());
        }

        if self.backend == CacheBackend::Redis && self.redis_url.is_none() {
            return Err("redis_url is required for the redis backend".to_string());
        }

        Ok(())
    }
}

/// Date-range splitting for oversized queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Ranges spanning more days than this are split
    pub threshold_days: i64,
    pub chunk_days: i64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            threshold_days: 60,
            chunk_days: 30,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_days <= 0 {
            return Err("chunk_days must be greater than 0".to_string());
        }

        if self.threshold_days < self.chunk_days {
            return Err("threshold_days must not be lower than chunk_days".to_string());
        }

        Ok(())
    }
}

/// Background cache warming schedule and retry budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmingConfig {
    pub enabled: bool,
    pub startup_delay_seconds: u64,
    pub interval_seconds: u64,

    /// Attempts per range, including the first
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,

    /// Pause between ranges so the pool can recover
    pub inter_range_delay_ms: u64,

    /// Tenants to warm; empty means every configured tenant
    pub tenants: Vec<String>,
}

impl Default for WarmingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            startup_delay_seconds: 30,
            interval_seconds: 3_600,
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 5_000,
            inter_range_delay_ms: 2_000,
            tenants: Vec::new(),
        }
    }
}

impl WarmingConfig {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_seconds)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn inter_range_delay(&self) -> Duration {
        Duration::from_millis(self.inter_range_delay_ms)
    }

    /// `min(max_delay, base * 2^(attempt-1))` for a 1-based attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let backoff = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(backoff.min(self.max_delay_ms))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".to_string());
        }

        if self.enabled && self.interval_seconds == 0 {
            return Err("interval_seconds must be greater than 0".to_string());
        }

        if self.max_delay_ms < self.base_delay_ms {
            return Err("max_delay_ms must not be lower than base_delay_ms".to_string());
        }

        Ok(())
    }
}
