//! # Circuit Breaker and Retry Configuration
//!
//! Provides the configuration structures and validation for the protected
//! query executor: breaker thresholds per failure class, retry budgets and
//! backoff, adaptive timeout base and the concurrency cap.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Breaker thresholds per failure class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Network-class failures (timeouts, resets, pool exhaustion) before opening
    pub network_threshold: u32,

    /// Schema-class failures before opening; higher than the network threshold
    pub schema_threshold: u32,

    /// Failures of any class before opening
    pub total_threshold: u32,

    /// Time to wait in open state before admitting a half-open probe
    pub reset_timeout_ms: u64,

    /// Concurrent probes allowed while half-open
    pub half_open_max_probes: u32,
}

impl CircuitBreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.network_threshold == 0 {
            return Err("network_threshold must be greater than 0".to_string());
        }

        if self.schema_threshold < self.network_threshold {
            return Err("schema_threshold should not be lower than network_threshold".to_string());
        }

        if self.total_threshold == 0 {
            return Err("total_threshold must be greater than 0".to_string());
        }

        if self.total_threshold > 100 {
            return Err("total_threshold should not exceed 100".to_string());
        }

        if self.reset_timeout_ms == 0 {
            return Err("reset_timeout_ms must be greater than 0".to_string());
        }

        if self.reset_timeout_ms > 300_000 {
            return Err("reset_timeout_ms should not exceed 300 seconds".to_string());
        }

        if self.half_open_max_probes == 0 {
            return Err("half_open_max_probes must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            network_threshold: 3,
            schema_threshold: 5,
            total_threshold: 10,
            reset_timeout_ms: 30_000,
            half_open_max_probes: 1,
        }
    }
}

/// Retry budgets per failure class and capped exponential backoff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after a network-class failure
    pub network_max_retries: u32,

    /// Retries after an unclassified driver failure
    pub default_max_retries: u32,

    /// Retries after a schema-class failure; strictly below the other budgets
    pub schema_max_retries: u32,

    pub base_delay_ms: u64,
    pub max_delay_ms: u64,

    /// Upper bound of the random jitter added to every backoff
    pub max_jitter_ms: u64,
}

impl RetryConfig {
    /// `min(max_delay, base * 2^(attempt-1) + jitter)` for a 1-based attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let backoff = self.base_delay_ms.saturating_mul(1u64 << exponent);
        let jitter = if self.max_jitter_ms > 0 {
            fastrand::u64(0..=self.max_jitter_ms)
        } else {
            0
        };
        Duration::from_millis(backoff.saturating_add(jitter).min(self.max_delay_ms))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.schema_max_retries >= self.default_max_retries
            || self.schema_max_retries >= self.network_max_retries
        {
            return Err(
                "schema_max_retries must be strictly smaller than the other retry budgets"
                    .to_string(),
            );
        }

        if self.max_delay_ms < self.base_delay_ms {
            return Err("max_delay_ms must not be lower than base_delay_ms".to_string());
        }

        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            network_max_retries: 3,
            default_max_retries: 2,
            schema_max_retries: 1,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            max_jitter_ms: 500,
        }
    }
}

/// Full executor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,

    /// Query timeout for a 31-60 day range; scaled for other spans
    pub base_query_timeout_ms: u64,

    /// Simultaneous protected calls; clamped below the pool size at bootstrap
    pub max_concurrent_queries: usize,
}

impl ExecutorConfig {
    pub fn base_query_timeout(&self) -> Duration {
        Duration::from_millis(self.base_query_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.breaker.validate()?;
        self.retry.validate()?;

        if self.base_query_timeout_ms == 0 {
            return Err("base_query_timeout_ms must be greater than 0".to_string());
        }

        if self.max_concurrent_queries == 0 {
            return Err("max_concurrent_queries must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
            base_query_timeout_ms: 60_000,
            max_concurrent_queries: 8,
        }
    }
}
