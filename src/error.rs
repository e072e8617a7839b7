//! Error types for the analytics core.
//!
//! A single [`AnalyticsError`] enum carries the failure taxonomy used by the
//! executor, the cache layer and the aggregation engine. The executor only ever
//! needs the coarse [`ErrorClass`] to pick a retry budget and a breaker counter.

use crate::database::error_codes::PgErrorCode;
use crate::database::PoolSnapshot;
use crate::resilience::CircuitState;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// Unknown tenant, bad database mapping or invalid settings. Never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A connection pool could not be established
    #[error("Connection error for {target}: {message}")]
    Connection { target: String, message: String },

    /// The executor's breaker rejected the call without running it
    #[error("Circuit breaker open, retry after {}ms", retry_after.as_millis())]
    BreakerOpen { retry_after: Duration },

    #[error("Query '{operation}' timed out after {}ms", timeout.as_millis())]
    QueryTimeout { operation: String, timeout: Duration },

    /// Reset/refused connections, I/O failures, pool exhaustion
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// Syntax errors, missing tables or columns, foreign-key violations
    #[error("Schema error: {0}")]
    Schema(String),

    /// Driver error that fits no other class
    #[error("Database error: {0}")]
    Database(String),

    #[error("Retries exhausted after {attempts} attempts for '{operation}': {source}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        source: Box<AnalyticsError>,
    },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A step of a composite read failed; carries the diagnostic context callers need
    #[error(
        "Aggregation step '{step}' failed after {}ms (operation {operation_id}, breaker {breaker:?}): {source}",
        elapsed.as_millis()
    )]
    AggregationStep {
        operation_id: Uuid,
        step: String,
        elapsed: Duration,
        breaker: CircuitState,
        active_queries: usize,
        pool: Option<PoolSnapshot>,
        source: Box<AnalyticsError>,
    },
}

/// Coarse classification used for retry budgets and breaker counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Infrastructure degradation: timeouts, resets, refused connections, exhausted pools
    Network,
    /// Likely permanent query problems
    Schema,
    /// Unclassified but worth retrying
    Default,
    /// Must not be retried at all
    Fatal,
}

impl AnalyticsError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::QueryTimeout { .. } | Self::TransientNetwork(_) | Self::Connection { .. } => {
                ErrorClass::Network
            }
            Self::Schema(_) => ErrorClass::Schema,
            Self::Database(_) | Self::Cache(_) => ErrorClass::Default,
            Self::Config(_) | Self::BreakerOpen { .. } | Self::Serialization(_) => {
                ErrorClass::Fatal
            }
            Self::RetryExhausted { source, .. } | Self::AggregationStep { source, .. } => {
                source.class()
            }
        }
    }

    /// Whether the executor treats this error as transient
    pub fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::Network | ErrorClass::Default)
    }

    /// "Temporarily degraded, retry later" as opposed to "needs a configuration or schema fix"
    pub fn is_temporary(&self) -> bool {
        matches!(self.root_cause(), Self::BreakerOpen { .. }) || self.is_retryable()
    }

    /// The innermost error, unwrapping retry and step context
    pub fn root_cause(&self) -> &AnalyticsError {
        match self {
            Self::RetryExhausted { source, .. } | Self::AggregationStep { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }

    pub fn connection(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            target: target.into(),
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for AnalyticsError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut => AnalyticsError::TransientNetwork(
                "connection pool exhausted: timed out acquiring a connection".to_string(),
            ),
            sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => AnalyticsError::TransientNetwork(err.to_string()),
            sqlx::Error::Configuration(_) => AnalyticsError::Config(err.to_string()),
            sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::TypeNotFound { .. }
            | sqlx::Error::Decode(_) => AnalyticsError::Schema(err.to_string()),
            sqlx::Error::Database(db_err) => match db_err.code() {
                Some(code) if PgErrorCode::is_query_canceled(&code) => {
                    AnalyticsError::QueryTimeout {
                        operation: "statement".to_string(),
                        timeout: Duration::ZERO,
                    }
                }
                Some(code) if PgErrorCode::is_connection_error(&code) => {
                    AnalyticsError::TransientNetwork(err.to_string())
                }
                Some(code) if PgErrorCode::is_schema_error(&code) => {
                    AnalyticsError::Schema(err.to_string())
                }
                _ => AnalyticsError::Database(err.to_string()),
            },
            _ => AnalyticsError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AnalyticsError {
    fn from(err: serde_json::Error) -> Self {
        AnalyticsError::Serialization(err.to_string())
    }
}

impl From<crate::cache::CacheError> for AnalyticsError {
    fn from(err: crate::cache::CacheError) -> Self {
        AnalyticsError::Cache(err.to_string())
    }
}

impl From<config::ConfigError> for AnalyticsError {
    fn from(err: config::ConfigError) -> Self {
        AnalyticsError::Config(err.to_string())
    }
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;
