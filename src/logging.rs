//! # Structured Logging Module
//!
//! Environment-aware structured logging for the analytics core. Console
//! output is human readable by default and switches to JSON lines when
//! `ANALYTICS_LOG_FORMAT=json`, which is what the deployed warmer uses.

use chrono::Utc;
use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
///
/// Safe to call more than once; an already installed global subscriber is kept.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json = wants_json_output();

        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(std::io::stdout().is_terminal())
                .with_filter(filter)
                .boxed()
        };

        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json = json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

fn get_environment() -> String {
    std::env::var("ANALYTICS_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

fn wants_json_output() -> bool {
    std::env::var("ANALYTICS_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log structured data for a protected tenant query
pub fn log_query_operation(
    operation: &str,
    tenant: &str,
    span_days: i64,
    status: &str,
    duration_ms: Option<u64>,
    rows: Option<usize>,
) {
    tracing::info!(
        operation = %operation,
        tenant = %tenant,
        span_days = span_days,
        status = %status,
        duration_ms = duration_ms,
        rows = rows,
        timestamp = %Utc::now().to_rfc3339(),
        "📊 QUERY_OPERATION"
    );
}

/// Log structured data for cache reads, writes and invalidations
pub fn log_cache_operation(operation: &str, key: &str, status: &str, details: Option<&str>) {
    tracing::debug!(
        operation = %operation,
        key = %key,
        status = %status,
        details = details,
        "💾 CACHE_OPERATION"
    );
}

/// Log the terminal summary of a warming cycle
pub fn log_warming_summary(
    tenant: &str,
    ranges_total: usize,
    successes: usize,
    errors: usize,
    duration_ms: u64,
) {
    let success_rate = if ranges_total == 0 {
        100.0
    } else {
        successes as f64 / ranges_total as f64 * 100.0
    };

    tracing::info!(
        tenant = %tenant,
        ranges_total = ranges_total,
        successes = successes,
        errors = errors,
        success_rate = %format!("{success_rate:.1}%"),
        duration_ms = duration_ms,
        timestamp = %Utc::now().to_rfc3339(),
        "🔥 CACHE_WARMING_SUMMARY"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("unknown"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging();
        init_structured_logging();
        log_cache_operation("get", "analytics:daily:MY", "hit", None);
    }
}
