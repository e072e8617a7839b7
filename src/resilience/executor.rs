//! # Protected Query Executor
//!
//! Wraps arbitrary query futures with the circuit breaker, class-aware
//! retry with capped exponential backoff, a timeout scaled to the requested
//! date span, and a concurrency limiter held below the pool size.
//!
//! One logical call counts once against the breaker: intermediate failures
//! that are retried are only logged, and only the final exhausted failure is
//! recorded.

use crate::error::{AnalyticsError, AnalyticsResult, ErrorClass};
use crate::resilience::{CircuitBreaker, CircuitBreakerMetrics, CircuitState, ExecutorConfig};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Diagnostic snapshot of the executor
#[derive(Debug, Clone, Serialize)]
pub struct ExecutorSnapshot {
    pub breaker: CircuitBreakerMetrics,
    pub active_queries: usize,
    pub max_concurrent_queries: usize,
    pub available_slots: usize,
}

/// Slot in the concurrency limiter; released on drop whatever the outcome
struct QuerySlot<'a> {
    _permit: SemaphorePermit<'a>,
    active: &'a AtomicUsize,
}

impl Drop for QuerySlot<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// The single stateful component guarding every tenant query
#[derive(Debug)]
pub struct ProtectedQueryExecutor {
    breaker: CircuitBreaker,
    config: ExecutorConfig,
    limiter: Semaphore,
    max_concurrent: usize,
    active_queries: AtomicUsize,
}

impl ProtectedQueryExecutor {
    /// Create an executor whose limiter stays strictly below `pool_max_connections`
    pub fn new(config: ExecutorConfig, pool_max_connections: u32) -> Arc<Self> {
        let headroom_cap = (pool_max_connections as usize).saturating_sub(1).max(1);
        let max_concurrent = config.max_concurrent_queries.clamp(1, headroom_cap);

        if max_concurrent < config.max_concurrent_queries {
            warn!(
                configured = config.max_concurrent_queries,
                effective = max_concurrent,
                pool_max_connections = pool_max_connections,
                "Clamping max_concurrent_queries below pool size"
            );
        }

        let breaker = CircuitBreaker::new("tenant_queries".to_string(), config.breaker.clone());

        Arc::new(Self {
            breaker,
            config,
            limiter: Semaphore::new(max_concurrent),
            max_concurrent,
            active_queries: AtomicUsize::new(0),
        })
    }

    /// Timeout scaled to the requested date span
    ///
    /// ≤30 days: 0.75× base, 31–60: base, 61–180: 1.5× base, beyond: 2× base.
    pub fn adaptive_timeout(&self, span_days: i64) -> Duration {
        let base = self.config.base_query_timeout();
        match span_days {
            d if d <= 30 => base.mul_f64(0.75),
            31..=60 => base,
            61..=180 => base.mul_f64(1.5),
            _ => base * 2,
        }
    }

    /// Retry budget for an error class
    pub fn max_retries_for(&self, class: ErrorClass) -> u32 {
        let retry = &self.config.retry;
        match class {
            ErrorClass::Network => retry.network_max_retries,
            ErrorClass::Default => retry.default_max_retries,
            ErrorClass::Schema => retry.schema_max_retries,
            ErrorClass::Fatal => 0,
        }
    }

    /// Run `query` under breaker, limiter, timeout and retry protection
    ///
    /// `query` is invoked once per attempt. On exhaustion the original typed
    /// error is returned, wrapped in `RetryExhausted` when more than one
    /// attempt was made.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        span_days: i64,
        mut query: F,
    ) -> AnalyticsResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AnalyticsResult<T>>,
    {
        let permit = self.breaker.try_acquire()?;
        let timeout = self.adaptive_timeout(span_days);
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let outcome = {
                let _slot = self.acquire_slot(operation).await?;
                match tokio::time::timeout(timeout, query()).await {
                    Ok(result) => result,
                    Err(_) => Err(AnalyticsError::QueryTimeout {
                        operation: operation.to_string(),
                        timeout,
                    }),
                }
            };

            let err = match outcome {
                Ok(value) => {
                    self.breaker.record_success(&permit, started.elapsed());
                    if attempt > 1 {
                        debug!(
                            operation = operation,
                            attempts = attempt,
                            "Query succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let class = err.class();
            let budget = self.max_retries_for(class);

            if attempt <= budget {
                let delay = self.config.retry.delay_for_attempt(attempt);
                warn!(
                    operation = operation,
                    attempt = attempt,
                    max_retries = budget,
                    error_class = ?class,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Query failed, retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if class != ErrorClass::Fatal {
                self.breaker.record_failure(&permit, class, started.elapsed());
            }

            warn!(
                operation = operation,
                attempts = attempt,
                error_class = ?class,
                elapsed_ms = started.elapsed().as_millis(),
                breaker_state = %self.breaker.state(),
                error = %err,
                "Query failed permanently"
            );

            return Err(if attempt > 1 {
                AnalyticsError::RetryExhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    source: Box::new(err),
                }
            } else {
                err
            });
        }
    }

    async fn acquire_slot(&self, operation: &str) -> AnalyticsResult<QuerySlot<'_>> {
        if self.limiter.available_permits() == 0 {
            debug!(
                operation = operation,
                max_concurrent = self.max_concurrent,
                "Concurrency limit reached, waiting for a free slot"
            );
        }

        let permit = self.limiter.acquire().await.map_err(|_| {
            AnalyticsError::TransientNetwork("query limiter closed".to_string())
        })?;
        self.active_queries.fetch_add(1, Ordering::AcqRel);

        Ok(QuerySlot {
            _permit: permit,
            active: &self.active_queries,
        })
    }

    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn active_queries(&self) -> usize {
        self.active_queries.load(Ordering::Acquire)
    }

    pub fn max_concurrent_queries(&self) -> usize {
        self.max_concurrent
    }

    /// Manually close the breaker after an operator has fixed the root cause
    pub fn reset_breaker(&self) {
        self.breaker.force_closed();
    }

    pub fn snapshot(&self) -> ExecutorSnapshot {
        ExecutorSnapshot {
            breaker: self.breaker.metrics(),
            active_queries: self.active_queries(),
            max_concurrent_queries: self.max_concurrent,
            available_slots: self.limiter.available_permits(),
        }
    }
}
