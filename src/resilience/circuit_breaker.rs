//! # Circuit Breaker Implementation
//!
//! Fault isolation for the tenant databases. Three states: Closed (normal
//! operation), Open (failing fast) and Half-Open (testing recovery).
//!
//! Unlike a single consecutive-failure counter, this breaker keeps separate
//! counts per failure class so network-class failures trip it faster than
//! schema-class failures. The Open → Half-Open transition is observed lazily on
//! the next admission attempt; there is no background timer.

use crate::error::{AnalyticsError, ErrorClass};
use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - a limited number of probe calls are allowed
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug)]
struct BreakerCounters {
    state: CircuitState,
    total_failures: u64,
    network_failures: u64,
    schema_failures: u64,
    last_failure_at: Option<Instant>,
    half_open_probes: u32,
    total_calls: u64,
    success_count: u64,
    failure_count: u64,
    times_opened: u64,
}

impl BreakerCounters {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            total_failures: 0,
            network_failures: 0,
            schema_failures: 0,
            last_failure_at: None,
            half_open_probes: 0,
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            times_opened: 0,
        }
    }

    fn reset_failures(&mut self) {
        self.total_failures = 0;
        self.network_failures = 0;
        self.schema_failures = 0;
    }
}

/// Admission ticket for one logical call
///
/// Half-open probes hold a slot until the permit is dropped, so an abandoned
/// call (timeout, cancelled future) never leaks a probe slot.
#[derive(Debug)]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
}

impl CallPermit<'_> {
    pub fn is_probe(&self) -> bool {
        self.probe
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if self.probe {
            self.breaker.release_probe();
        }
    }
}

/// Class-aware circuit breaker; all counters live behind one lock
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging and metrics
    name: String,

    config: CircuitBreakerConfig,

    counters: Mutex<BreakerCounters>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: String, config: CircuitBreakerConfig) -> Self {
        info!(
            component = %name,
            network_threshold = config.network_threshold,
            schema_threshold = config.schema_threshold,
            total_threshold = config.total_threshold,
            reset_timeout_ms = config.reset_timeout_ms,
            half_open_max_probes = config.half_open_max_probes,
            "Circuit breaker initialized"
        );

        Self {
            name,
            config,
            counters: Mutex::new(BreakerCounters::new()),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        self.counters.lock().state
    }

    /// Admit a call or reject it with the estimated remaining cool-down
    pub fn try_acquire(&self) -> Result<CallPermit<'_>, AnalyticsError> {
        let mut counters = self.counters.lock();
        let reset_timeout = self.config.reset_timeout();

        match counters.state {
            CircuitState::Closed => Ok(CallPermit {
                breaker: self,
                probe: false,
            }),
            CircuitState::Open => {
                let elapsed = counters
                    .last_failure_at
                    .map(|at| at.elapsed())
                    .unwrap_or(reset_timeout);

                if elapsed >= reset_timeout {
                    counters.state = CircuitState::HalfOpen;
                    counters.half_open_probes = 1;
                    info!(
                        component = %self.name,
                        max_probes = self.config.half_open_max_probes,
                        "Circuit breaker half-open (testing recovery)"
                    );
                    Ok(CallPermit {
                        breaker: self,
                        probe: true,
                    })
                } else {
                    let retry_after = reset_timeout - elapsed;
                    debug!(
                        component = %self.name,
                        retry_after_ms = retry_after.as_millis(),
                        "Circuit open, rejecting call"
                    );
                    Err(AnalyticsError::BreakerOpen { retry_after })
                }
            }
            CircuitState::HalfOpen => {
                if counters.half_open_probes < self.config.half_open_max_probes {
                    counters.half_open_probes += 1;
                    Ok(CallPermit {
                        breaker: self,
                        probe: true,
                    })
                } else {
                    debug!(
                        component = %self.name,
                        in_flight_probes = counters.half_open_probes,
                        "Half-open probe limit reached, rejecting call"
                    );
                    Err(AnalyticsError::BreakerOpen {
                        retry_after: Duration::ZERO,
                    })
                }
            }
        }
    }

    /// Record a successful logical call
    pub fn record_success(&self, permit: &CallPermit<'_>, duration: Duration) {
        let mut counters = self.counters.lock();
        counters.total_calls += 1;
        counters.success_count += 1;

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis(),
            "Operation succeeded"
        );

        match counters.state {
            CircuitState::HalfOpen if permit.probe => {
                Self::close(&self.name, &mut counters);
            }
            CircuitState::Closed => counters.reset_failures(),
            CircuitState::HalfOpen => {}
            CircuitState::Open => {
                warn!(component = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    /// Record the final failure of a logical call
    pub fn record_failure(&self, permit: &CallPermit<'_>, class: ErrorClass, duration: Duration) {
        let mut counters = self.counters.lock();
        counters.total_calls += 1;
        counters.failure_count += 1;
        counters.last_failure_at = Some(Instant::now());

        error!(
            component = %self.name,
            duration_ms = duration.as_millis(),
            error_class = ?class,
            "Operation failed"
        );

        match counters.state {
            CircuitState::Closed => {
                counters.total_failures += 1;
                match class {
                    ErrorClass::Network => counters.network_failures += 1,
                    ErrorClass::Schema => counters.schema_failures += 1,
                    ErrorClass::Default | ErrorClass::Fatal => {}
                }

                if counters.network_failures >= u64::from(self.config.network_threshold)
                    || counters.schema_failures >= u64::from(self.config.schema_threshold)
                    || counters.total_failures >= u64::from(self.config.total_threshold)
                {
                    self.open(&mut counters);
                }
            }
            CircuitState::HalfOpen if permit.probe => {
                // Any probe failure reopens the circuit and restarts the cool-down
                self.open(&mut counters);
            }
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn release_probe(&self) {
        let mut counters = self.counters.lock();
        if counters.state == CircuitState::HalfOpen {
            counters.half_open_probes = counters.half_open_probes.saturating_sub(1);
        }
    }

    fn close(name: &str, counters: &mut BreakerCounters) {
        counters.state = CircuitState::Closed;
        counters.reset_failures();
        counters.half_open_probes = 0;
        counters.last_failure_at = None;

        info!(
            component = %name,
            total_calls = counters.total_calls,
            "Circuit breaker closed (recovered)"
        );
    }

    fn open(&self, counters: &mut BreakerCounters) {
        counters.state = CircuitState::Open;
        counters.half_open_probes = 0;
        counters.times_opened += 1;
        counters.last_failure_at = Some(Instant::now());

        error!(
            component = %self.name,
            network_failures = counters.network_failures,
            schema_failures = counters.schema_failures,
            total_failures = counters.total_failures,
            reset_timeout_ms = self.config.reset_timeout_ms,
            "Circuit breaker opened (failing fast)"
        );
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        warn!(component = %self.name, "Circuit breaker forced open");
        let mut counters = self.counters.lock();
        self.open(&mut counters);
    }

    /// Force circuit to closed state (for emergency recovery)
    pub fn force_closed(&self) {
        warn!(component = %self.name, "Circuit breaker forced closed");
        let mut counters = self.counters.lock();
        Self::close(&self.name, &mut counters);
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let counters = self.counters.lock();
        CircuitBreakerMetrics {
            name: self.name.clone(),
            current_state: counters.state,
            total_failures: counters.total_failures,
            network_failures: counters.network_failures,
            schema_failures: counters.schema_failures,
            half_open_probes: counters.half_open_probes,
            total_calls: counters.total_calls,
            success_count: counters.success_count,
            failure_count: counters.failure_count,
            times_opened: counters.times_opened,
            last_failure_ms_ago: counters
                .last_failure_at
                .map(|at| at.elapsed().as_millis() as u64),
        }
    }

    /// Get component name
    pub fn name(&self) -> &str {
        &self.name
    }
}
