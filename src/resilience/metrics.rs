//! # Circuit Breaker Metrics
//!
//! Point-in-time snapshots of the executor's breaker, used by the diagnostic
//! endpoints and attached to step failures of composite reads.

use crate::resilience::CircuitState;
use serde::{Deserialize, Serialize};

/// Metrics for a single circuit breaker instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    pub name: String,

    /// Current circuit breaker state
    pub current_state: CircuitState,

    /// Failures of any class since the last reset
    pub total_failures: u64,

    pub network_failures: u64,
    pub schema_failures: u64,

    /// Probe calls currently in flight while half-open
    pub half_open_probes: u32,

    /// Total number of recorded logical calls
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,

    /// How many times the circuit has opened since start
    pub times_opened: u64,

    pub last_failure_ms_ago: Option<u64>,
}

impl CircuitBreakerMetrics {
    /// Calculated failure rate (0.0 to 1.0)
    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        self.failure_count as f64 / self.total_calls as f64
    }

    /// Check if metrics indicate healthy operation
    pub fn is_healthy(&self) -> bool {
        match self.current_state {
            CircuitState::Closed => self.total_calls < 10 || self.failure_rate() < 0.1,
            CircuitState::Open => false,
            CircuitState::HalfOpen => true,
        }
    }

    /// Get human-readable state description
    pub fn state_description(&self) -> &'static str {
        match self.current_state {
            CircuitState::Closed => "Healthy - Normal operation",
            CircuitState::Open => "Failing - Rejecting all calls",
            CircuitState::HalfOpen => "Recovering - Testing system health",
        }
    }

    /// Format metrics for logging
    pub fn format_summary(&self) -> String {
        format!(
            "State: {} | Calls: {} | Failure rate: {:.1}% | Network: {} | Schema: {} | Opened: {}x",
            self.state_description(),
            self.total_calls,
            self.failure_rate() * 100.0,
            self.network_failures,
            self.schema_failures,
            self.times_opened
        )
    }
}
