//! Pool information and connection health reports.

use crate::database::PoolSnapshot;
use crate::resilience::{CircuitState, ExecutorSnapshot};
use crate::warming::WarmingPhase;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Overall verdict of a health check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    /// Reachable, but the breaker is not closed, a pool is saturated, or the cache is down
    Degraded,
    Unhealthy,
}

/// Pools, executor and warmer at a point in time
#[derive(Debug, Clone, Serialize)]
pub struct PoolInfo {
    pub pools: Vec<PoolSnapshot>,
    pub executor: ExecutorSnapshot,
    pub warming: WarmingPhase,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantHealth {
    pub tenant: String,
    pub reachable: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
    pub pool: Option<PoolSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub tenants: Vec<TenantHealth>,
    /// `None` when no consolidated source is configured
    pub consolidated: Option<TenantHealth>,
    pub breaker: CircuitState,
    pub active_queries: usize,
    pub cache_provider: &'static str,
    pub cache_healthy: bool,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    /// Unhealthy when nothing answers, degraded when anything is impaired
    pub fn evaluate(
        tenants: &[TenantHealth],
        consolidated: Option<&TenantHealth>,
        breaker: CircuitState,
        cache_healthy: bool,
    ) -> HealthStatus {
        let reachable = tenants.iter().filter(|t| t.reachable).count();
        if !tenants.is_empty() && reachable == 0 {
            return HealthStatus::Unhealthy;
        }

        let saturated = tenants
            .iter()
            .filter_map(|t| t.pool.as_ref())
            .any(PoolSnapshot::is_saturated);
        let consolidated_down = consolidated.is_some_and(|c| !c.reachable);

        if reachable < tenants.len()
            || consolidated_down
            || saturated
            || breaker != CircuitState::Closed
            || !cache_healthy
        {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(code: &str, reachable: bool) -> TenantHealth {
        TenantHealth {
            tenant: code.to_string(),
            reachable,
            latency_ms: 3,
            error: (!reachable).then(|| "connection refused".to_string()),
            pool: None,
        }
    }

    #[test]
    fn test_all_reachable_is_healthy() {
        let tenants = vec![tenant("MY", true), tenant("SG", true)];
        assert_eq!(
            HealthReport::evaluate(&tenants, None, CircuitState::Closed, true),
            HealthStatus::Healthy
        );
    }

    #[test]
    fn test_partial_outage_or_open_breaker_degrades() {
        let tenants = vec![tenant("MY", true), tenant("SG", false)];
        assert_eq!(
            HealthReport::evaluate(&tenants, None, CircuitState::Closed, true),
            HealthStatus::Degraded
        );

        let tenants = vec![tenant("MY", true)];
        assert_eq!(
            HealthReport::evaluate(&tenants, None, CircuitState::HalfOpen, true),
            HealthStatus::Degraded
        );
    }

    #[test]
    fn test_nothing_reachable_is_unhealthy() {
        let tenants = vec![tenant("MY", false)];
        assert_eq!(
            HealthReport::evaluate(&tenants, None, CircuitState::Open, false),
            HealthStatus::Unhealthy
        );
    }
}
