//! # Cache Warmer
//!
//! Runs the aggregation pipeline for the canonical ranges of every tenant so
//! the common dashboard requests are answered from cache. Ranges are warmed
//! one at a time, each with a small retry budget of its own, and each warm is
//! followed by a check that every expected key landed in the cache. A failing
//! range is recorded and the cycle moves on.

use super::ranges::{canonical_ranges, WarmRange};
use super::scheduler::Scheduler;
use crate::aggregation::AggregationEngine;
use crate::config::WarmingConfig;
use crate::error::AnalyticsResult;
use crate::logging::{log_error, log_warming_summary};
use crate::query::QueryFilter;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Where a warming run currently is
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum WarmingPhase {
    Idle,
    Warming { tenant: String, range: &'static str },
    Verifying { tenant: String, range: &'static str },
}

/// Result of warming one range for one tenant
#[derive(Debug, Clone, Serialize)]
pub struct RangeOutcome {
    pub tenant: String,
    pub range: WarmRange,
    pub attempts: u32,
    pub warmed: bool,
    pub keys_expected: usize,
    pub keys_present: usize,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl RangeOutcome {
    /// Warmed and every expected key is in the cache
    pub fn is_success(&self) -> bool {
        self.warmed && self.keys_present == self.keys_expected
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WarmingSummary {
    pub started_at: DateTime<Utc>,
    pub reference_date: NaiveDate,
    pub outcomes: Vec<RangeOutcome>,
    pub duration_ms: u64,
}

impl WarmingSummary {
    pub fn successes(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn errors(&self) -> usize {
        self.outcomes.len() - self.successes()
    }

    /// Percentage of successful ranges, 100 for an empty run
    pub fn success_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            100.0
        } else {
            self.successes() as f64 / self.outcomes.len() as f64 * 100.0
        }
    }
}

pub struct CacheWarmer {
    engine: AggregationEngine,
    config: WarmingConfig,
    phase: Mutex<WarmingPhase>,
    // Serializes runs so a manual trigger never overlaps a scheduled one
    run_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for CacheWarmer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheWarmer")
            .field("config", &self.config)
            .field("phase", &*self.phase.lock())
            .finish_non_exhaustive()
    }
}

impl CacheWarmer {
    pub fn new(engine: AggregationEngine, config: WarmingConfig) -> Arc<Self> {
        Arc::new(Self {
            engine,
            config,
            phase: Mutex::new(WarmingPhase::Idle),
            run_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn phase(&self) -> WarmingPhase {
        self.phase.lock().clone()
    }

    pub fn config(&self) -> &WarmingConfig {
        &self.config
    }

    /// Tenants to warm: the configured list, or every known tenant
    pub fn tenants(&self) -> Vec<String> {
        if self.config.tenants.is_empty() {
            self.engine.provider().tenant_codes()
        } else {
            self.config
                .tenants
                .iter()
                .map(|tenant| tenant.trim().to_uppercase())
                .collect()
        }
    }

    /// Warm now, relative to today
    pub async fn trigger(&self) -> WarmingSummary {
        self.warm_for(Utc::now().date_naive()).await
    }

    /// Clear every cached entry, then warm
    pub async fn refresh(&self) -> AnalyticsResult<WarmingSummary> {
        let removed = self.clear_cache(None, None).await?;
        info!(removed = removed, "Cache cleared before re-warm");
        Ok(self.trigger().await)
    }

    /// Delete entries whose range matches the given bounds; everything when both are `None`
    ///
    /// A bounded range wide enough to be chunked also drops the entries of
    /// each of its chunks, so the next read goes back to the database.
    pub async fn clear_cache(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> AnalyticsResult<u64> {
        let cache = self.engine.cache();
        let mut patterns = vec![cache.keys().range_pattern(start, end)];

        if let (Some(start), Some(end)) = (start, end) {
            let chunker = self.engine.chunker();
            if chunker.needs_chunking(start, end) {
                for chunk in chunker.chunks_for(start, end) {
                    patterns.push(
                        cache
                            .keys()
                            .range_pattern(Some(chunk.start), Some(chunk.end)),
                    );
                }
            }
        }

        let mut removed: u64 = 0;
        for pattern in &patterns {
            removed += cache.del(pattern).await?;
        }
        info!(
            pattern = %patterns[0],
            chunk_patterns = patterns.len() - 1,
            removed = removed,
            "Cleared cached analytics"
        );
        Ok(removed)
    }

    /// One full cycle over every tenant and canonical range
    pub async fn warm_for(&self, reference: NaiveDate) -> WarmingSummary {
        let _running = self.run_lock.lock().await;
        let started_at = Utc::now();
        let started = Instant::now();
        let ranges = canonical_ranges(reference);
        let mut outcomes = Vec::new();

        info!(
            reference_date = %reference,
            ranges = ranges.len(),
            "🔥 Starting cache warming cycle"
        );

        for tenant in self.tenants() {
            let tenant_started = Instant::now();
            let tenant_outcomes = self.warm_tenant(&tenant, &ranges).await;
            let successes = tenant_outcomes.iter().filter(|o| o.is_success()).count();

            log_warming_summary(
                &tenant,
                tenant_outcomes.len(),
                successes,
                tenant_outcomes.len() - successes,
                tenant_started.elapsed().as_millis() as u64,
            );
            outcomes.extend(tenant_outcomes);
        }

        self.set_phase(WarmingPhase::Idle);

        let summary = WarmingSummary {
            started_at,
            reference_date: reference,
            outcomes,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            ranges_total = summary.outcomes.len(),
            successes = summary.successes(),
            errors = summary.errors(),
            success_rate = %format!("{:.1}%", summary.success_rate()),
            duration_ms = summary.duration_ms,
            "Cache warming cycle complete"
        );
        summary
    }

    async fn warm_tenant(&self, tenant: &str, ranges: &[WarmRange]) -> Vec<RangeOutcome> {
        let mut outcomes = Vec::with_capacity(ranges.len());

        for (index, range) in ranges.iter().enumerate() {
            if index > 0 && !self.config.inter_range_delay().is_zero() {
                tokio::time::sleep(self.config.inter_range_delay()).await;
            }

            let outcome = self.warm_range(tenant, *range).await;
            if outcome.is_success() {
                debug!(
                    tenant = tenant,
                    range = range.name,
                    attempts = outcome.attempts,
                    keys = outcome.keys_present,
                    duration_ms = outcome.duration_ms,
                    "Range warmed"
                );
            } else {
                warn!(
                    tenant = tenant,
                    range = range.name,
                    attempts = outcome.attempts,
                    keys_expected = outcome.keys_expected,
                    keys_present = outcome.keys_present,
                    error = outcome.error.as_deref(),
                    "Range not fully warmed"
                );
            }
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn warm_range(&self, tenant: &str, range: WarmRange) -> RangeOutcome {
        let started = Instant::now();
        self.set_phase(WarmingPhase::Warming {
            tenant: tenant.to_string(),
            range: range.name,
        });

        let mut outcome = RangeOutcome {
            tenant: tenant.to_string(),
            range,
            attempts: 0,
            warmed: false,
            keys_expected: 0,
            keys_present: 0,
            error: None,
            duration_ms: 0,
        };

        let filter = match QueryFilter::new(range.start, range.end) {
            Ok(filter) => filter,
            Err(err) => {
                outcome.error = Some(err.to_string());
                return outcome;
            }
        };

        let max_attempts = self.config.max_attempts.max(1);
        loop {
            outcome.attempts += 1;
            match self.warm_once(&filter, tenant).await {
                Ok(()) => {
                    outcome.warmed = true;
                    outcome.error = None;
                    break;
                }
                Err(err) => {
                    outcome.error = Some(err.to_string());
                    if outcome.attempts >= max_attempts {
                        log_error(
                            "cache_warmer",
                            range.name,
                            &err.to_string(),
                            Some(&format!("tenant={tenant} attempts={}", outcome.attempts)),
                        );
                        break;
                    }

                    let delay = self.config.delay_for_attempt(outcome.attempts);
                    debug!(
                        tenant = tenant,
                        range = range.name,
                        attempt = outcome.attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying range"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        if outcome.warmed {
            self.set_phase(WarmingPhase::Verifying {
                tenant: tenant.to_string(),
                range: range.name,
            });
            let (expected, present) = self.verify(&filter, tenant).await;
            outcome.keys_expected = expected;
            outcome.keys_present = present;
        }

        outcome.duration_ms = started.elapsed().as_millis() as u64;
        outcome
    }

    async fn warm_once(&self, filter: &QueryFilter, tenant: &str) -> AnalyticsResult<()> {
        self.engine.all_aggregations(filter, tenant).await?;
        self.engine.sales_headers(filter, tenant).await?;
        // Store and salesperson pickers; cached per tenant, so only the first range queries
        self.engine.distinct_stores(tenant).await?;
        self.engine.distinct_salespeople(tenant).await?;
        Ok(())
    }

    /// Count of expected and present keys; nothing is expected without a cache
    async fn verify(&self, filter: &QueryFilter, tenant: &str) -> (usize, usize) {
        let cache = self.engine.cache();
        if !cache.is_enabled() {
            return (0, 0);
        }

        let expected = self.engine.expected_keys(filter, tenant);
        let mut present = 0;
        for key in &expected {
            if cache.exists(key).await {
                present += 1;
            } else {
                debug!(key = %key, "Expected cache key missing after warm");
            }
        }
        (expected.len(), present)
    }

    fn set_phase(&self, phase: WarmingPhase) {
        *self.phase.lock() = phase;
    }

    /// Run cycles whenever `scheduler` fires until stopped
    pub fn spawn(self: &Arc<Self>, mut scheduler: impl Scheduler + 'static) -> WarmingHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let warmer = Arc::clone(self);

        let task = tokio::spawn(async move {
            info!("Cache warming scheduler started");
            loop {
                tokio::select! {
                    fired = scheduler.next_fire() => {
                        if !fired {
                            break;
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }

                tokio::select! {
                    _ = warmer.trigger() => {}
                    _ = shutdown_rx.changed() => {
                        warn!("Shutdown requested during a warming cycle");
                        break;
                    }
                }
            }
            warmer.set_phase(WarmingPhase::Idle);
            info!("Cache warming scheduler stopped");
        });

        WarmingHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a spawned warming loop
#[derive(Debug)]
pub struct WarmingHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WarmingHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the loop to stop and wait for it
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            warn!(error = %err, "Cache warming task ended abnormally");
        }
    }
}
