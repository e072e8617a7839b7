//! When warming cycles fire.
//!
//! The warmer only asks "wait for the next firing"; the timer mechanism sits
//! behind [`Scheduler`] so tests can drive cycles by hand.

use crate::config::WarmingConfig;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

#[async_trait]
pub trait Scheduler: Send {
    /// Wait for the next firing; `false` once the schedule has nothing left
    async fn next_fire(&mut self) -> bool;
}

/// Fires once after a startup delay, then on a fixed interval
#[derive(Debug)]
pub struct IntervalScheduler {
    startup_delay: Duration,
    period: Duration,
    ticker: Option<Interval>,
}

impl IntervalScheduler {
    pub fn new(startup_delay: Duration, period: Duration) -> Self {
        Self {
            startup_delay,
            period,
            ticker: None,
        }
    }

    pub fn from_config(config: &WarmingConfig) -> Self {
        Self::new(config.startup_delay(), config.interval())
    }
}

#[async_trait]
impl Scheduler for IntervalScheduler {
    async fn next_fire(&mut self) -> bool {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => {
                tokio::time::sleep(self.startup_delay).await;
                let mut ticker = interval_at(Instant::now() + self.period, self.period);
                // A cycle that overruns the period pushes the next one back
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.ticker = Some(ticker);
            }
        }
        true
    }
}

/// Fires a fixed number of times without waiting
#[derive(Debug, Clone, Copy)]
pub struct ManualScheduler {
    remaining: usize,
}

impl ManualScheduler {
    pub fn new(firings: usize) -> Self {
        Self { remaining: firings }
    }
}

#[async_trait]
impl Scheduler for ManualScheduler {
    async fn next_fire(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}
