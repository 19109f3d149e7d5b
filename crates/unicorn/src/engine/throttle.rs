use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Shared pulse source pacing request issuance.
///
/// Every worker waits for one pulse before each request. Waiters queue on a
/// single interval, so the aggregate issuance rate across all workers is
/// `qps` no matter how many workers share it.
#[derive(Debug)]
pub struct Throttle {
    ticker: Mutex<Interval>,
    period: Duration,
}

impl Throttle {
    /// Returns `None` when `qps` is zero (fixed-concurrency mode).
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(qps: u32) -> Option<Self> {
        if qps == 0 {
            return None;
        }
        let period = Self::period_for(qps);
        let mut ticker = interval_at(Instant::now() + period, period);
        // A late reader gets at most one pending pulse, never a burst.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Some(Self {
            ticker: Mutex::new(ticker),
            period,
        })
    }

    /// Spacing between pulses for a given rate.
    pub fn period_for(qps: u32) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(qps.max(1)))
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait for the next pulse.
    pub async fn pulse(&self) {
        self.ticker.lock().await.tick().await;
    }
}
