use crate::engine::plugin::{CallResult, ResultCode};
use std::collections::BTreeMap;
use std::time::Duration;

/// Per-code tally of one run, as read off the result sink.
#[derive(Debug, Default, Clone)]
pub struct Summary {
    counts: BTreeMap<ResultCode, u64>,
}

impl Summary {
    pub fn record(&mut self, result: &CallResult) {
        *self.counts.entry(result.code).or_insert(0) += 1;
    }

    /// Counts in ascending code order.
    pub fn counts(&self) -> impl Iterator<Item = (ResultCode, u64)> + '_ {
        self.counts.iter().map(|(code, count)| (*code, *count))
    }

    pub fn count(&self, code: ResultCode) -> u64 {
        self.counts.get(&code).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn successes(&self) -> u64 {
        self.count(ResultCode::Success)
    }

    /// Successful calls per second over the measured run time.
    pub fn tps(&self, elapsed: Duration) -> f64 {
        if elapsed.is_zero() {
            return 0.0;
        }
        self.successes() as f64 / elapsed.as_secs_f64()
    }
}
