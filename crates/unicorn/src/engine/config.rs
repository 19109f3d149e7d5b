use std::time::Duration;
use thiserror::Error;
use unicorn_common::Config;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "exactly one of qps and concurrency must be non-zero (qps={qps}, concurrency={concurrency})"
    )]
    QpsXorConcurrency { qps: u32, concurrency: u32 },
    #[error("empty target address")]
    EmptyAddress,
    #[error("zero timeout")]
    ZeroTimeout,
    #[error("zero duration")]
    ZeroDuration,
    #[error("zero max_response_bytes")]
    ZeroReadLimit,
}

/// Validated-on-construction settings of one engine run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub address: String,
    /// Per-request soft deadline, also used as the connect deadline.
    pub timeout: Duration,
    /// Target issuance rate. Zero selects fixed-concurrency mode.
    pub qps: u32,
    /// Explicit worker count. Zero derives it from `qps` and `timeout`.
    pub concurrency: u32,
    pub duration: Duration,
    pub keep_alive: bool,
    /// Largest frame a worker accumulates before giving up on the exchange.
    pub max_response_bytes: usize,
}

impl EngineConfig {
    pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 64 * 1024;

    /// Fixed-rate run; concurrency is derived.
    pub fn with_qps(
        address: impl Into<String>,
        timeout: Duration,
        qps: u32,
        duration: Duration,
    ) -> Self {
        Self {
            address: address.into(),
            timeout,
            qps,
            concurrency: 0,
            duration,
            keep_alive: false,
            max_response_bytes: Self::DEFAULT_MAX_RESPONSE_BYTES,
        }
    }

    /// Fixed-concurrency run with no rate shaping.
    pub fn with_concurrency(
        address: impl Into<String>,
        timeout: Duration,
        concurrency: u32,
        duration: Duration,
    ) -> Self {
        Self {
            address: address.into(),
            timeout,
            qps: 0,
            concurrency,
            duration,
            keep_alive: false,
            max_response_bytes: Self::DEFAULT_MAX_RESPONSE_BYTES,
        }
    }

    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn max_response_bytes(mut self, limit: usize) -> Self {
        self.max_response_bytes = limit;
        self
    }

    /// Build from a YAML run profile.
    pub fn from_profile(config: &Config) -> Self {
        let load = &config.load;
        Self {
            address: config.target.address.clone(),
            timeout: Duration::from_millis(load.timeout_ms),
            qps: load.qps,
            concurrency: load.concurrency,
            duration: Duration::from_secs(load.duration_secs),
            keep_alive: load.keep_alive,
            max_response_bytes: load.max_response_bytes,
        }
    }

    /// Check the invariants and return the ticket pool capacity.
    pub fn validate(&self) -> Result<u32, ConfigError> {
        if (self.qps == 0) == (self.concurrency == 0) {
            return Err(ConfigError::QpsXorConcurrency {
                qps: self.qps,
                concurrency: self.concurrency,
            });
        }
        if self.address.trim().is_empty() {
            return Err(ConfigError::EmptyAddress);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.duration.is_zero() {
            return Err(ConfigError::ZeroDuration);
        }
        if self.max_response_bytes == 0 {
            return Err(ConfigError::ZeroReadLimit);
        }
        if self.qps != 0 {
            Ok(derive_concurrency(self.timeout, self.qps))
        } else {
            Ok(self.concurrency)
        }
    }
}

/// Workers needed to sustain `qps` when each request may take up to
/// `timeout`: `timeout / (1s / qps) + 1`, capped at `i32::MAX`.
pub fn derive_concurrency(timeout: Duration, qps: u32) -> u32 {
    let interval_ns = (1_000_000_000u128 / u128::from(qps.max(1))).max(1);
    let conc = timeout.as_nanos() / interval_ns + 1;
    conc.min(i32::MAX as u128) as u32
}
