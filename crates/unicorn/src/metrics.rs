use crate::engine::plugin::CallResult;
use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref REQUESTS_TOTAL: IntCounter = IntCounter::new(
        "unicorn_requests_total",
        "Total number of requests issued to the target"
    )
    .expect("metric can be created");
    /// Results produced by workers, labelled with the numeric result code.
    pub static ref RESULTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("unicorn_results_total", "Total number of call results by code"),
        &["code"]
    )
    .expect("metric can be created");
    /// Results dropped because they arrived after the engine stopped.
    pub static ref IGNORED_RESULTS: IntCounter = IntCounter::new(
        "unicorn_ignored_results_total",
        "Total number of results ignored during shutdown"
    )
    .expect("metric can be created");
    pub static ref DIAL_FAILURES: IntCounter = IntCounter::new(
        "unicorn_dial_failures_total",
        "Total number of failed or timed-out connection attempts"
    )
    .expect("metric can be created");
    pub static ref TICKETS_IN_USE: IntGauge = IntGauge::new(
        "unicorn_tickets_in_use",
        "Number of tickets currently held by workers"
    )
    .expect("metric can be created");
    pub static ref REQUEST_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "unicorn_request_latency_seconds",
            "Round-trip time of one request/response exchange"
        )
        .buckets(vec![
            0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
        ])
    )
    .expect("metric can be created");
}

pub fn register_metrics() {
    let _ = REGISTRY.register(Box::new(REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(RESULTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(IGNORED_RESULTS.clone()));
    let _ = REGISTRY.register(Box::new(DIAL_FAILURES.clone()));
    let _ = REGISTRY.register(Box::new(TICKETS_IN_USE.clone()));
    let _ = REGISTRY.register(Box::new(REQUEST_LATENCY.clone()));
}

pub fn record_result(result: &CallResult) {
    RESULTS_TOTAL
        .with_label_values(&[&result.code.value().to_string()])
        .inc();
    if !result.elapsed.is_zero() {
        REQUEST_LATENCY.observe(result.elapsed.as_secs_f64());
    }
}

pub fn render_metrics() -> String {
    let metric_families = REGISTRY.gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}", e);
    }

    String::from_utf8(buffer).unwrap_or_else(|_| "# Error: Invalid UTF8".to_string())
}
