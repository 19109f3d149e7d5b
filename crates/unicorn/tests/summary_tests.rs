mod common;

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use unicorn::plugins::EchoPlugin;
use unicorn::{plugin_factory, CallResult, Engine, EngineConfig, ResultCode, Summary};

use common::echo_server;

fn result(code: ResultCode) -> CallResult {
    CallResult::new(1, code, "", Duration::from_millis(1))
}

#[test]
fn tally_groups_by_code_in_order() {
    let mut summary = Summary::default();
    summary.record(&result(ResultCode::CallError));
    summary.record(&result(ResultCode::Success));
    summary.record(&result(ResultCode::Success));
    summary.record(&result(ResultCode::TimeoutWarning));

    let counts: Vec<_> = summary.counts().collect();
    assert_eq!(
        counts,
        vec![
            (ResultCode::Success, 2),
            (ResultCode::TimeoutWarning, 1),
            (ResultCode::CallError, 1),
        ]
    );
    assert_eq!(summary.total(), 4);
    assert_eq!(summary.successes(), 2);
    assert_eq!(summary.count(ResultCode::Done), 0);
}

#[test]
fn tps_divides_by_measured_time() {
    let mut summary = Summary::default();
    for _ in 0..50 {
        summary.record(&result(ResultCode::Success));
    }
    summary.record(&result(ResultCode::ResponseError));

    assert_eq!(summary.tps(Duration::from_millis(500)), 100.0);
    assert_eq!(summary.tps(Duration::from_secs(5)), 10.0);
    assert_eq!(summary.tps(Duration::ZERO), 0.0);
}

#[tokio::test]
async fn stopped_run_reports_throughput_over_its_real_length() {
    let (addr, _) = echo_server(Duration::ZERO).await;
    let (tx, mut rx) = mpsc::channel(1024);
    let configured = Duration::from_secs(30);
    let config =
        EngineConfig::with_qps(addr.to_string(), Duration::from_millis(50), 50, configured);
    let engine = Engine::new(config, plugin_factory(|| EchoPlugin::new(10)), tx).unwrap();

    let started = Instant::now();
    let mut drain = engine.start().unwrap();
    let mut summary = Summary::default();
    while let Some(result) = rx.recv().await {
        summary.record(&result);
        if summary.total() == 5 {
            engine.stop();
        }
    }
    drain.wait().await;
    let wall = started.elapsed();

    assert!(wall < configured);
    assert!(summary.successes() >= 5);
    let tps = summary.tps(wall);
    // 50 qps paced; the early stop must not dilute it over the 30s budget.
    assert!(tps > 10.0, "tps {}", tps);
    assert!(tps > summary.successes() as f64 / configured.as_secs_f64());
}
