//! Drive an echo server at a fixed concurrency from library code and print
//! a per-code tally. Start `echo_server` first.
//!
//! cargo run -p unicorn --example echo_load -- 127.0.0.1:9527

use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use unicorn::plugins::EchoPlugin;
use unicorn::{plugin_factory, Engine, EngineConfig, Summary};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let target = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:9527".to_string());
    let duration = Duration::from_secs(5);

    let config = EngineConfig::with_concurrency(&target, Duration::from_millis(50), 50, duration)
        .keep_alive(true);
    let (tx, mut rx) = mpsc::channel(1024);
    let engine = Engine::new(config, plugin_factory(|| EchoPlugin::new(16)), tx)?;

    println!("Starting load against {} for {:?}", target, duration);
    let started = Instant::now();
    let mut drain = engine.start()?;

    let mut summary = Summary::default();
    while let Some(result) = rx.recv().await {
        summary.record(&result);
    }
    drain.wait().await;
    let wall = started.elapsed();

    for (code, count) in summary.counts() {
        println!("  {}: {}", code, count);
    }
    println!(
        "Total calls: {}, ignored: {}, tps: {:.1}",
        engine.call_count(),
        engine.ignored_count(),
        summary.tps(wall)
    );
    Ok(())
}
