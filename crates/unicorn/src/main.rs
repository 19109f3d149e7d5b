use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use std::convert::Infallible;
use std::fs;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use unicorn::{metrics, plugins, Engine, EngineConfig, ResultCode, Summary};
use unicorn_common::Config;

const DEFAULT_CONFIG_PATH: &str = "config/unicorn_config.yaml";

fn init_production_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_target(true))
        .init();

    info!("Production structured logging initialized (JSON)");
}

async fn metrics_handler(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    match req.uri().path() {
        "/health" => Ok(Response::new(Body::from("OK"))),
        "/metrics" => Ok(Response::new(Body::from(metrics::render_metrics()))),
        _ => {
            let mut not_found = Response::new(Body::from("Not Found"));
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            Ok(not_found)
        }
    }
}

async fn run_metrics_server(port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    metrics::register_metrics();

    let make_svc =
        make_service_fn(|_conn| async { Ok::<_, Infallible>(service_fn(metrics_handler)) });

    let server = Server::bind(&addr).serve(make_svc);

    info!(port = port, "Observability server online");

    if let Err(e) = server.await {
        error!(error = %e, "Observability server failed");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_production_logging();

    let config_path =
        std::env::var("UNICORN_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config_data = fs::read_to_string(&config_path)?;
    let config = Config::from_yaml_str(&config_data)?;

    if config.metrics.enabled {
        let port = config.metrics.port;
        tokio::spawn(async move {
            run_metrics_server(port).await;
        });
    }

    let (result_tx, mut result_rx) = mpsc::channel(config.load.result_buffer.max(1));
    let engine_config = EngineConfig::from_profile(&config);
    let engine = Engine::new(
        engine_config,
        plugins::factory_for(&config.target),
        result_tx,
    )?;

    let started = Instant::now();
    let mut drain = engine.start()?;

    let mut summary = Summary::default();
    loop {
        tokio::select! {
            res = result_rx.recv() => match res {
                Some(result) => {
                    if config.output.print_details && result.code != ResultCode::Success {
                        warn!(
                            id = result.id,
                            code = result.code.value(),
                            msg = %result.message,
                            elapsed = ?result.elapsed,
                            "Result"
                        );
                    }
                    summary.record(&result);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                let (call_count, stopped) = engine.stop();
                info!(call_count, stopped, "Stop requested");
            }
        }
    }
    drain.wait().await;
    let wall = started.elapsed();

    for (code, count) in summary.counts() {
        info!(code = code.value(), plain = code.plain(), count, "Code count");
    }
    info!(
        total = summary.total(),
        success = summary.successes(),
        call_count = engine.call_count(),
        ignored = engine.ignored_count(),
        qps = engine.qps(),
        concurrency = engine.concurrency(),
        tps = summary.tps(wall),
        elapsed = ?wall,
        "Run summary"
    );
    Ok(())
}
