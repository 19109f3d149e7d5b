//! Connection worker: one task per ticket.
//!
//! A worker dials the target, then loops over
//! `throttle -> gen_request -> write -> read until framed -> classify`,
//! either once (one-shot mode) or until stopped (keep-alive mode). A request
//! that misses its deadline is reported as a timeout at the deadline; the
//! exchange itself runs on and its outcome is discarded. Every exit path,
//! including a panic inside the plugin, drops the ticket.

use super::plugin::{CallResult, FrameStatus, Plugin, RawRequest, ResultCode};
use super::throttle::Throttle;
use super::ticket::Ticket;
use super::Shared;
use bytes::BytesMut;
use futures::FutureExt;
use once_cell::sync::Lazy;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 1024;

static NEXT_REQUEST_ID: Lazy<AtomicI64> = Lazy::new(|| {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    AtomicI64::new(seed)
});

/// Allocate a request id: unique in this process, seeded from the clock.
pub fn next_request_id() -> i64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// Why an exchange ended without a complete frame.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server closed connection")]
    Closed,
    #[error("malformed frame ({0} bytes received)")]
    Malformed(usize),
    #[error("response exceeds read limit of {limit} bytes")]
    ReadLimit { limit: usize },
}

impl ExchangeError {
    pub fn code(&self) -> ResultCode {
        match self {
            ExchangeError::Malformed(_) => ResultCode::ResponseError,
            _ => ResultCode::CallError,
        }
    }
}

/// Send `request` and read until the plugin judges the frame complete.
///
/// An empty payload skips the write and only waits for server data. The
/// accumulator belongs to this function; the plugin only inspects it.
pub async fn exchange<S>(
    stream: &mut S,
    request: &RawRequest,
    plugin: &mut dyn Plugin,
    read_limit: usize,
) -> Result<BytesMut, ExchangeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if !request.payload.is_empty() {
        stream.write_all(&request.payload).await?;
        stream.flush().await?;
    }

    let mut data = BytesMut::with_capacity(READ_CHUNK);
    loop {
        data.reserve(READ_CHUNK);
        if stream.read_buf(&mut data).await? == 0 {
            return Err(ExchangeError::Closed);
        }
        match plugin.check_full(request, &data) {
            FrameStatus::Complete => return Ok(data),
            FrameStatus::NeedMore if data.len() >= read_limit => {
                return Err(ExchangeError::ReadLimit { limit: read_limit })
            }
            FrameStatus::NeedMore => continue,
            FrameStatus::Malformed => return Err(ExchangeError::Malformed(data.len())),
        }
    }
}

/// Turn the outcome of an exchange that beat its deadline into its result.
///
/// Transport errors map to their code; complete frames go to the plugin.
pub fn classify(
    plugin: &mut dyn Plugin,
    request: &RawRequest,
    outcome: Result<BytesMut, ExchangeError>,
    elapsed: Duration,
) -> CallResult {
    match outcome {
        Ok(frame) => {
            let (code, message) = plugin.check_response(request, &frame);
            CallResult::new(request.id, code, message, elapsed)
        }
        Err(e) => CallResult::new(request.id, e.code(), e.to_string(), elapsed),
    }
}

/// Result emitted the moment `request` misses its deadline.
pub fn timed_out(request: &RawRequest, limit: Duration, elapsed: Duration) -> CallResult {
    CallResult::new(
        request.id,
        ResultCode::TimeoutWarning,
        format!("Timeout! (expected: < {:?})", limit),
        elapsed,
    )
}

/// How one request turn ended.
enum Turn {
    /// The exchange finished before the deadline.
    OnTime(Result<BytesMut, ExchangeError>),
    /// The deadline fired first and its warning is already saved. Holds the
    /// late outcome, or `None` when stop arrived before the exchange ended.
    Late(Option<Result<BytesMut, ExchangeError>>),
}

/// Worker task body. Owns `ticket` until it returns.
pub(crate) async fn run(shared: Arc<Shared>, throttle: Option<Arc<Throttle>>, ticket: Ticket) {
    let served = AssertUnwindSafe(serve(&shared, throttle.as_deref()))
        .catch_unwind()
        .await;

    if let Err(panic) = served {
        let message = panic_message(panic.as_ref());
        warn!(reason = %message, "Worker panicked");
        shared.save_result(CallResult::fatal(message)).await;
    }

    drop(ticket);
}

async fn serve(shared: &Shared, throttle: Option<&Throttle>) {
    if shared.stop_requested() {
        debug!("Stop observed before dialing");
        return;
    }

    let config = &shared.config;
    let mut stream = match connect_target(&config.address, config.timeout, &shared.stop).await {
        Some(s) => s,
        None => return,
    };
    let mut plugin = (shared.plugin_factory)();

    loop {
        if shared.stop_requested() {
            break;
        }

        if let Some(throttle) = throttle {
            tokio::select! {
                biased;
                _ = shared.stop.cancelled() => break,
                _ = throttle.pulse() => {}
            }
        }

        let request = plugin.gen_request(next_request_id());
        shared.count_call();

        let started = Instant::now();
        let deadline = started + config.timeout;
        let turn = {
            let exchanged = exchange(
                &mut stream,
                &request,
                plugin.as_mut(),
                config.max_response_bytes,
            );
            tokio::pin!(exchanged);
            let on_time = tokio::select! {
                outcome = &mut exchanged => Some(outcome),
                _ = sleep_until(deadline) => None,
            };
            match on_time {
                Some(outcome) => Turn::OnTime(outcome),
                None => {
                    let warning = timed_out(&request, config.timeout, started.elapsed());
                    shared.save_result(warning).await;
                    // The in-flight exchange keeps running; only stop abandons it.
                    tokio::select! {
                        biased;
                        _ = shared.stop.cancelled() => Turn::Late(None),
                        outcome = &mut exchanged => Turn::Late(Some(outcome)),
                    }
                }
            }
        };
        let elapsed = started.elapsed();

        let connection_ok = match turn {
            Turn::OnTime(outcome) => {
                let ok = outcome.is_ok();
                if let Err(e) = &outcome {
                    debug!(id = request.id, error = %e, "Exchange failed");
                }
                let result = classify(plugin.as_mut(), &request, outcome, elapsed);
                let code = result.code;
                shared.save_result(result).await;

                if code == ResultCode::Done {
                    info!(id = request.id, "Plugin reported done. Stopping engine...");
                    shared.stop();
                }
                ok
            }
            Turn::Late(Some(outcome)) => {
                debug!(id = request.id, elapsed = ?elapsed, "Late outcome discarded");
                outcome.is_ok()
            }
            Turn::Late(None) => {
                debug!(id = request.id, "Stop observed while awaiting a late frame");
                false
            }
        };

        // A failed exchange leaves the stream in an unknown state.
        if !config.keep_alive || !connection_ok {
            break;
        }
    }
}

/// Dial the target, giving up on timeout or when stop arrives first.
async fn connect_target(
    address: &str,
    connect_timeout: Duration,
    stop: &CancellationToken,
) -> Option<TcpStream> {
    tokio::select! {
        biased;
        _ = stop.cancelled() => {
            debug!("Stop observed while dialing");
            None
        }
        res = timeout(connect_timeout, TcpStream::connect(address)) => match res {
            Ok(Ok(stream)) => {
                let _ = stream.set_nodelay(true);
                Some(stream)
            }
            Ok(Err(e)) => {
                crate::metrics::DIAL_FAILURES.inc();
                debug!(target_addr = %address, error = %e, "Could not connect to target");
                None
            }
            Err(_) => {
                crate::metrics::DIAL_FAILURES.inc();
                debug!(target_addr = %address, "Could not connect to target (connect timeout)");
                None
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let clue = if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };
    format!("A panic! (clue: {})", clue)
}
