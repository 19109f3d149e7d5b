//! The load-generation engine.
//!
//! [`Engine::start`] arms a deadline timer and launches a driver task. The
//! driver takes a ticket, spawns a worker, and repeats until the stop signal
//! is observed. It then polls the ticket pool until every worker has handed
//! its ticket back, marks the engine stopped, and closes the result sink.
//! The driver is the only place the sink is ever closed.

pub mod config;
pub mod plugin;
pub mod throttle;
pub mod ticket;
pub mod worker;

use self::config::{ConfigError, EngineConfig};
use self::plugin::{CallResult, PluginFactory};
use self::throttle::Throttle;
use self::ticket::{TicketPool, TicketPoolError};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// How often the driver checks for returned tickets while draining.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    TicketPool(#[from] TicketPoolError),
    #[error("engine already started")]
    AlreadyStarted,
}

/// Lifecycle of an engine. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineStatus {
    Original = 0,
    Started = 1,
    Stopped = 2,
}

impl EngineStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => EngineStatus::Original,
            1 => EngineStatus::Started,
            _ => EngineStatus::Stopped,
        }
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineStatus::Original => "original",
            EngineStatus::Started => "started",
            EngineStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Completes once the engine has drained. Cloneable; any number of tasks
/// may wait on it.
#[derive(Debug, Clone)]
pub struct DrainHandle {
    drained: watch::Receiver<bool>,
}

impl DrainHandle {
    /// Wait until every spawned worker has returned its ticket and the
    /// result sink is closed.
    pub async fn wait(&mut self) {
        // An error means the engine state is gone, which only happens after
        // the drain flag was set.
        let _ = self.drained.wait_for(|drained| *drained).await;
    }

    pub fn is_drained(&self) -> bool {
        *self.drained.borrow()
    }
}

/// State shared by the engine handle, the driver, the deadline timer and
/// every worker.
pub(crate) struct Shared {
    pub(crate) config: EngineConfig,
    pub(crate) plugin_factory: PluginFactory,
    pub(crate) pool: TicketPool,
    pub(crate) stop: CancellationToken,
    status: AtomicU8,
    sink: Mutex<Option<mpsc::Sender<CallResult>>>,
    call_count: AtomicU64,
    ignored_count: AtomicU64,
    drained: watch::Sender<bool>,
}

impl Shared {
    fn status(&self) -> EngineStatus {
        EngineStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub(crate) fn count_call(&self) {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        crate::metrics::REQUESTS_TOTAL.inc();
    }

    /// Flip `Started -> Stopped` and raise the stop signal.
    pub(crate) fn stop(&self) -> (u64, bool) {
        let flipped = self
            .status
            .compare_exchange(
                EngineStatus::Started as u8,
                EngineStatus::Stopped as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if !flipped {
            return (0, false);
        }
        self.stop.cancel();
        let count = self.call_count.load(Ordering::SeqCst);
        info!(call_count = count, "Stop ended");
        (count, true)
    }

    /// Deliver a result to the sink, or count it as ignored once the engine
    /// is stopped or the sink is gone.
    pub(crate) async fn save_result(&self, result: CallResult) -> bool {
        crate::metrics::record_result(&result);

        if self.status() == EngineStatus::Stopped && self.stop_requested() {
            self.ignore(&result);
            return false;
        }

        let sink = self
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(sink) = sink else {
            self.ignore(&result);
            return false;
        };

        match sink.send(result).await {
            Ok(()) => true,
            Err(mpsc::error::SendError(result)) => {
                self.ignore(&result);
                false
            }
        }
    }

    fn ignore(&self, result: &CallResult) {
        self.ignored_count.fetch_add(1, Ordering::SeqCst);
        crate::metrics::IGNORED_RESULTS.inc();
        debug!(
            id = result.id,
            code = result.code.value(),
            msg = %result.message,
            elapsed = ?result.elapsed,
            "Ignore result"
        );
    }

    fn close_sink(&self) {
        let sink = self
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sink);
    }
}

/// A load-testing run against one target.
pub struct Engine {
    shared: Arc<Shared>,
}

impl Engine {
    /// Validate `config`, size the ticket pool, and take ownership of the
    /// result sink. Nothing runs until [`Engine::start`].
    pub fn new(
        config: EngineConfig,
        plugin_factory: PluginFactory,
        sink: mpsc::Sender<CallResult>,
    ) -> Result<Self, EngineError> {
        info!(target_addr = %config.address, "Begin New Unicorn");

        let concurrency = config.validate()?;
        if config.qps != 0 {
            info!(concurrency, qps = config.qps, "Concurrency auto calculated");
        }
        let pool = TicketPool::new(concurrency)?;
        let (drained, _) = watch::channel(false);

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                plugin_factory,
                pool,
                stop: CancellationToken::new(),
                status: AtomicU8::new(EngineStatus::Original as u8),
                sink: Mutex::new(Some(sink)),
                call_count: AtomicU64::new(0),
                ignored_count: AtomicU64::new(0),
                drained,
            }),
        })
    }

    /// Launch the run and return at once. Must be called within a tokio
    /// runtime.
    pub fn start(&self) -> Result<DrainHandle, EngineError> {
        self.shared
            .status
            .compare_exchange(
                EngineStatus::Original as u8,
                EngineStatus::Started as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|_| EngineError::AlreadyStarted)?;

        let config = &self.shared.config;
        info!(
            target_addr = %config.address,
            qps = config.qps,
            concurrency = self.shared.pool.total(),
            timeout = ?config.timeout,
            duration = ?config.duration,
            keep_alive = config.keep_alive,
            "Unicorn Start..."
        );

        let drain = DrainHandle {
            drained: self.shared.drained.subscribe(),
        };

        let throttle = Throttle::new(config.qps).map(Arc::new);
        if let Some(throttle) = &throttle {
            info!(interval = ?throttle.period(), "The interval of per request");
        }

        let timer = Arc::clone(&self.shared);
        tokio::spawn(async move {
            tokio::select! {
                _ = sleep(timer.config.duration) => {
                    info!("Time's up. Stopping Unicorn...");
                    timer.stop.cancel();
                }
                _ = timer.stop.cancelled() => {}
            }
        });

        tokio::spawn(drive(Arc::clone(&self.shared), throttle));
        Ok(drain)
    }

    /// Stop a started engine. Returns the cumulative request count and
    /// whether this call had any effect. Does not wait for the drain.
    pub fn stop(&self) -> (u64, bool) {
        self.shared.stop()
    }

    pub fn status(&self) -> EngineStatus {
        self.shared.status()
    }

    /// Requests issued so far.
    pub fn call_count(&self) -> u64 {
        self.shared.call_count.load(Ordering::SeqCst)
    }

    /// Results produced after shutdown and dropped instead of delivered.
    pub fn ignored_count(&self) -> u64 {
        self.shared.ignored_count.load(Ordering::SeqCst)
    }

    /// Ticket pool capacity: the maximum number of concurrent workers.
    pub fn concurrency(&self) -> u32 {
        self.shared.pool.total()
    }

    /// Configured issuance rate; zero in fixed-concurrency mode.
    pub fn qps(&self) -> u32 {
        self.shared.config.qps
    }

    pub fn tickets(&self) -> &TicketPool {
        &self.shared.pool
    }
}

async fn drive(shared: Arc<Shared>, throttle: Option<Arc<Throttle>>) {
    debug!("Driver started");
    let mut spawned: u64 = 0;

    loop {
        if shared.stop_requested() {
            break;
        }
        let ticket = tokio::select! {
            biased;
            _ = shared.stop.cancelled() => break,
            ticket = shared.pool.take() => ticket,
        };
        match ticket {
            Ok(ticket) => {
                tokio::spawn(worker::run(Arc::clone(&shared), throttle.clone(), ticket));
                spawned += 1;
            }
            Err(e) => {
                error!(error = %e, "Could not take a ticket");
                break;
            }
        }
    }

    info!(
        spawned,
        outstanding = shared.pool.outstanding(),
        "Stop observed. Draining workers..."
    );
    while !shared.pool.is_full() {
        sleep(DRAIN_POLL_INTERVAL).await;
    }

    shared
        .status
        .store(EngineStatus::Stopped as u8, Ordering::SeqCst);
    shared.close_sink();
    shared.drained.send_replace(true);

    info!(
        call_count = shared.call_count.load(Ordering::SeqCst),
        ignored_count = shared.ignored_count.load(Ordering::SeqCst),
        "Unicorn stopped"
    );
}
