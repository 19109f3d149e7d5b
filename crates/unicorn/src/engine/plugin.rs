//! The protocol plugin contract.
//!
//! The engine dials, writes, reads and times every exchange; a plugin only
//! builds request bytes, decides when the accumulated response forms a full
//! frame, and judges whether that frame is correct. One plugin instance is
//! created per worker, so implementations are free to keep per-connection
//! state (a handshake state machine, a game board, ...).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// One logical request as produced by a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    pub id: i64,
    /// Bytes to send. Empty means "this turn only waits for server data".
    pub payload: Vec<u8>,
}

impl RawRequest {
    pub fn new(id: i64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    /// A request that sends nothing and waits for the server to speak.
    pub fn passive(id: i64) -> Self {
        Self {
            id,
            payload: Vec::new(),
        }
    }
}

/// Verdict of [`Plugin::check_full`] on the bytes read so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Complete,
    NeedMore,
    Malformed,
}

/// Classification of one request attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResultCode {
    Success,
    TimeoutWarning,
    /// Transport-level failure: write, read, remote close, read limit.
    CallError,
    /// Malformed or semantically wrong response.
    ResponseError,
    /// The remote reported an internal error.
    CalleeError,
    /// A panic was trapped inside the worker.
    FatalCall,
    /// Returned by a plugin whose session reached its natural end; the
    /// engine shuts down when it sees this.
    Done,
}

impl ResultCode {
    pub const ALL: [ResultCode; 7] = [
        ResultCode::Success,
        ResultCode::TimeoutWarning,
        ResultCode::CallError,
        ResultCode::ResponseError,
        ResultCode::CalleeError,
        ResultCode::FatalCall,
        ResultCode::Done,
    ];

    /// Stable numeric value, used in logs and metric labels.
    pub fn value(self) -> u32 {
        match self {
            ResultCode::Success => 0,
            ResultCode::TimeoutWarning => 1001,
            ResultCode::CallError => 2001,
            ResultCode::ResponseError => 2002,
            ResultCode::CalleeError => 2003,
            ResultCode::FatalCall => 3001,
            ResultCode::Done => 4001,
        }
    }

    pub fn plain(self) -> &'static str {
        match self {
            ResultCode::Success => "Success",
            ResultCode::TimeoutWarning => "Call Timeout Warning",
            ResultCode::CallError => "Call Error",
            ResultCode::ResponseError => "Response Error",
            ResultCode::CalleeError => "Callee Error",
            ResultCode::FatalCall => "Call Fatal Error",
            ResultCode::Done => "Done",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.plain(), self.value())
    }
}

/// Outcome of one request attempt, delivered once to the result sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResult {
    pub id: i64,
    pub code: ResultCode,
    pub message: String,
    pub elapsed: Duration,
}

impl CallResult {
    pub fn new(id: i64, code: ResultCode, message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            id,
            code,
            message: message.into(),
            elapsed,
        }
    }

    /// Result recorded for a worker that panicked. The request it was
    /// serving is unknown, hence id -1.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(-1, ResultCode::FatalCall, message, Duration::ZERO)
    }
}

/// A protocol the engine can drive.
///
/// Each instance is owned by one worker task, so it only needs `Send`;
/// per-connection state may live in a `Cell` or `RefCell`.
pub trait Plugin: Send {
    /// Build the request labelled `id`.
    fn gen_request(&mut self, id: i64) -> RawRequest;

    /// Judge the bytes accumulated so far. Called after every read and must
    /// not depend on how many times it has been called.
    fn check_full(&self, request: &RawRequest, response: &[u8]) -> FrameStatus;

    /// Judge a complete frame.
    fn check_response(&mut self, request: &RawRequest, response: &[u8]) -> (ResultCode, String);
}

/// Produces a fresh plugin for every worker the engine spawns.
pub type PluginFactory = Arc<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

/// Wrap a constructor closure into a [`PluginFactory`].
pub fn plugin_factory<P, F>(make: F) -> PluginFactory
where
    P: Plugin + 'static,
    F: Fn() -> P + Send + Sync + 'static,
{
    Arc::new(move || Box::new(make()) as Box<dyn Plugin>)
}
