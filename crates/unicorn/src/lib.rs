pub mod engine;
pub mod metrics;
pub mod plugins;
pub mod summary;

pub use engine::config::{ConfigError, EngineConfig};
pub use engine::plugin::{
    plugin_factory, CallResult, FrameStatus, Plugin, PluginFactory, RawRequest, ResultCode,
};
pub use engine::{DrainHandle, Engine, EngineError, EngineStatus};
pub use summary::Summary;
