//! Reference plugins for the bundled demo targets.

pub mod echo;
pub mod equation;

pub use echo::EchoPlugin;
pub use equation::EquationPlugin;

use crate::engine::plugin::{plugin_factory, PluginFactory};
use unicorn_common::{Protocol, TargetConfig};

/// Factory for the plugin a run profile asks for.
pub fn factory_for(target: &TargetConfig) -> PluginFactory {
    match target.protocol {
        Protocol::Echo => {
            let len = target.echo_payload_len;
            plugin_factory(move || EchoPlugin::new(len))
        }
        Protocol::Equation => plugin_factory(EquationPlugin::new),
    }
}
