use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub target: TargetConfig,
    pub load: LoadConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Parse a run profile from its YAML text.
    pub fn from_yaml_str(data: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(data)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    pub address: String,
    pub protocol: Protocol,
    /// Length of the random payload sent by the echo plugin.
    #[serde(default = "default_echo_payload_len")]
    pub echo_payload_len: usize,
}

/// Wire protocols the bundled plugins speak.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Echo,
    Equation,
}

/// Load shape of one run.
///
/// Exactly one of `qps` and `concurrency` must be non-zero; the engine
/// rejects the profile otherwise.
#[derive(Debug, Deserialize, Clone)]
pub struct LoadConfig {
    pub timeout_ms: u64,
    #[serde(default)]
    pub qps: u32,
    #[serde(default)]
    pub concurrency: u32,
    pub duration_secs: u64,
    #[serde(default)]
    pub keep_alive: bool,
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
    /// Capacity of the result channel handed to the engine.
    #[serde(default = "default_result_buffer")]
    pub result_buffer: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9898,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OutputConfig {
    /// Log every non-successful result as it arrives.
    #[serde(default)]
    pub print_details: bool,
}

fn default_echo_payload_len() -> usize {
    10
}

fn default_max_response_bytes() -> usize {
    64 * 1024
}

fn default_result_buffer() -> usize {
    1024
}
