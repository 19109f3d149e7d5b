use std::time::Duration;

use unicorn::engine::config::derive_concurrency;
use unicorn::{ConfigError, EngineConfig};
use unicorn_common::{Config, Protocol};

#[test]
fn derived_concurrency_covers_the_timeout_window() {
    // 1s / 100 = 10ms between requests; 20ms timeout -> 2 + 1.
    assert_eq!(derive_concurrency(Duration::from_millis(20), 100), 3);
    // 10ms timeout at 1000 qps -> 10 + 1.
    assert_eq!(derive_concurrency(Duration::from_millis(10), 1000), 11);
    // Timeout shorter than the interval still gets one worker plus one.
    assert_eq!(derive_concurrency(Duration::from_millis(1), 10), 1);
}

#[test]
fn derived_concurrency_is_capped() {
    assert_eq!(
        derive_concurrency(Duration::from_secs(u64::MAX / 4), 1_000_000),
        i32::MAX as u32
    );
}

#[test]
fn qps_and_concurrency_are_mutually_exclusive() {
    let timeout = Duration::from_millis(50);
    let duration = Duration::from_secs(1);

    let mut both = EngineConfig::with_qps("127.0.0.1:1", timeout, 100, duration);
    both.concurrency = 5;
    assert_eq!(
        both.validate(),
        Err(ConfigError::QpsXorConcurrency {
            qps: 100,
            concurrency: 5
        })
    );

    let neither = EngineConfig::with_concurrency("127.0.0.1:1", timeout, 0, duration);
    assert!(matches!(
        neither.validate(),
        Err(ConfigError::QpsXorConcurrency { .. })
    ));

    let qps = EngineConfig::with_qps("127.0.0.1:1", timeout, 100, duration);
    assert_eq!(qps.validate(), Ok(6));

    let fixed = EngineConfig::with_concurrency("127.0.0.1:1", timeout, 7, duration);
    assert_eq!(fixed.validate(), Ok(7));
}

#[test]
fn empty_and_zero_fields_are_rejected() {
    let timeout = Duration::from_millis(50);
    let duration = Duration::from_secs(1);

    let cfg = EngineConfig::with_concurrency("  ", timeout, 1, duration);
    assert_eq!(cfg.validate(), Err(ConfigError::EmptyAddress));

    let cfg = EngineConfig::with_concurrency("127.0.0.1:1", Duration::ZERO, 1, duration);
    assert_eq!(cfg.validate(), Err(ConfigError::ZeroTimeout));

    let cfg = EngineConfig::with_concurrency("127.0.0.1:1", timeout, 1, Duration::ZERO);
    assert_eq!(cfg.validate(), Err(ConfigError::ZeroDuration));

    let cfg =
        EngineConfig::with_concurrency("127.0.0.1:1", timeout, 1, duration).max_response_bytes(0);
    assert_eq!(cfg.validate(), Err(ConfigError::ZeroReadLimit));
}

#[test]
fn profile_yaml_maps_onto_engine_config() {
    let yaml = r#"
target:
  address: "127.0.0.1:9527"
  protocol: echo
load:
  timeout_ms: 20
  qps: 100
  duration_secs: 3
  keep_alive: true
metrics:
  enabled: false
  port: 9100
"#;
    let config = Config::from_yaml_str(yaml).unwrap();
    assert_eq!(config.target.protocol, Protocol::Echo);
    assert_eq!(config.target.echo_payload_len, 10);
    assert_eq!(config.load.concurrency, 0);
    assert_eq!(config.load.max_response_bytes, 64 * 1024);
    assert!(!config.output.print_details);

    let engine_config = EngineConfig::from_profile(&config);
    assert_eq!(engine_config.address, "127.0.0.1:9527");
    assert_eq!(engine_config.timeout, Duration::from_millis(20));
    assert_eq!(engine_config.duration, Duration::from_secs(3));
    assert!(engine_config.keep_alive);
    assert_eq!(engine_config.validate(), Ok(3));
}

#[test]
fn unknown_protocol_fails_to_parse() {
    let yaml = r#"
target:
  address: "127.0.0.1:9527"
  protocol: reversi
load:
  timeout_ms: 20
  concurrency: 1
  duration_secs: 3
"#;
    assert!(Config::from_yaml_str(yaml).is_err());
}
