use std::path::PathBuf;
use std::time::Duration;

use connect_four_relay::{config::GlobalConfig, AppError};

fn sample_toml() -> &'static str {
    r#"
max_sessions = 4

[http]
host = "0.0.0.0"
port = 8080
allowed_origin = "http://localhost:3000"

[engine]
binary = "/opt/open_spiel/build/examples/alpha_zero_torch_game_example"
game = "connect_four"
az_path = "/opt/models/connect_four"
az_checkpoint = 120
working_dir = "/opt/open_spiel"

[timeouts]
move_wait_seconds = 30
reap_interval_seconds = 10
"#
}

#[test]
fn parses_valid_config() {
    let config = GlobalConfig::from_toml_str(sample_toml()).expect("config parses");

    assert_eq!(config.max_sessions, 4);
    assert_eq!(config.http.host, "0.0.0.0");
    assert_eq!(config.http.port, 8080);
    assert_eq!(config.http.allowed_origin, "http://localhost:3000");
    assert_eq!(config.engine.az_checkpoint, 120);
    assert_eq!(
        config.engine.working_dir,
        Some(PathBuf::from("/opt/open_spiel"))
    );
    assert_eq!(config.move_timeout(), Duration::from_secs(30));
    assert_eq!(config.reap_interval(), Duration::from_secs(10));
}

#[test]
fn empty_document_yields_reference_deployment() {
    let config = GlobalConfig::from_toml_str("").expect("empty config parses");

    assert_eq!(config, GlobalConfig::default());
    assert_eq!(config.http.port, 5001);
    assert_eq!(config.http.allowed_origin, "http://localhost:5173");
    assert_eq!(
        config.engine.binary,
        PathBuf::from("../build/examples/alpha_zero_torch_game_example")
    );
    assert_eq!(config.engine.game, "connect_four");
    assert_eq!(config.engine.az_path, PathBuf::from("../connect_four"));
    assert_eq!(config.engine.az_checkpoint, 50);
    assert_eq!(config.engine.working_dir, None);
    assert_eq!(config.move_timeout(), Duration::from_secs(120));
    assert_eq!(config.reap_interval(), Duration::from_secs(60));
}

#[test]
fn partial_sections_keep_remaining_defaults() {
    let config = GlobalConfig::from_toml_str(
        r"
[engine]
az_checkpoint = 7
",
    )
    .expect("partial config parses");

    assert_eq!(config.engine.az_checkpoint, 7);
    assert_eq!(config.engine.game, "connect_four");
    assert_eq!(config.http.port, 5001);
}

#[test]
fn zero_move_wait_is_rejected() {
    let result = GlobalConfig::from_toml_str(
        r"
[timeouts]
move_wait_seconds = 0
",
    );

    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("move_wait_seconds")));
}

#[test]
fn zero_reap_interval_is_rejected() {
    let result = GlobalConfig::from_toml_str(
        r"
[timeouts]
reap_interval_seconds = 0
",
    );

    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("reap_interval_seconds")));
}

#[test]
fn zero_max_sessions_is_rejected() {
    let result = GlobalConfig::from_toml_str("max_sessions = 0");
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("max_sessions")));
}

#[test]
fn empty_engine_binary_is_rejected() {
    let result = GlobalConfig::from_toml_str(
        r#"
[engine]
binary = ""
"#,
    );
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("engine.binary")));
}

#[test]
fn malformed_toml_is_a_config_error() {
    let result = GlobalConfig::from_toml_str("max_sessions = [");
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.starts_with("invalid config")));
}

#[test]
fn missing_file_is_a_config_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let result = GlobalConfig::load_from_path(temp.path().join("absent.toml"));
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("failed to read config")));
}

#[test]
fn loads_from_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("config.toml");
    std::fs::write(&path, sample_toml()).expect("write config");

    let config = GlobalConfig::load_from_path(&path).expect("config loads");
    assert_eq!(config.http.port, 8080);
}
