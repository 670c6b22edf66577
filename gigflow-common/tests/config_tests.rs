//! Configuration loading tests
//!
//! Uses serial_test: tests that touch `GIGFLOW_*` environment variables run
//! one at a time.

use gigflow_common::config::{
    apply_env_overrides, load_config, load_toml_config, validate, write_toml_config, TomlConfig,
};
use gigflow_common::Error;
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

const ENV_VARS: &[&str] = &[
    "GIGFLOW_CONFIG",
    "GIGFLOW_DATABASE_PATH",
    "GIGFLOW_BIND_ADDRESS",
    "GIGFLOW_PORT",
    "GIGFLOW_LOG_LEVEL",
    "GIGFLOW_DEFAULT_USER_ID",
    "GIGFLOW_AI_API_KEY",
    "GIGFLOW_AI_ENDPOINT",
    "GIGFLOW_AI_MODEL",
    "GIGFLOW_AI_ENABLED",
];

fn clear_env() {
    for var in ENV_VARS {
        env::remove_var(var);
    }
}

#[test]
fn test_defaults() {
    let config = TomlConfig::default();
    assert_eq!(config.port, 5810);
    assert_eq!(config.bind_address, "127.0.0.1");
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.routing.default_user_id, "triage");
    assert!(config.ai.enabled);
    assert!(config.ai.api_key.is_none());
    assert!(!config.ai.is_usable(), "no key means no AI fallback");
    assert!(validate(&config).is_ok());
}

#[test]
fn test_partial_file_keeps_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gigflow.toml");
    std::fs::write(
        &path,
        r#"
port = 9000

[ai]
api_key = "sk-test"
confidence_threshold = 0.75
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.port, 9000);
    assert_eq!(config.bind_address, "127.0.0.1");
    assert_eq!(config.ai.confidence_threshold, 0.75);
    assert_eq!(config.ai.timeout_ms, 8000);
    assert!(config.ai.is_usable());
}

#[test]
fn test_invalid_toml_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "port = \"not a number").unwrap();
    assert!(matches!(load_toml_config(&path), Err(Error::Config(_))));
}

#[test]
fn test_blank_key_is_not_usable() {
    let mut config = TomlConfig::default();
    config.ai.api_key = Some("   ".to_string());
    assert!(!config.ai.is_usable());
    config.ai.api_key = Some("sk-live".to_string());
    config.ai.enabled = false;
    assert!(!config.ai.is_usable());
}

#[test]
fn test_validation_rejects_bad_values() {
    let mut config = TomlConfig::default();
    config.ai.confidence_threshold = 1.5;
    assert!(validate(&config).is_err());

    let mut config = TomlConfig::default();
    config.ai.timeout_ms = 0;
    assert!(validate(&config).is_err());

    let mut config = TomlConfig::default();
    config.routing.default_user_id = " ".to_string();
    assert!(validate(&config).is_err());
}

#[test]
fn test_write_then_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("gigflow.toml");

    let mut config = TomlConfig::default();
    config.database_path = PathBuf::from("/var/lib/gigflow/test.db");
    config.activity_log_capacity = 10;
    write_toml_config(&config, &path).unwrap();

    assert!(!path.with_extension("toml.tmp").exists());
    let loaded = load_toml_config(&path).unwrap();
    assert_eq!(loaded.database_path, config.database_path);
    assert_eq!(loaded.activity_log_capacity, 10);
}

#[test]
#[serial]
fn test_env_overrides_file_values() {
    clear_env();
    env::set_var("GIGFLOW_PORT", "7001");
    env::set_var("GIGFLOW_AI_API_KEY", "sk-env");
    env::set_var("GIGFLOW_AI_ENABLED", "false");

    let mut config = TomlConfig::default();
    apply_env_overrides(&mut config).unwrap();
    clear_env();

    assert_eq!(config.port, 7001);
    assert_eq!(config.ai.api_key.as_deref(), Some("sk-env"));
    assert!(!config.ai.enabled);
}

#[test]
#[serial]
fn test_invalid_env_port_is_reported() {
    clear_env();
    env::set_var("GIGFLOW_PORT", "ninety");
    let mut config = TomlConfig::default();
    let result = apply_env_overrides(&mut config);
    clear_env();
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_load_config_from_env_path() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(&path, "bind_address = \"0.0.0.0\"\n").unwrap();
    env::set_var("GIGFLOW_CONFIG", &path);
    env::set_var("GIGFLOW_LOG_LEVEL", "debug");

    let config = load_config(None).unwrap();
    clear_env();

    assert_eq!(config.bind_address, "0.0.0.0");
    assert_eq!(config.logging.level, "debug");
}
