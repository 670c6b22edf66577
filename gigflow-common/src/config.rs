//! Configuration loading
//!
//! Bootstrap settings come from a TOML file. Sources are layered with the
//! following priority (highest first):
//! 1. Command-line arguments (applied by the binary)
//! 2. Environment variables (`GIGFLOW_*`)
//! 3. TOML config file
//! 4. Built-in defaults

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "GIGFLOW_CONFIG";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Address the HTTP server binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Recipient routing configuration
    #[serde(default)]
    pub routing: RoutingConfig,

    /// AI fallback parser configuration
    #[serde(default)]
    pub ai: AiConfig,

    /// Number of webhook deliveries kept in the in-process activity log
    #[serde(default = "default_activity_log_capacity")]
    pub activity_log_capacity: usize,

    /// Broadcast channel capacity for domain events
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            bind_address: default_bind_address(),
            port: default_port(),
            logging: LoggingConfig::default(),
            routing: RoutingConfig::default(),
            ai: AiConfig::default(),
            activity_log_capacity: default_activity_log_capacity(),
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Routing of inbound mail to owning accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Account that receives mail whose routing prefix matches no user
    #[serde(default = "default_triage_user_id")]
    pub default_user_id: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_user_id: default_triage_user_id(),
        }
    }
}

/// Language-model fallback configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Whether the fallback parser may be called at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Chat-completions endpoint
    #[serde(default = "default_ai_endpoint")]
    pub endpoint: String,

    /// Model identifier sent with each request
    #[serde(default = "default_ai_model")]
    pub model: String,

    /// API key (prefer `GIGFLOW_AI_API_KEY`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Budget for the whole fallback step, retry included
    #[serde(default = "default_ai_timeout_ms")]
    pub timeout_ms: u64,

    /// Heuristic confidence below which the fallback runs
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_ai_endpoint(),
            model: default_ai_model(),
            api_key: None,
            timeout_ms: default_ai_timeout_ms(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

impl AiConfig {
    /// The fallback is usable only when enabled and a non-blank key is present
    pub fn is_usable(&self) -> bool {
        self.enabled
            && self
                .api_key
                .as_deref()
                .map(|k| !k.trim().is_empty())
                .unwrap_or(false)
    }
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("gigflow").join("gigflow.db"))
        .unwrap_or_else(|| PathBuf::from("./gigflow_data/gigflow.db"))
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5810
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Identifier of the triage account seeded at database initialization
pub fn default_triage_user_id() -> String {
    "triage".to_string()
}

fn default_true() -> bool {
    true
}

fn default_ai_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_ai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_ai_timeout_ms() -> u64 {
    8000
}

fn default_confidence_threshold() -> f64 {
    0.6
}

fn default_activity_log_capacity() -> usize {
    200
}

fn default_event_bus_capacity() -> usize {
    100
}

/// Platform default location of the config file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("gigflow").join("gigflow.toml"))
}

/// Resolve which config file to read
///
/// Explicit path → `GIGFLOW_CONFIG` → platform default. Returns `None` when
/// nothing is specified and no default exists.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    default_config_path().filter(|p| p.exists())
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;

    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse TOML {}: {}", path.display(), e)))?;

    info!("Loaded TOML configuration from {}", path.display());
    Ok(config)
}

/// Write a TOML config file, creating parent directories
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize TOML: {}", e)))?;

    // Write to a sibling temp file first so readers never see a partial file
    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load configuration from file (if any), then apply environment overrides
pub fn load_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let mut config = match resolve_config_path(explicit) {
        Some(path) => load_toml_config(&path)?,
        None => {
            debug!("No config file found, using built-in defaults");
            TomlConfig::default()
        }
    };

    apply_env_overrides(&mut config)?;
    validate(&config)?;
    Ok(config)
}

/// Apply `GIGFLOW_*` environment variables on top of file values
pub fn apply_env_overrides(config: &mut TomlConfig) -> Result<()> {
    if let Some(v) = env_nonempty("GIGFLOW_DATABASE_PATH") {
        config.database_path = PathBuf::from(v);
    }
    if let Some(v) = env_nonempty("GIGFLOW_BIND_ADDRESS") {
        config.bind_address = v;
    }
    if let Some(v) = env_nonempty("GIGFLOW_PORT") {
        config.port = v
            .parse()
            .map_err(|_| Error::Config(format!("GIGFLOW_PORT is not a valid port: {}", v)))?;
    }
    if let Some(v) = env_nonempty("GIGFLOW_LOG_LEVEL") {
        config.logging.level = v;
    }
    if let Some(v) = env_nonempty("GIGFLOW_DEFAULT_USER_ID") {
        config.routing.default_user_id = v;
    }
    if let Some(v) = env_nonempty("GIGFLOW_AI_API_KEY") {
        config.ai.api_key = Some(v);
    }
    if let Some(v) = env_nonempty("GIGFLOW_AI_ENDPOINT") {
        config.ai.endpoint = v;
    }
    if let Some(v) = env_nonempty("GIGFLOW_AI_MODEL") {
        config.ai.model = v;
    }
    if let Some(v) = env_nonempty("GIGFLOW_AI_ENABLED") {
        config.ai.enabled = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
    }
    Ok(())
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Reject values the service cannot run with
pub fn validate(config: &TomlConfig) -> Result<()> {
    if !(0.0..=1.0).contains(&config.ai.confidence_threshold) {
        return Err(Error::Config(format!(
            "ai.confidence_threshold must be within [0, 1], got {}",
            config.ai.confidence_threshold
        )));
    }
    if config.ai.timeout_ms == 0 {
        return Err(Error::Config("ai.timeout_ms must be positive".to_string()));
    }
    if config.activity_log_capacity == 0 || config.event_bus_capacity == 0 {
        return Err(Error::Config(
            "activity_log_capacity and event_bus_capacity must be positive".to_string(),
        ));
    }
    if config.routing.default_user_id.trim().is_empty() {
        return Err(Error::Config("routing.default_user_id must not be empty".to_string()));
    }
    Ok(())
}
