//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// HTTP listener and browser-facing settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct HttpConfig {
    /// Interface the facade binds to.
    pub host: String,
    /// TCP port; 0 lets the OS pick one.
    pub port: u16,
    /// Origin allowed by the CORS middleware (the web client's dev server).
    pub allowed_origin: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5001,
            allowed_origin: "http://localhost:5173".into(),
        }
    }
}

/// How the engine binary is launched for every session.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct EngineConfig {
    /// Path to the engine executable.
    pub binary: PathBuf,
    /// Game variant passed as `--game`.
    pub game: String,
    /// Directory holding the trained model, passed as `--az_path`.
    pub az_path: PathBuf,
    /// Checkpoint number, passed as `--az_checkpoint`.
    pub az_checkpoint: u32,
    /// Working directory for the engine; inherits the server's when unset.
    pub working_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("../build/examples/alpha_zero_torch_game_example"),
            game: "connect_four".into(),
            az_path: PathBuf::from("../connect_four"),
            az_checkpoint: 50,
            working_dir: None,
        }
    }
}

/// Configurable timeout values (seconds).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// How long a `get-model-move` request blocks before answering 504.
    #[serde(default = "default_move_wait_seconds")]
    pub move_wait_seconds: u64,
    /// Interval between reaper sweeps.
    #[serde(default = "default_reap_interval_seconds")]
    pub reap_interval_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            move_wait_seconds: default_move_wait_seconds(),
            reap_interval_seconds: default_reap_interval_seconds(),
        }
    }
}

fn default_move_wait_seconds() -> u64 {
    120
}

fn default_reap_interval_seconds() -> u64 {
    60
}

fn default_max_sessions() -> usize {
    32
}

/// Global configuration parsed from `config.toml`.
///
/// Every field has a default, so an empty document describes the reference
/// deployment.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// HTTP facade settings.
    #[serde(default)]
    pub http: HttpConfig,
    /// Engine launch settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Deadlines and sweep interval.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Maximum number of concurrently registered games.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            engine: EngineConfig::default(),
            timeouts: TimeoutConfig::default(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Deadline applied to a blocking move request.
    #[must_use]
    pub fn move_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.move_wait_seconds)
    }

    /// Period of the exited-session sweep.
    #[must_use]
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.timeouts.reap_interval_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.engine.binary.as_os_str().is_empty() {
            return Err(AppError::Config("engine.binary must not be empty".into()));
        }

        if self.engine.game.trim().is_empty() {
            return Err(AppError::Config("engine.game must not be empty".into()));
        }

        if self.timeouts.move_wait_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.move_wait_seconds must be greater than zero".into(),
            ));
        }

        if self.timeouts.reap_interval_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.reap_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.max_sessions == 0 {
            return Err(AppError::Config(
                "max_sessions must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
