//! Global configuration parsing and validation.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::zones::ZONE_PLACEHOLDER;
use crate::{AppError, Result};

/// External save command settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SaveConfig {
    /// Program and arguments run to persist host state. Empty disables the
    /// command and turns saving into a logged no-op.
    #[serde(default)]
    pub command: Vec<String>,
}

/// Environment variable that overrides `ipc_auth_token`.
pub const AUTH_TOKEN_ENV: &str = "RESET_ZONE_AUTH_TOKEN";

fn default_stop_timeout_seconds() -> u64 {
    60
}

fn default_shutdown_grace_seconds() -> u64 {
    30
}

/// Game server the daemon starts and stops.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Program and arguments that run the game server in the foreground.
    pub command: Vec<String>,
    /// Working directory for the server; defaults to the daemon's.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Optional graceful stop request (for example an RCON `quit`), tried
    /// before SIGTERM.
    #[serde(default)]
    pub stop_command: Vec<String>,
    /// How long each stop step may take before escalating.
    #[serde(default = "default_stop_timeout_seconds")]
    pub stop_timeout_seconds: u64,
}

impl ServerConfig {
    /// Per-step stop deadline.
    #[must_use]
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_seconds)
    }
}

fn default_ipc_name() -> String {
    "reset-zone".into()
}

fn default_zone_templates() -> Vec<String> {
    vec![
        "map_{xy}.bin".into(),
        "chunkdata_{xy}.bin".into(),
        "zpop_{xy}.bin".into(),
    ]
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Directory holding the current save; relative reset paths resolve here.
    pub save_dir: PathBuf,
    /// Named pipe / Unix socket identifier for the trigger channel.
    #[serde(default = "default_ipc_name")]
    pub ipc_name: String,
    /// Shared secret required on IPC requests when set.
    #[serde(default)]
    pub ipc_auth_token: Option<String>,
    /// Deadline for the host save in seconds; 0 means no deadline.
    #[serde(default)]
    pub save_timeout_seconds: u64,
    /// Location of the pending-reset journal; unset disables it.
    #[serde(default)]
    pub journal_path: Option<PathBuf>,
    /// File name templates a zone expands into. Each contains `{xy}`.
    #[serde(default = "default_zone_templates")]
    pub zone_templates: Vec<String>,
    /// How long a termination signal waits for an in-flight reset to
    /// finish its save and server stop before cleanup is skipped.
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,
    /// Save command settings.
    #[serde(default)]
    pub save: SaveConfig,
    /// Supervised game server.
    pub server: ServerConfig,
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

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Save deadline, or `None` when saves may run indefinitely.
    #[must_use]
    pub fn save_timeout(&self) -> Option<Duration> {
        (self.save_timeout_seconds > 0).then(|| Duration::from_secs(self.save_timeout_seconds))
    }

    /// Grace period for an in-flight reset during signal shutdown.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    /// Apply overrides from the process environment.
    ///
    /// A non-empty `RESET_ZONE_AUTH_TOKEN` replaces the configured IPC token
    /// so the secret can stay out of the config file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = env::var(AUTH_TOKEN_ENV) {
            let token = token.trim();
            if !token.is_empty() {
                self.ipc_auth_token = Some(token.to_owned());
            }
        }
    }

    fn validate(&mut self) -> Result<()> {
        if self.ipc_name.trim().is_empty() {
            return Err(AppError::Config("ipc_name must not be empty".into()));
        }

        if self.server.command.is_empty() {
            return Err(AppError::Config("server.command must not be empty".into()));
        }

        if let Some(template) = self
            .zone_templates
            .iter()
            .find(|template| !template.contains(ZONE_PLACEHOLDER))
        {
            return Err(AppError::Config(format!(
                "zone template '{template}' must contain {ZONE_PLACEHOLDER}"
            )));
        }

        let canonical_root = self
            .save_dir
            .canonicalize()
            .map_err(|err| AppError::Config(format!("save_dir invalid: {err}")))?;
        self.save_dir = canonical_root;

        Ok(())
    }
}
