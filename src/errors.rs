//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Host save capability reported a failure.
    Save(String),
    /// A relative save path could not be mapped to a file location.
    Resolve(String),
    /// Game server process could not be started or stopped.
    Server(String),
    /// A resolved file exists but could not be removed.
    Delete(String),
    /// Pending-reset journal could not be read, written, or removed.
    Journal(String),
    /// IPC communication failure.
    Ipc(String),
    /// File system path failed validation against the save root.
    PathViolation(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Save(msg) => write!(f, "save: {msg}"),
            Self::Resolve(msg) => write!(f, "resolve: {msg}"),
            Self::Server(msg) => write!(f, "server: {msg}"),
            Self::Delete(msg) => write!(f, "delete: {msg}"),
            Self::Journal(msg) => write!(f, "journal: {msg}"),
            Self::Ipc(msg) => write!(f, "ipc: {msg}"),
            Self::PathViolation(msg) => write!(f, "path violation: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Journal(err.to_string())
    }
}
