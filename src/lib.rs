#![forbid(unsafe_code)]

//! Graceful reset of a supervised, stateful server process.
//!
//! A reset saves current state, stops the game server, deletes a queued set
//! of save files while the daemon terminates, and leaves the restart of
//! daemon and server to the supervisor.

pub mod config;
pub mod errors;
pub mod host;
pub mod ipc;
pub mod lifecycle;
pub mod monitor;
pub mod reset;
pub mod zones;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
