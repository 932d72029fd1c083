//! Capabilities the reset core needs from its host process.
//!
//! The core only sees these traits. The host (the `reset-zone` daemon, or any
//! embedding server) supplies implementations at bootstrap. Concrete
//! adapters for a plain save directory, an external save command, a
//! supervised game-server child, the local file system and
//! `std::process::exit` live in the submodules.

pub mod child_server;
pub mod command_save;
pub mod fs;
pub mod save_dir;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::Result;

pub use child_server::ChildServer;
pub use command_save::CommandSave;
pub use fs::{FsRemover, ProcessExiter};
pub use save_dir::SaveDirectory;

/// Persists current host state before destructive changes.
pub trait SaveCapability: Send + Sync {
    /// Save current state. With `blocking = true` the call returns only once
    /// the save has fully completed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Save` when the host could not persist its state.
    fn save(&self, blocking: bool) -> Result<()>;
}

/// Stops the server whose files are about to be deleted.
pub trait ServerControl: Send + Sync {
    /// Stop the server and return once its process is gone. Calling this
    /// on a server that already stopped succeeds.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Server` when the process may still be running.
    fn stop(&self) -> Result<()>;
}

/// Maps save-relative paths onto files of one save session.
pub trait PathResolver: Send + Sync {
    /// Resolve `relative` to an absolute location in the current save.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Resolve` or `AppError::PathViolation` when the
    /// path cannot be mapped.
    fn resolve_save_path(&self, relative: &str) -> Result<PathBuf>;
}

/// Storage subsystem that knows which save is current.
///
/// Acquired lazily by the finalizer: the current save may not be meaningful
/// until cleanup actually runs.
pub trait StorageHost: Send + Sync {
    /// Resolver for the save that is current right now.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Resolve` when no save context is available.
    fn current_save(&self) -> Result<Arc<dyn PathResolver>>;
}

/// Outcome of a successful delete-if-exists call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The file existed and was removed.
    Deleted,
    /// Nothing was there to remove.
    Absent,
}

/// Delete-if-exists semantics on resolved files.
pub trait FileRemover: Send + Sync {
    /// Remove `path` if it exists.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Delete` when the file exists but cannot be removed.
    fn remove_if_exists(&self, path: &Path) -> Result<Removal>;
}

/// Final step of process termination.
pub trait ProcessExit: Send + Sync {
    /// End the process with `code`. Real implementations never return.
    fn exit(&self, code: i32);
}
