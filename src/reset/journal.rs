//! On-disk mirror of the pending reset.
//!
//! Shutdown hooks do not run when the process is killed abruptly. With a
//! journal configured, the queued paths survive such a kill and the next
//! start finishes the cleanup (see [`super::recovery`]).

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use uuid::Uuid;

use super::state::PendingReset;
use crate::{AppError, Result};

/// Persisted form of a pending reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Reset the paths belong to.
    pub reset_id: Uuid,
    /// When the entry was last written.
    pub scheduled_at: DateTime<Utc>,
    /// Queued relative paths.
    pub paths: Vec<String>,
}

/// Pending-reset journal file.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Journal {
    /// Journal stored at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the latest state of `pending`.
    ///
    /// The snapshot is taken after the write lock is held, so the last
    /// writer always records a superset of earlier writers. Nothing is
    /// written once cleanup has consumed the paths, so a cleared journal
    /// stays cleared.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Journal` if the file cannot be written.
    pub fn record(&self, pending: &PendingReset) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = pending.snapshot();
        if snapshot.finalized {
            return Ok(());
        }
        let Some(reset_id) = snapshot.reset_id else {
            return Ok(());
        };
        self.write(&JournalEntry {
            reset_id,
            scheduled_at: Utc::now(),
            paths: snapshot.paths,
        })
    }

    /// Atomically replace the journal with `entry`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Journal` on serialization or I/O failure.
    pub fn write(&self, entry: &JournalEntry) -> Result<()> {
        let parent = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(|err| {
            AppError::Journal(format!("failed to create {}: {err}", parent.display()))
        })?;

        let body = serde_json::to_vec_pretty(entry)?;
        let mut tmp = NamedTempFile::new_in(parent)
            .map_err(|err| AppError::Journal(format!("failed to create temporary file: {err}")))?;
        tmp.write_all(&body)
            .map_err(|err| AppError::Journal(format!("failed to write temporary file: {err}")))?;
        tmp.as_file()
            .sync_all()
            .map_err(|err| AppError::Journal(format!("failed to sync temporary file: {err}")))?;
        tmp.persist(&self.path).map_err(|err| {
            AppError::Journal(format!(
                "failed to persist journal to {}: {err}",
                self.path.display()
            ))
        })?;
        Ok(())
    }

    /// Read the journal if one exists.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Journal` if the file exists but cannot be read or
    /// parsed.
    pub fn load(&self) -> Result<Option<JournalEntry>> {
        match std::fs::read(&self.path) {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(AppError::Journal(format!(
                "failed to read {}: {err}",
                self.path.display()
            ))),
        }
    }

    /// Remove the journal. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Journal` if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AppError::Journal(format!(
                "failed to remove {}: {err}",
                self.path.display()
            ))),
        }
    }
}
