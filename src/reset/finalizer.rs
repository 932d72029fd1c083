//! Shutdown finalizer: deletes queued save files while the process exits.
//!
//! Cleanup is a single best-effort pass. Every path is its own unit of work:
//! a resolution or deletion failure is logged and recorded, and the pass
//! moves on. A file that is already gone counts as done.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, info_span, warn};

use super::journal::Journal;
use super::state::{Handoff, PendingReset, ResetPhase};
use crate::host::{FileRemover, PathResolver, Removal, StorageHost};
use crate::lifecycle::ShutdownHook;

/// Result of one path in a cleanup pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStatus {
    /// File existed and was removed.
    Deleted,
    /// File did not exist; nothing to do.
    Absent,
    /// Path could not be mapped to a file location.
    ResolveFailed(String),
    /// File exists but could not be removed.
    DeleteFailed(String),
}

impl PathStatus {
    /// Whether the end state (file gone) was reached.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Deleted | Self::Absent)
    }
}

/// Per-path record of a cleanup pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathOutcome {
    /// Relative path as it was queued.
    pub path: String,
    /// What happened to it.
    pub status: PathStatus,
}

/// Outcome of a whole cleanup pass, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// One entry per queued path.
    pub outcomes: Vec<PathOutcome>,
}

impl CleanupReport {
    /// Number of files removed.
    #[must_use]
    pub fn deleted(&self) -> usize {
        self.count(|status| matches!(status, PathStatus::Deleted))
    }

    /// Number of paths that were already absent.
    #[must_use]
    pub fn absent(&self) -> usize {
        self.count(|status| matches!(status, PathStatus::Absent))
    }

    /// Number of paths that failed to resolve or delete.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|status| !status.is_success())
    }

    /// True when no path failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, predicate: impl Fn(&PathStatus) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| predicate(&outcome.status))
            .count()
    }
}

/// Delete `paths` from the current save, one independent attempt each.
///
/// The resolver is obtained once. If that fails, every path is recorded as
/// a resolution failure.
pub fn run_cleanup(
    storage: &dyn StorageHost,
    remover: &dyn FileRemover,
    paths: &[String],
) -> CleanupReport {
    let resolver = match storage.current_save() {
        Ok(resolver) => resolver,
        Err(err) => {
            error!(%err, "cannot access current save; no files will be deleted");
            return CleanupReport {
                outcomes: paths
                    .iter()
                    .map(|path| PathOutcome {
                        path: path.clone(),
                        status: PathStatus::ResolveFailed(err.to_string()),
                    })
                    .collect(),
            };
        }
    };

    let outcomes = paths
        .iter()
        .map(|path| PathOutcome {
            path: path.clone(),
            status: clean_one(resolver.as_ref(), remover, path),
        })
        .collect();

    CleanupReport { outcomes }
}

fn clean_one(resolver: &dyn PathResolver, remover: &dyn FileRemover, relative: &str) -> PathStatus {
    let target = match resolver.resolve_save_path(relative) {
        Ok(target) => target,
        Err(err) => {
            error!(path = relative, %err, "error resolving file");
            return PathStatus::ResolveFailed(err.to_string());
        }
    };

    match remover.remove_if_exists(&target) {
        Ok(Removal::Deleted) => {
            info!(path = relative, "deleted");
            PathStatus::Deleted
        }
        Ok(Removal::Absent) => {
            debug!(path = relative, "already absent");
            PathStatus::Absent
        }
        Err(err) => {
            error!(path = relative, %err, "failed to delete");
            PathStatus::DeleteFailed(err.to_string())
        }
    }
}

/// Last-chance hook that performs the queued deletions.
pub struct ShutdownFinalizer {
    state: Arc<PendingReset>,
    storage: Arc<dyn StorageHost>,
    remover: Arc<dyn FileRemover>,
    journal: Option<Arc<Journal>>,
    handoff_wait: Duration,
}

impl ShutdownFinalizer {
    /// Finalizer over `state`, deleting through `storage` and `remover`.
    #[must_use]
    pub fn new(
        state: Arc<PendingReset>,
        storage: Arc<dyn StorageHost>,
        remover: Arc<dyn FileRemover>,
    ) -> Self {
        Self {
            state,
            storage,
            remover,
            journal: None,
            handoff_wait: Duration::ZERO,
        }
    }

    /// Clear `journal` once cleanup has run.
    #[must_use]
    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Wait up to `wait` for an in-flight save and server stop when the
    /// hook fires early, for example from a termination signal.
    #[must_use]
    pub fn with_handoff_wait(mut self, wait: Duration) -> Self {
        self.handoff_wait = wait;
        self
    }

    /// Consume the pending reset and delete its files.
    ///
    /// Returns `None` when nothing was pending (normal shutdown), when the
    /// reset was already finalized, when the save or server stop did not
    /// finish within the handoff wait, or when the server could not be
    /// stopped. A configured journal keeps the paths in the last two cases.
    pub fn finalize(&self) -> Option<CleanupReport> {
        let pending = match self.state.take_for_cleanup_within(self.handoff_wait) {
            Handoff::Nothing => return None,
            Handoff::SaveInFlight(reset_id) => {
                warn!(
                    %reset_id,
                    wait = ?self.handoff_wait,
                    "process stopping before the save and server stop finished; skipping cleanup"
                );
                return None;
            }
            Handoff::ServerRunning(reset_id) => {
                error!(
                    %reset_id,
                    "game server was not stopped; skipping cleanup"
                );
                return None;
            }
            Handoff::Cleanup(pending) => pending,
        };

        let span = info_span!("reset_cleanup", reset_id = %pending.reset_id);
        let _guard = span.enter();
        info!(files = pending.paths.len(), "performing cleanup");

        let report = run_cleanup(self.storage.as_ref(), self.remover.as_ref(), &pending.paths);

        if let Some(ref journal) = self.journal {
            if let Err(err) = journal.clear() {
                error!(%err, "failed to clear pending-reset journal");
            }
        }

        self.state.set_phase(ResetPhase::Exited);
        info!(
            deleted = report.deleted(),
            absent = report.absent(),
            failed = report.failed(),
            "cleanup finished; exiting so the supervisor restarts the server"
        );
        Some(report)
    }
}

impl ShutdownHook for ShutdownFinalizer {
    fn name(&self) -> &'static str {
        "reset-cleanup"
    }

    fn on_shutdown(&self) {
        let _ = self.finalize();
    }
}

impl std::fmt::Debug for ShutdownFinalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownFinalizer")
            .field("state", &self.state)
            .field("journal", &self.journal)
            .field("handoff_wait", &self.handoff_wait)
            .finish_non_exhaustive()
    }
}
