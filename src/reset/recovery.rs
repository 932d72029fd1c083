//! Startup recovery of resets interrupted by an abrupt kill.

use tracing::{info, info_span, warn};

use super::finalizer::{run_cleanup, CleanupReport};
use super::journal::Journal;
use crate::host::{FileRemover, StorageHost};
use crate::Result;

/// Finish a reset left behind in `journal` by a previous run.
///
/// Returns `None` when no journal exists. The journal is removed after the
/// cleanup pass regardless of per-path failures, matching the single-pass
/// policy of the shutdown finalizer.
///
/// # Errors
///
/// Returns `AppError::Journal` if the journal cannot be read or removed.
pub fn recover_interrupted(
    journal: &Journal,
    storage: &dyn StorageHost,
    remover: &dyn FileRemover,
) -> Result<Option<CleanupReport>> {
    let Some(entry) = journal.load()? else {
        info!("no interrupted reset found on startup");
        return Ok(None);
    };

    let _span = info_span!("startup_recovery", reset_id = %entry.reset_id).entered();
    warn!(
        files = entry.paths.len(),
        scheduled_at = %entry.scheduled_at.to_rfc3339(),
        "previous run exited before reset cleanup; completing it now"
    );

    let report = run_cleanup(storage, remover, &entry.paths);
    journal.clear()?;

    info!(
        deleted = report.deleted(),
        absent = report.absent(),
        failed = report.failed(),
        "interrupted reset recovered"
    );
    Ok(Some(report))
}
