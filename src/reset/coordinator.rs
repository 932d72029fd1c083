//! Reset coordinator: accepts reset requests and drives save-then-exit.
//!
//! [`ResetCoordinator::schedule_reset`] only appends to the pending state and
//! returns. The first request of a reset event spawns the save task. It
//! saves on a blocking worker, stops the game server, and then terminates
//! the process through the [`Lifecycle`]. Every outcome ends in
//! termination; only the exit status differs.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{error, info, info_span, warn, Instrument};

use super::journal::Journal;
use super::state::{PendingReset, ResetPhase, Scheduled};
use crate::host::{SaveCapability, ServerControl};
use crate::lifecycle::Lifecycle;
use crate::{AppError, Result};

/// Exit status after a successful save.
pub const EXIT_SAVED: i32 = 0;

/// Exit status after a failed save.
pub const EXIT_SAVE_FAILED: i32 = 1;

/// Exit status when the game server could not be stopped.
pub const EXIT_STOP_FAILED: i32 = 2;

/// Exit status when the game server exited on its own.
pub const EXIT_SERVER_EXITED: i32 = 3;

/// Entry point for reset requests.
pub struct ResetCoordinator {
    state: Arc<PendingReset>,
    saver: Arc<dyn SaveCapability>,
    server: Arc<dyn ServerControl>,
    lifecycle: Arc<Lifecycle>,
    runtime: Handle,
    journal: Option<Arc<Journal>>,
    save_timeout: Option<Duration>,
}

impl ResetCoordinator {
    /// Coordinator that saves through `saver`, stops `server` and exits
    /// through `lifecycle`.
    ///
    /// The save task is spawned on `runtime`, so callers need not be inside
    /// a tokio context themselves.
    #[must_use]
    pub fn new(
        state: Arc<PendingReset>,
        saver: Arc<dyn SaveCapability>,
        server: Arc<dyn ServerControl>,
        lifecycle: Arc<Lifecycle>,
        runtime: Handle,
    ) -> Self {
        Self {
            state,
            saver,
            server,
            lifecycle,
            runtime,
            journal: None,
            save_timeout: None,
        }
    }

    /// Mirror every scheduled path into `journal`.
    #[must_use]
    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Give up on the save after `timeout`; `None` waits indefinitely.
    #[must_use]
    pub fn with_save_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.save_timeout = timeout;
        self
    }

    /// Shared pending-reset state.
    #[must_use]
    pub fn state(&self) -> &Arc<PendingReset> {
        &self.state
    }

    /// Queue `paths` for deletion and start the save-and-exit sequence.
    ///
    /// `None` is treated as an empty list; an empty reset still saves and
    /// exits. Never blocks on the save and never fails. A request that
    /// arrives after cleanup took the queued paths is not queued; its
    /// receipt has `accepted == false`.
    pub fn schedule_reset(&self, paths: Option<Vec<String>>) -> Scheduled {
        self.schedule_reset_paths(paths.unwrap_or_default())
    }

    /// Same as [`Self::schedule_reset`] for any iterator of paths.
    pub fn schedule_reset_paths<I, S>(&self, paths: I) -> Scheduled
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scheduled = self.state.schedule(paths);
        if !scheduled.accepted {
            warn!(
                reset_id = %scheduled.reset_id,
                "reset already finalizing; request dropped"
            );
            return scheduled;
        }
        info!(
            reset_id = %scheduled.reset_id,
            queued = scheduled.queued,
            "reset scheduled"
        );

        if let Some(ref journal) = self.journal {
            if let Err(err) = journal.record(&self.state) {
                error!(%err, reset_id = %scheduled.reset_id, "failed to write pending-reset journal");
            }
        }

        if scheduled.activated {
            let span = info_span!("reset_save", reset_id = %scheduled.reset_id);
            self.runtime.spawn(
                save_then_exit(
                    Arc::clone(&self.saver),
                    Arc::clone(&self.server),
                    Arc::clone(&self.lifecycle),
                    Arc::clone(&self.state),
                    self.save_timeout,
                )
                .instrument(span),
            );
        }

        scheduled
    }
}

async fn save_then_exit(
    saver: Arc<dyn SaveCapability>,
    server: Arc<dyn ServerControl>,
    lifecycle: Arc<Lifecycle>,
    state: Arc<PendingReset>,
    save_timeout: Option<Duration>,
) {
    state.set_phase(ResetPhase::Saving);
    info!("initiating save and quit sequence");

    let mut code = match run_save(saver, save_timeout).await {
        Ok(()) => {
            state.set_phase(ResetPhase::SaveSucceeded);
            info!("save complete; stopping server");
            EXIT_SAVED
        }
        Err(err) => {
            state.set_phase(ResetPhase::SaveFailed);
            error!(%err, "save failed; exiting anyway so the supervisor restarts the server");
            EXIT_SAVE_FAILED
        }
    };

    state.set_phase(ResetPhase::StoppingServer);
    match run_stop(server).await {
        Ok(()) => {
            state.set_phase(ResetPhase::ServerStopped);
            info!("game server stopped");
        }
        Err(err) => {
            state.set_phase(ResetPhase::StopFailed);
            error!(%err, "game server did not stop; queued files will be kept");
            if code == EXIT_SAVED {
                code = EXIT_STOP_FAILED;
            }
        }
    }

    state.set_phase(ResetPhase::Terminating);
    // Hooks do blocking file I/O and a real exit never returns.
    if let Err(err) = tokio::task::spawn_blocking(move || lifecycle.terminate(code)).await {
        error!(%err, "termination task failed");
    }
}

async fn run_save(saver: Arc<dyn SaveCapability>, save_timeout: Option<Duration>) -> Result<()> {
    let worker = tokio::task::spawn_blocking(move || saver.save(true));

    let joined = match save_timeout {
        Some(limit) => tokio::time::timeout(limit, worker).await.map_err(|_| {
            AppError::Save(format!("save did not finish within {limit:?}"))
        })?,
        None => worker.await,
    };

    joined.map_err(|err| AppError::Save(format!("save worker failed: {err}")))?
}

async fn run_stop(server: Arc<dyn ServerControl>) -> Result<()> {
    tokio::task::spawn_blocking(move || server.stop())
        .await
        .map_err(|err| AppError::Server(format!("stop worker failed: {err}")))?
}

impl std::fmt::Debug for ResetCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetCoordinator")
            .field("state", &self.state)
            .field("journal", &self.journal)
            .field("save_timeout", &self.save_timeout)
            .finish_non_exhaustive()
    }
}
