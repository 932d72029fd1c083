//! Pending-reset state shared by the coordinator and the finalizer.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

/// Position of the process in the reset sequence.
///
/// There is no way back to [`ResetPhase::Idle`]: a reset consumes the rest
/// of the process lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetPhase {
    /// No reset requested.
    #[default]
    Idle,
    /// Reset requested; save task not started yet.
    ResetRequested,
    /// Host save in progress.
    Saving,
    /// Host save reported failure or missed its deadline.
    SaveFailed,
    /// Host save completed.
    SaveSucceeded,
    /// Waiting for the game server process to go away.
    StoppingServer,
    /// The game server process has exited.
    ServerStopped,
    /// The game server could not be stopped; its files must stay.
    StopFailed,
    /// Process exit initiated.
    Terminating,
    /// Finalizer is deleting queued files.
    CleaningUp,
    /// Cleanup finished; the process is about to exit.
    Exited,
}

/// Result of appending to the pending reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduled {
    /// Identifier of the reset event the paths joined.
    pub reset_id: Uuid,
    /// True for the call that activated the reset.
    pub activated: bool,
    /// False when the reset was already handed to cleanup and the paths
    /// were not queued.
    pub accepted: bool,
    /// Total number of queued paths after the append.
    pub queued: usize,
}

/// Point-in-time copy of the pending reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetSnapshot {
    /// Whether a reset has been requested.
    pub active: bool,
    /// Current phase.
    pub phase: ResetPhase,
    /// Reset identifier once active.
    pub reset_id: Option<Uuid>,
    /// Queued relative paths in insertion order.
    pub paths: Vec<String>,
    /// Whether cleanup has consumed the queued paths.
    pub finalized: bool,
}

/// Paths handed to the finalizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCleanup {
    /// Identifier of the reset being finalized.
    pub reset_id: Uuid,
    /// Relative paths to delete, in insertion order.
    pub paths: Vec<String>,
}

/// What the finalizer receives when it consumes the pending state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handoff {
    /// No reset pending, or it was already consumed.
    Nothing,
    /// A reset is pending but its save or the server stop has not
    /// finished; deleting now would race them.
    SaveInFlight(Uuid),
    /// The server could not be stopped; deleting would pull files from
    /// under a live process.
    ServerRunning(Uuid),
    /// Cleanup may proceed.
    Cleanup(PendingCleanup),
}

#[derive(Debug, Default)]
struct Inner {
    active: bool,
    consumed: bool,
    reset_id: Option<Uuid>,
    phase: ResetPhase,
    server_stopped: bool,
    paths: Vec<String>,
}

impl Inner {
    fn in_flight(&self) -> bool {
        self.active
            && !self.consumed
            && matches!(
                self.phase,
                ResetPhase::ResetRequested
                    | ResetPhase::Saving
                    | ResetPhase::SaveFailed
                    | ResetPhase::SaveSucceeded
                    | ResetPhase::StoppingServer
            )
    }
}

/// Pending-reset state for one process run.
///
/// Constructed once at bootstrap and shared (`Arc`) between the coordinator
/// and the finalizer. Dropped with the process; nothing here is persisted.
#[derive(Debug, Default)]
pub struct PendingReset {
    inner: Mutex<Inner>,
    phase_changed: Condvar,
}

impl PendingReset {
    /// Fresh, idle state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Shutdown must proceed even if a panicking thread poisoned the lock.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `paths` and mark the reset active.
    ///
    /// Once cleanup has consumed the pending paths nothing more can be
    /// deleted in this run; the receipt then has `accepted == false` and the
    /// paths are dropped.
    pub fn schedule<I, S>(&self, paths: I) -> Scheduled
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut inner = self.lock();
        if inner.consumed {
            return Scheduled {
                reset_id: inner.reset_id.unwrap_or_else(Uuid::nil),
                activated: false,
                accepted: false,
                queued: inner.paths.len(),
            };
        }

        inner.paths.extend(paths.into_iter().map(Into::into));

        let activated = !inner.active;
        inner.active = true;
        let reset_id = *inner.reset_id.get_or_insert_with(Uuid::new_v4);
        if activated {
            inner.phase = ResetPhase::ResetRequested;
        }

        Scheduled {
            reset_id,
            activated,
            accepted: true,
            queued: inner.paths.len(),
        }
    }

    /// Whether a reset has been requested.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> ResetPhase {
        self.lock().phase
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> ResetSnapshot {
        let inner = self.lock();
        ResetSnapshot {
            active: inner.active,
            phase: inner.phase,
            reset_id: inner.reset_id,
            paths: inner.paths.clone(),
            finalized: inner.consumed,
        }
    }

    /// Advance the reset phase.
    ///
    /// The coordinator's save task drives this; hosts running their own
    /// save sequence report progress through it as well.
    ///
    /// Entering [`ResetPhase::ServerStopped`] is what makes the queued
    /// paths eligible for cleanup.
    pub fn set_phase(&self, phase: ResetPhase) {
        let mut inner = self.lock();
        inner.phase = phase;
        if phase == ResetPhase::ServerStopped {
            inner.server_stopped = true;
        }
        drop(inner);
        self.phase_changed.notify_all();
    }

    /// Consume the pending paths for cleanup.
    ///
    /// Yields [`Handoff::Cleanup`] at most once per process run, and only
    /// after the server has stopped.
    #[must_use]
    pub fn take_for_cleanup(&self) -> Handoff {
        self.take_for_cleanup_within(Duration::ZERO)
    }

    /// Like [`Self::take_for_cleanup`], but first waits up to `wait` for an
    /// in-flight save and server stop to settle.
    #[must_use]
    pub fn take_for_cleanup_within(&self, wait: Duration) -> Handoff {
        let guard = self.lock();
        let (mut inner, _) = self
            .phase_changed
            .wait_timeout_while(guard, wait, |inner| inner.in_flight())
            .unwrap_or_else(PoisonError::into_inner);

        if !inner.active || inner.consumed {
            return Handoff::Nothing;
        }

        let reset_id = inner.reset_id.unwrap_or_else(Uuid::nil);
        if inner.in_flight() {
            return Handoff::SaveInFlight(reset_id);
        }
        if !inner.server_stopped {
            return Handoff::ServerRunning(reset_id);
        }

        inner.consumed = true;
        inner.phase = ResetPhase::CleaningUp;
        Handoff::Cleanup(PendingCleanup {
            reset_id,
            paths: inner.paths.clone(),
        })
    }
}
