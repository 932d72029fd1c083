//! Two-phase graceful reset.
//!
//! The [`coordinator`] records reset requests and starts save-then-exit.
//! The [`finalizer`] runs during termination and deletes the queued files.
//! Both share one [`state::PendingReset`] created at bootstrap.

pub mod coordinator;
pub mod finalizer;
pub mod journal;
pub mod recovery;
pub mod state;

pub use coordinator::ResetCoordinator;
pub use finalizer::{CleanupReport, PathOutcome, PathStatus, ShutdownFinalizer};
pub use journal::{Journal, JournalEntry};
pub use state::{PendingReset, ResetPhase, ResetSnapshot, Scheduled};
