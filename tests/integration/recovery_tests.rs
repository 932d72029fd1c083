//! Pending-reset journal: written on schedule, cleared by the finalizer,
//! replayed on startup after an abrupt kill.

use std::sync::Arc;

use reset_zone::host::{FsRemover, SaveDirectory};
use reset_zone::lifecycle::Lifecycle;
use reset_zone::reset::coordinator::EXIT_SAVED;
use reset_zone::reset::recovery::recover_interrupted;
use reset_zone::reset::{Journal, PendingReset, ResetCoordinator, ShutdownFinalizer};
use tokio::sync::mpsc::unbounded_channel;

use super::test_helpers::{
    touch, ChannelExit, EventLog, RecordingSave, RecordingServer,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn journal_mirrors_schedule_and_is_cleared_after_cleanup() {
    let temp = tempfile::tempdir().expect("tempdir");
    let save_root = temp.path().join("save");
    let target = touch(&save_root, "map_7_7.bin");
    let journal = Arc::new(Journal::new(temp.path().join("state/pending.json")));
    let events = EventLog::default();
    let (saver, release) = RecordingSave::gated(events.clone());

    let (tx, mut exits) = unbounded_channel();
    let pending = Arc::new(PendingReset::new());
    let lifecycle = Arc::new(Lifecycle::new(Arc::new(ChannelExit(tx))));
    lifecycle.register(Arc::new(
        ShutdownFinalizer::new(
            Arc::clone(&pending),
            Arc::new(SaveDirectory::new(&save_root)),
            Arc::new(FsRemover),
        )
        .with_journal(Arc::clone(&journal)),
    ));
    let coordinator = ResetCoordinator::new(
        Arc::clone(&pending),
        Arc::new(saver),
        Arc::new(RecordingServer::new(events)),
        Arc::clone(&lifecycle),
        tokio::runtime::Handle::current(),
    )
    .with_journal(Arc::clone(&journal));

    let scheduled = coordinator.schedule_reset_paths(["map_7_7.bin"]);
    coordinator.schedule_reset_paths(["zpop_7_7.bin"]);

    let entry = journal.load().expect("journal readable").expect("journal written");
    assert_eq!(entry.reset_id, scheduled.reset_id);
    assert_eq!(entry.paths, vec!["map_7_7.bin", "zpop_7_7.bin"]);

    release.send(()).expect("release save");
    let code = tokio::time::timeout(std::time::Duration::from_secs(10), exits.recv())
        .await
        .expect("exit in time")
        .expect("exit code");

    assert_eq!(code, EXIT_SAVED);
    assert!(!target.exists());
    assert!(journal.load().expect("journal readable").is_none());

    let late = coordinator.schedule_reset_paths(["late_7_7.bin"]);
    assert!(!late.accepted);
    assert!(
        journal.load().expect("journal readable").is_none(),
        "a late request must not resurrect processed paths"
    );
}

#[test]
fn startup_recovery_completes_an_interrupted_reset() {
    let temp = tempfile::tempdir().expect("tempdir");
    let save_root = temp.path().join("save");
    let map = touch(&save_root, "map_8_8.bin");
    let keep = touch(&save_root, "players/db.bin");
    let journal = Journal::new(temp.path().join("pending.json"));

    // A previous run scheduled a reset and was killed before its hooks ran.
    let previous = PendingReset::new();
    previous.schedule(["map_8_8.bin", "chunkdata_8_8.bin"]);
    journal.record(&previous).expect("journal written");

    let report = recover_interrupted(&journal, &SaveDirectory::new(&save_root), &FsRemover)
        .expect("recovery")
        .expect("journal found");

    assert_eq!(report.deleted(), 1);
    assert_eq!(report.absent(), 1);
    assert!(!map.exists());
    assert!(keep.exists());
    assert!(journal.load().expect("journal readable").is_none());
}

#[test]
fn startup_recovery_without_journal_does_nothing() {
    let temp = tempfile::tempdir().expect("tempdir");
    let keep = touch(temp.path(), "map_9_9.bin");
    let journal = Journal::new(temp.path().join("pending.json"));

    let report = recover_interrupted(&journal, &SaveDirectory::new(temp.path()), &FsRemover)
        .expect("recovery");

    assert!(report.is_none());
    assert!(keep.exists());
}
