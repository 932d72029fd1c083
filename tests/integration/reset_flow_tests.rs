//! End-to-end save → exit → cleanup sequences driven through the coordinator.

use std::time::Duration;

use reset_zone::reset::coordinator::{EXIT_SAVED, EXIT_SAVE_FAILED, EXIT_STOP_FAILED};
use reset_zone::reset::{PathStatus, ResetPhase};

use super::test_helpers::{
    touch, EventLog, Harness, RecordingRemover, RecordingSave, RecordingServer, SaveBehavior,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reset_saves_exits_and_deletes_both_files() {
    let temp = tempfile::tempdir().expect("tempdir");
    let players = touch(temp.path(), "players/db.bin");
    let chunk = touch(temp.path(), "map/chunk_12_4.bin");
    let events = EventLog::default();
    let saver = RecordingSave::new(events.clone(), SaveBehavior::Succeed);
    let mut harness = Harness::new(temp.path(), events, saver);

    harness.coordinator.schedule_reset(Some(vec![
        "players/db.bin".into(),
        "map/chunk_12_4.bin".into(),
    ]));

    assert_eq!(harness.wait_for_exit().await, EXIT_SAVED);
    assert!(!players.exists(), "players/db.bin should be deleted");
    assert!(!chunk.exists(), "map/chunk_12_4.bin should be deleted");
    assert_eq!(
        harness.events.with_prefix("save:start:"),
        vec!["blocking=true"]
    );

    let report = harness.report().expect("cleanup ran");
    assert_eq!(report.deleted(), 2);
    assert!(report.is_clean());
    assert_eq!(harness.pending.phase(), ResetPhase::Exited);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_deletion_happens_after_save_completes() {
    let temp = tempfile::tempdir().expect("tempdir");
    for name in ["a.bin", "b.bin", "c.bin"] {
        touch(temp.path(), name);
    }
    let events = EventLog::default();
    let saver = RecordingSave::new(events.clone(), SaveBehavior::Succeed);
    let mut harness = Harness::new(temp.path(), events, saver);

    harness
        .coordinator
        .schedule_reset_paths(["a.bin", "b.bin", "c.bin"]);
    harness.wait_for_exit().await;

    let saved_at = harness.events.position("save:done").expect("save recorded");
    let log = harness.events.events();
    let deletions: Vec<usize> = log
        .iter()
        .enumerate()
        .filter(|(_, e)| e.starts_with("delete:"))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(deletions.len(), 3);
    assert!(
        deletions.iter().all(|&i| i > saved_at),
        "deletions must follow the save: {log:?}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_is_stopped_after_save_and_before_any_deletion() {
    let temp = tempfile::tempdir().expect("tempdir");
    for name in ["map_1_2.bin", "zpop_1_2.bin"] {
        touch(temp.path(), name);
    }
    let events = EventLog::default();
    let saver = RecordingSave::new(events.clone(), SaveBehavior::Succeed);
    let mut harness = Harness::new(temp.path(), events, saver);

    harness
        .coordinator
        .schedule_reset_paths(["map_1_2.bin", "zpop_1_2.bin"]);
    assert_eq!(harness.wait_for_exit().await, EXIT_SAVED);

    let saved_at = harness.events.position("save:done").expect("save recorded");
    let stopped_at = harness.events.position("server:stop").expect("stop recorded");
    let first_delete = harness
        .events
        .events()
        .iter()
        .position(|e| e.starts_with("delete:"))
        .expect("deletions recorded");
    assert!(saved_at < stopped_at, "server stops after the save");
    assert!(stopped_at < first_delete, "nothing is deleted while the server runs");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_that_will_not_stop_keeps_its_files() {
    let temp = tempfile::tempdir().expect("tempdir");
    let target = touch(temp.path(), "map_6_6.bin");
    let events = EventLog::default();
    let saver = RecordingSave::new(events.clone(), SaveBehavior::Succeed);
    let remover = RecordingRemover::new(events.clone());
    let server = RecordingServer::stuck(events.clone());
    let mut harness = Harness::with_parts(temp.path(), events, saver, remover, server);

    harness.coordinator.schedule_reset_paths(["map_6_6.bin"]);

    assert_eq!(harness.wait_for_exit().await, EXIT_STOP_FAILED);
    assert!(target.exists(), "files of a live server must not be deleted");
    assert!(harness.events.with_prefix("delete:").is_empty());
    assert!(harness.report().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn request_after_cleanup_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    touch(temp.path(), "a.bin");
    let late = touch(temp.path(), "late.bin");
    let events = EventLog::default();
    let saver = RecordingSave::new(events.clone(), SaveBehavior::Succeed);
    let mut harness = Harness::new(temp.path(), events, saver);

    let first = harness.coordinator.schedule_reset_paths(["a.bin"]);
    harness.wait_for_exit().await;
    let receipt = harness.coordinator.schedule_reset_paths(["late.bin"]);

    assert!(!receipt.accepted);
    assert!(!receipt.activated);
    assert_eq!(receipt.reset_id, first.reset_id);
    assert_eq!(receipt.queued, 1);
    assert_eq!(harness.pending.snapshot().paths, vec!["a.bin"]);
    assert!(late.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_file_is_not_an_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let events = EventLog::default();
    let saver = RecordingSave::new(events.clone(), SaveBehavior::Succeed);
    let mut harness = Harness::new(temp.path(), events, saver);

    harness
        .coordinator
        .schedule_reset(Some(vec!["missing.bin".into()]));

    assert_eq!(harness.wait_for_exit().await, EXIT_SAVED);
    let report = harness.report().expect("cleanup ran");
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].status, PathStatus::Absent);
    assert!(report.is_clean());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_save_still_exits_and_cleans_up() {
    let temp = tempfile::tempdir().expect("tempdir");
    let zpop = touch(temp.path(), "zpop_10_12.bin");
    let events = EventLog::default();
    let saver = RecordingSave::new(events.clone(), SaveBehavior::Fail);
    let mut harness = Harness::new(temp.path(), events, saver);

    harness
        .coordinator
        .schedule_reset(Some(vec!["zpop_10_12.bin".into()]));

    assert_eq!(harness.wait_for_exit().await, EXIT_SAVE_FAILED);
    assert!(!zpop.exists(), "pending paths are cleaned even after a failed save");
    assert!(harness.events.position("save:failed").is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_save_still_exits_with_failure() {
    let temp = tempfile::tempdir().expect("tempdir");
    let target = touch(temp.path(), "map_1_1.bin");
    let events = EventLog::default();
    let saver = RecordingSave::new(events.clone(), SaveBehavior::Panic);
    let mut harness = Harness::new(temp.path(), events, saver);

    harness
        .coordinator
        .schedule_reset(Some(vec!["map_1_1.bin".into()]));

    assert_eq!(harness.wait_for_exit().await, EXIT_SAVE_FAILED);
    assert!(!target.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn save_deadline_turns_a_hung_save_into_failure() {
    let temp = tempfile::tempdir().expect("tempdir");
    let target = touch(temp.path(), "map_2_2.bin");
    let events = EventLog::default();
    let saver = RecordingSave::new(
        events.clone(),
        SaveBehavior::Hang(Duration::from_millis(800)),
    );
    let mut harness = Harness::new(temp.path(), events, saver);
    harness.coordinator = harness
        .coordinator
        .with_save_timeout(Some(Duration::from_millis(50)));

    harness
        .coordinator
        .schedule_reset(Some(vec!["map_2_2.bin".into()]));

    assert_eq!(harness.wait_for_exit().await, EXIT_SAVE_FAILED);
    assert!(!target.exists());
    assert!(
        harness.events.position("save:done").is_none(),
        "exit must not wait for the hung save"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_reset_still_saves_and_exits() {
    let temp = tempfile::tempdir().expect("tempdir");
    let events = EventLog::default();
    let saver = RecordingSave::new(events.clone(), SaveBehavior::Succeed);
    let mut harness = Harness::new(temp.path(), events, saver);

    let scheduled = harness.coordinator.schedule_reset(None);

    assert!(scheduled.activated);
    assert_eq!(scheduled.queued, 0);
    assert!(harness.pending.is_active());
    assert_eq!(harness.wait_for_exit().await, EXIT_SAVED);
    assert!(harness.events.position("save:done").is_some());
    let report = harness.report().expect("cleanup ran for an empty reset");
    assert!(report.outcomes.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn schedule_returns_before_save_completes() {
    let temp = tempfile::tempdir().expect("tempdir");
    let events = EventLog::default();
    let (saver, release) = RecordingSave::gated(events.clone());
    let mut harness = Harness::new(temp.path(), events, saver);

    harness
        .coordinator
        .schedule_reset(Some(vec!["map_3_3.bin".into()]));

    assert!(harness.still_running(), "caller must not wait for the save");
    assert!(matches!(
        harness.pending.phase(),
        ResetPhase::ResetRequested | ResetPhase::Saving
    ));

    release.send(()).expect("release save");
    assert_eq!(harness.wait_for_exit().await, EXIT_SAVED);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeated_requests_accumulate_under_one_save() {
    let temp = tempfile::tempdir().expect("tempdir");
    for name in ["a.bin", "b.bin", "c.bin"] {
        touch(temp.path(), name);
    }
    let events = EventLog::default();
    let (saver, release) = RecordingSave::gated(events.clone());
    let mut harness = Harness::new(temp.path(), events, saver);

    let first = harness.coordinator.schedule_reset_paths(["a.bin", "b.bin"]);
    let second = harness.coordinator.schedule_reset_paths(["b.bin", "c.bin"]);
    let third = harness.coordinator.schedule_reset(None);

    assert!(first.activated);
    assert!(!second.activated);
    assert!(!third.activated);
    assert_eq!(first.reset_id, second.reset_id);
    assert_eq!(third.queued, 4);

    release.send(()).expect("release save");
    assert_eq!(harness.wait_for_exit().await, EXIT_SAVED);

    assert_eq!(harness.events.with_prefix("save:start:").len(), 1);
    assert_eq!(
        harness.events.with_prefix("delete:"),
        vec!["a.bin", "b.bin", "b.bin", "c.bin"]
    );
    let report = harness.report().expect("cleanup ran");
    assert_eq!(report.deleted(), 3);
    assert_eq!(report.absent(), 1, "second b.bin attempt finds it gone");
    assert!(report.is_clean());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cleanup_runs_only_once_even_if_terminated_again() {
    let temp = tempfile::tempdir().expect("tempdir");
    touch(temp.path(), "a.bin");
    let events = EventLog::default();
    let saver = RecordingSave::new(events.clone(), SaveBehavior::Succeed);
    let mut harness = Harness::new(temp.path(), events, saver);

    harness.coordinator.schedule_reset_paths(["a.bin"]);
    harness.wait_for_exit().await;

    let lifecycle = std::sync::Arc::clone(&harness.lifecycle);
    tokio::task::spawn_blocking(move || lifecycle.terminate(0))
        .await
        .expect("second terminate");

    assert_eq!(harness.events.with_prefix("delete:").len(), 1);
}
