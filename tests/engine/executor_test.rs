//! Tests for `src/executor.rs`.

use std::time::{Duration, Instant};

use filemover::config::FileAction;
use filemover::error::ExecutionError;
use filemover::executor::{execute, move_into, Origin, Outcome};
use filemover::shutdown;

use crate::common::{rule, touch};

#[tokio::test]
async fn delete_removes_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = touch(dir.path(), "a", "");
    let rule = rule(0, FileAction::Delete, dir.path(), None, "a", Duration::ZERO);
    let (_tx, mut rx) = shutdown::channel();

    let outcome = execute(&rule, &file, Origin::Event, &mut rx)
        .await
        .expect("delete");
    assert_eq!(outcome, Outcome::Deleted);
    assert!(!file.exists());
}

#[tokio::test]
async fn delete_of_vanished_file_reports_source_missing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let rule = rule(0, FileAction::Delete, dir.path(), None, "*", Duration::ZERO);
    let (_tx, mut rx) = shutdown::channel();

    let result = execute(&rule, &dir.path().join("gone"), Origin::Scan, &mut rx).await;
    assert!(matches!(result, Err(ExecutionError::SourceMissing(_))));
}

#[tokio::test]
async fn move_creates_destination_and_keeps_content() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("nested").join("out");
    let file = touch(dir.path(), "report.test", "contents");
    let rule = rule(0, FileAction::Move, dir.path(), Some(out.as_path()), "*.test", Duration::ZERO);
    let (_tx, mut rx) = shutdown::channel();

    let outcome = execute(&rule, &file, Origin::Event, &mut rx)
        .await
        .expect("move");

    let target = out.join("report.test");
    assert_eq!(outcome, Outcome::Moved(target.clone()));
    assert!(!file.exists(), "source should be gone");
    assert_eq!(std::fs::read_to_string(&target).expect("read"), "contents");
}

#[tokio::test]
async fn move_never_overwrites_an_existing_destination() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("out");
    std::fs::create_dir(&out).expect("mkdir");
    let existing = touch(&out, "x.test", "old");
    let file = touch(dir.path(), "x.test", "new");
    let rule = rule(0, FileAction::Move, dir.path(), Some(out.as_path()), "*.test", Duration::ZERO);
    let (_tx, mut rx) = shutdown::channel();

    let result = execute(&rule, &file, Origin::Scan, &mut rx).await;
    assert!(matches!(result, Err(ExecutionError::DestinationExists(_))));
    assert_eq!(std::fs::read_to_string(&existing).expect("read"), "old");
    assert_eq!(std::fs::read_to_string(&file).expect("read"), "new");
}

#[tokio::test]
async fn move_of_vanished_source_reports_source_missing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let result = move_into(&dir.path().join("missing"), &dir.path().join("out")).await;
    assert!(matches!(result, Err(ExecutionError::SourceMissing(_))));
}

#[tokio::test]
async fn event_moves_wait_for_the_delay() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("out");
    let file = touch(dir.path(), "slow.test", "data");
    let delay = Duration::from_millis(300);
    let rule = rule(0, FileAction::Move, dir.path(), Some(out.as_path()), "*.test", delay);
    let (_tx, mut rx) = shutdown::channel();

    let started = Instant::now();
    execute(&rule, &file, Origin::Event, &mut rx)
        .await
        .expect("move");
    assert!(started.elapsed() >= delay, "moved before the delay elapsed");
    assert!(out.join("slow.test").exists());
}

#[tokio::test]
async fn scan_moves_skip_the_delay() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("out");
    let file = touch(dir.path(), "old.test", "data");
    let rule = rule(
        0,
        FileAction::Move,
        dir.path(),
        Some(out.as_path()),
        "*.test",
        Duration::from_secs(60),
    );
    let (_tx, mut rx) = shutdown::channel();

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        execute(&rule, &file, Origin::Scan, &mut rx),
    )
    .await
    .expect("scan move should not wait");
    assert!(result.is_ok());
    assert!(out.join("old.test").exists());
}

#[tokio::test]
async fn cancellation_during_delay_prevents_the_move() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("out");
    let file = touch(dir.path(), "pending.test", "data");
    let rule = rule(
        0,
        FileAction::Move,
        dir.path(),
        Some(out.as_path()),
        "*.test",
        Duration::from_secs(60),
    );
    let (tx, rx) = shutdown::channel();

    let task_file = file.clone();
    let task = tokio::spawn(async move {
        let mut rx = rx;
        execute(&rule, &task_file, Origin::Event, &mut rx).await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(true).expect("send shutdown");

    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("cancellation should be prompt")
        .expect("task should not panic");
    assert!(matches!(result, Err(ExecutionError::Cancelled)));
    assert!(file.exists(), "file must stay in place");
    assert!(!out.join("pending.test").exists());
}
