//! End-to-end tests for `src/supervisor.rs`.

use std::time::Duration;

use filemover::config::{Config, EngineConfig, FileAction, Rule};
use filemover::shutdown;
use filemover::supervisor::{sweep_once, Supervisor};

use crate::common::{engine, list_files, touch, wait_until};

fn raw_rule(action: FileAction, source: &str, destination: Option<&str>, pattern: &str) -> Rule {
    Rule {
        action,
        source: source.to_owned(),
        destination: destination.map(str::to_owned),
        pattern: pattern.to_owned(),
        delay: Duration::ZERO,
    }
}

fn config(rules: Vec<Rule>) -> Config {
    Config {
        rules,
        engine: engine(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn moves_and_deletes_files_from_a_watched_directory() {
    let root = tempfile::tempdir().expect("tempdir");
    let source = root.path().display().to_string();
    let destination = root.path().join("dst").display().to_string();

    for name in ["a", "b", "other", "test.test"] {
        touch(root.path(), name, name);
    }

    let config = config(vec![
        raw_rule(FileAction::Move, &source, Some(&destination), "*.test"),
        raw_rule(FileAction::Delete, &source, None, "a"),
        raw_rule(FileAction::Delete, &source, None, "b"),
    ]);

    let (tx, rx) = shutdown::channel();
    let running = tokio::spawn(Supervisor::new(config).run(rx));

    let expected = vec!["dst/test.test".to_owned(), "other".to_owned()];
    assert!(
        wait_until(Duration::from_secs(5), || list_files(root.path()) == expected).await,
        "unexpected tree: {:?}",
        list_files(root.path())
    );

    tx.send(true).expect("send shutdown");
    let report = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("supervisor should stop")
        .expect("supervisor task")
        .expect("supervisor run");

    assert_eq!(report.rules, 3);
    assert_eq!(report.watching, 3);
    assert_eq!(report.watch_failures, 0);
    assert_eq!(report.actions.moved, 1);
    assert_eq!(report.actions.deleted, 2);
    assert_eq!(list_files(root.path()), expected);
    assert_eq!(
        std::fs::read_to_string(root.path().join("dst").join("test.test")).expect("read"),
        "test.test"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn a_rule_without_source_does_not_stop_the_others() {
    let root = tempfile::tempdir().expect("tempdir");
    let missing = root.path().join("absent").display().to_string();
    let present = root.path().join("inbox");
    std::fs::create_dir(&present).expect("mkdir");

    let config = config(vec![
        raw_rule(FileAction::Delete, &missing, None, "*"),
        raw_rule(FileAction::Delete, &present.display().to_string(), None, "*.tmp"),
    ]);

    let (tx, rx) = shutdown::channel();
    let running = tokio::spawn(Supervisor::new(config).run(rx));

    // Give registration a moment before creating the file.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let file = touch(&present, "scratch.tmp", "");
    assert!(
        wait_until(Duration::from_secs(5), || !file.exists()).await,
        "second rule did not act"
    );

    tx.send(true).expect("send shutdown");
    let report = running
        .await
        .expect("supervisor task")
        .expect("supervisor run");

    assert_eq!(report.rules, 2);
    assert_eq!(report.watching, 1);
    assert_eq!(report.watch_failures, 1);
    assert_eq!(report.actions.deleted, 1);
}

#[tokio::test]
async fn shutdown_before_start_registers_nothing() {
    let root = tempfile::tempdir().expect("tempdir");
    let file = touch(root.path(), "a", "");
    let config = config(vec![raw_rule(
        FileAction::Delete,
        &root.path().display().to_string(),
        None,
        "a",
    )]);

    let (tx, rx) = shutdown::channel();
    tx.send(true).expect("send shutdown");
    let report = Supervisor::new(config).run(rx).await.expect("run");

    assert_eq!(report.rules, 0);
    assert!(file.exists());
}

#[tokio::test]
async fn sweep_once_applies_every_rule_and_returns() {
    let root = tempfile::tempdir().expect("tempdir");
    let source = root.path().join("in");
    let out = root.path().join("out");
    std::fs::create_dir(&source).expect("mkdir");
    touch(&source, "one.test", "1");
    touch(&source, "two.test", "2");
    touch(&source, "junk.tmp", "");
    touch(&source, "keep.txt", "");

    let mut slow_move = raw_rule(
        FileAction::Move,
        &source.display().to_string(),
        Some(&out.display().to_string()),
        "*.test",
    );
    // Sweeps act immediately regardless of the delay.
    slow_move.delay = Duration::from_secs(3_600);

    let config = Config {
        rules: vec![
            slow_move,
            raw_rule(FileAction::Delete, &source.display().to_string(), None, "*.tmp"),
            raw_rule(FileAction::Delete, &root.path().join("gone").display().to_string(), None, "*"),
        ],
        engine: EngineConfig::default(),
    };

    let (_tx, rx) = shutdown::channel();
    let counts = tokio::time::timeout(Duration::from_secs(5), sweep_once(&config, rx))
        .await
        .expect("sweep should finish")
        .expect("sweep");

    assert_eq!(counts.moved, 2);
    assert_eq!(counts.deleted, 1);
    assert_eq!(
        list_files(root.path()),
        vec!["in/keep.txt", "out/one.test", "out/two.test"]
    );
}
