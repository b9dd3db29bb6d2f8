//! Tests for rule resolution.

use std::path::Path;
use std::time::Duration;

use filemover::config::{FileAction, Rule};
use filemover::error::ConfigError;
use filemover::rule::ResolvedRule;

fn rule(action: FileAction, source: &str, destination: Option<&str>, pattern: &str) -> Rule {
    Rule {
        action,
        source: source.to_owned(),
        destination: destination.map(str::to_owned),
        pattern: pattern.to_owned(),
        delay: Duration::ZERO,
    }
}

#[test]
fn resolve_expands_source_and_destination_once() {
    std::env::set_var("FILEMOVER_RULE_TEST", "/var/spool");
    let raw = rule(
        FileAction::Move,
        "${FILEMOVER_RULE_TEST}/in",
        Some("$FILEMOVER_RULE_TEST/out"),
        "*.test",
    );

    let resolved = ResolvedRule::resolve(2, &raw).expect("resolve");
    assert_eq!(resolved.index, 2);
    assert_eq!(resolved.source, Path::new("/var/spool/in"));
    assert_eq!(
        resolved.destination.as_deref(),
        Some(Path::new("/var/spool/out"))
    );

    // Changing the environment afterwards does not affect the resolved rule.
    std::env::set_var("FILEMOVER_RULE_TEST", "/elsewhere");
    assert_eq!(resolved.source, Path::new("/var/spool/in"));
}

#[cfg(not(windows))]
#[test]
fn resolve_rejects_bad_glob() {
    let raw = rule(FileAction::Delete, "/in", None, "dangling\\");
    let err = ResolvedRule::resolve(0, &raw).expect_err("should fail");
    assert!(matches!(err, ConfigError::Pattern { .. }));
}

#[test]
fn resolve_keeps_bracketed_names_literal() {
    let raw = rule(FileAction::Delete, "/in", None, "[tmp]*");
    let resolved = ResolvedRule::resolve(0, &raw).expect("resolve");
    assert!(resolved.accepts(Path::new("/in/[tmp]cache")));
    assert!(!resolved.accepts(Path::new("/in/tcache")));
}

#[test]
fn display_names_the_rule() {
    let mut raw = rule(FileAction::Move, "/in", Some("/out"), "*.log");
    raw.delay = Duration::from_secs(5);
    let resolved = ResolvedRule::resolve(1, &raw).expect("resolve");
    let shown = resolved.to_string();
    assert!(shown.starts_with("rule 1 (move *.log in /in -> /out"), "{shown}");
    assert!(shown.contains("after 5s"), "{shown}");
}
