//! Tests for `src/logging.rs`.

use filemover::logging::{default_directives, LoggingGuard};
use tracing_subscriber::EnvFilter;

#[test]
fn logging_guard_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<LoggingGuard>();
}

#[test]
fn default_directives_parse() {
    for verbose in [false, true] {
        let directives = default_directives(verbose);
        assert!(
            EnvFilter::try_new(directives).is_ok(),
            "invalid directives: {directives}"
        );
        assert!(directives.contains("notify=warn"));
    }
}

#[test]
fn verbose_surfaces_engine_debug_events() {
    assert!(default_directives(true).contains("filemover=debug"));
    assert!(!default_directives(false).contains("debug"));
}

#[test]
fn init_with_log_dir_creates_it() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let logs_dir = tmp.path().join("logs");
    assert!(!logs_dir.exists());

    // The global subscriber can only be installed once per process, so the
    // result may be an error; the directory is created either way.
    let _result = filemover::logging::init(Some(&logs_dir), false);
    assert!(logs_dir.exists(), "logs directory should be created");
}

#[test]
fn second_init_reports_an_error() {
    let _first = filemover::logging::init(None, false);
    assert!(filemover::logging::init(None, true).is_err());
}
