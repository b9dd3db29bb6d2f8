//! Shared fixtures for engine tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use filemover::config::{EngineConfig, FileAction, Rule};
use filemover::rule::ResolvedRule;

/// Build and resolve a rule over real directories.
pub fn rule(
    index: usize,
    action: FileAction,
    source: &Path,
    destination: Option<&Path>,
    pattern: &str,
    delay: Duration,
) -> Arc<ResolvedRule> {
    let raw = Rule {
        action,
        source: source.display().to_string(),
        destination: destination.map(|d| d.display().to_string()),
        pattern: pattern.to_owned(),
        delay,
    };
    Arc::new(ResolvedRule::resolve(index, &raw).expect("resolve rule"))
}

/// Engine settings with a short shutdown grace period.
pub fn engine() -> EngineConfig {
    EngineConfig {
        shutdown_grace_secs: 1,
        ..EngineConfig::default()
    }
}

/// Create a file with the given contents and return its path.
pub fn touch(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write file");
    path
}

/// Poll `condition` every 25ms until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now()
        .checked_add(timeout)
        .expect("deadline");
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

/// Sorted relative paths of every file under `root`.
pub fn list_files(root: &Path) -> Vec<String> {
    let mut out = Vec::new();
    collect(root, root, &mut out);
    out.sort();
    out
}

fn collect(root: &Path, dir: &Path, out: &mut Vec<String>) {
    for entry in std::fs::read_dir(dir).expect("read dir") {
        let path = entry.expect("dir entry").path();
        if path.is_dir() {
            collect(root, &path, out);
        } else {
            let relative = path.strip_prefix(root).expect("strip prefix");
            out.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
}
