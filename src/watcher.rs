//! Live filesystem watches, one per rule.
//!
//! A [`notify`] watcher is attached non-recursively to the rule's source.
//! Create and rename-destination events whose file name matches the pattern
//! are forwarded to the dispatcher. Right after the watch is live the source
//! is enumerated once, so files that were already present are handled too.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::dispatch::{Job, SubmitError, Submitter};
use crate::error::WatchError;
use crate::executor::Origin;
use crate::reconcile;
use crate::rule::ResolvedRule;

/// Live watch for one rule. Dropping it stops the notifications.
pub struct RuleWatch {
    rule: Arc<ResolvedRule>,
    /// Kept alive to maintain notifications.
    _watcher: RecommendedWatcher,
}

impl std::fmt::Debug for RuleWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleWatch")
            .field("rule", &self.rule.index)
            .field("source", &self.rule.source)
            .finish()
    }
}

impl RuleWatch {
    /// Attach a watcher to the rule's source directory.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::MissingSource`] if the source is not a directory
    /// and [`WatchError::Notify`] if the platform watcher fails.
    pub fn start(rule: Arc<ResolvedRule>, submitter: Submitter) -> Result<Self, WatchError> {
        if !rule.source.is_dir() {
            return Err(WatchError::MissingSource(rule.source.clone()));
        }

        // Some platforms report events under the canonical path
        // (e.g. /private/var on macOS for /var).
        let canonical = std::fs::canonicalize(&rule.source)
            .ok()
            .filter(|c| c != &rule.source);

        let notify_error = |source| WatchError::Notify {
            path: rule.source.clone(),
            source,
        };

        let callback_rule = Arc::clone(&rule);
        let mut watcher =
            notify::recommended_watcher(move |event: notify::Result<Event>| match event {
                Ok(evt) => {
                    for path in event_targets(&evt) {
                        if is_candidate(&callback_rule, canonical.as_deref(), path) {
                            forward(&callback_rule, &submitter, path.clone());
                        }
                    }
                }
                Err(e) => {
                    warn!(rule = callback_rule.index, error = %e, "watch error, relying on the next sweep");
                }
            })
            .map_err(notify_error)?;

        watcher
            .watch(&rule.source, RecursiveMode::NonRecursive)
            .map_err(notify_error)?;

        Ok(Self {
            rule,
            _watcher: watcher,
        })
    }

    /// The rule this watch serves.
    pub fn rule(&self) -> &Arc<ResolvedRule> {
        &self.rule
    }
}

/// Start the watch for `rule` and submit the files already present.
///
/// A failing initial scan is logged; the reconciliation loop will retry it.
///
/// # Errors
///
/// Returns [`WatchError`] if the watch cannot be established. No scan is
/// performed in that case.
pub async fn register(
    rule: Arc<ResolvedRule>,
    submitter: &Submitter,
) -> Result<RuleWatch, WatchError> {
    let watch = RuleWatch::start(Arc::clone(&rule), submitter.clone())?;

    match reconcile::sweep(&rule, submitter).await {
        Ok(count) => info!(rule = rule.index, existing = count, "initial scan complete"),
        Err(e) => warn!(rule = rule.index, error = %e, "initial scan failed"),
    }

    Ok(watch)
}

/// Paths of an event that name a newly created or renamed-in file.
pub fn event_targets(event: &Event) -> &[PathBuf] {
    match event.kind {
        EventKind::Create(_) => event.paths.as_slice(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.get(1..2).unwrap_or_default()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) => {
            event.paths.as_slice()
        }
        _ => &[],
    }
}

fn is_candidate(rule: &ResolvedRule, canonical: Option<&Path>, path: &Path) -> bool {
    if rule.accepts(path) {
        return true;
    }
    canonical.is_some_and(|root| path.parent() == Some(root) && rule.pattern.matches_path(path))
}

fn forward(rule: &Arc<ResolvedRule>, submitter: &Submitter, path: PathBuf) {
    debug!(rule = rule.index, path = %path.display(), "file event");
    let job = Job {
        rule: Arc::clone(rule),
        path,
        origin: Origin::Event,
    };
    match submitter.try_submit(job) {
        Ok(()) => {}
        Err(SubmitError::Full) => {
            warn!(rule = rule.index, "action queue full, event dropped until the next sweep");
        }
        Err(SubmitError::Closed) => {}
    }
}
