//! Directory enumeration and the periodic reconciliation loop.
//!
//! Live notifications can be coalesced or dropped by the OS, so every rule
//! also re-enumerates its source on a fixed interval and resubmits whatever
//! still matches. A failed sweep is logged and the loop waits for the next
//! tick.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::fs;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::dispatch::{Job, Submitter};
use crate::error::SweepError;
use crate::executor::Origin;
use crate::rule::ResolvedRule;
use crate::shutdown::{self, ShutdownRx};

/// List the entries directly inside the rule's source whose names match its
/// pattern. Directories are excluded. Entries that vanish while being listed
/// are skipped.
///
/// # Errors
///
/// Returns [`SweepError`] if the directory cannot be opened or read.
pub async fn scan(rule: &ResolvedRule) -> Result<Vec<PathBuf>, SweepError> {
    let sweep_error = |source| SweepError {
        path: rule.source.clone(),
        source,
    };

    let mut entries = fs::read_dir(&rule.source).await.map_err(sweep_error)?;
    let mut matches = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(sweep_error)? {
        if !rule.pattern.matches_name(&entry.file_name()) {
            continue;
        }
        match entry.file_type().await {
            Ok(kind) if kind.is_dir() => {}
            Ok(_) => matches.push(entry.path()),
            Err(e) => {
                debug!(path = %entry.path().display(), error = %e, "skipping unreadable entry");
            }
        }
    }

    matches.sort();
    Ok(matches)
}

/// Enumerate the rule's source and submit every match as a scan job.
///
/// Returns the number of submitted files.
///
/// # Errors
///
/// Returns [`SweepError`] if the directory cannot be enumerated.
pub async fn sweep(rule: &Arc<ResolvedRule>, submitter: &Submitter) -> Result<usize, SweepError> {
    let paths = scan(rule).await?;
    let mut submitted: usize = 0;

    for path in paths {
        let job = Job {
            rule: Arc::clone(rule),
            path,
            origin: Origin::Scan,
        };
        if !submitter.submit(job).await {
            break;
        }
        submitted = submitted.saturating_add(1);
    }

    Ok(submitted)
}

/// Re-sweep the rule's source every `interval` until shutdown.
///
/// The first sweep happens one full interval after start; the initial scan
/// done at watch registration covers start-up.
pub async fn run_reconciliation(
    rule: Arc<ResolvedRule>,
    submitter: Submitter,
    interval: Duration,
    mut shutdown: ShutdownRx,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Skip the first immediate tick.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            () = shutdown::requested(&mut shutdown) => break,
            _ = ticker.tick() => {
                match sweep(&rule, &submitter).await {
                    Ok(0) => debug!(rule = rule.index, "sweep found nothing"),
                    Ok(count) => info!(rule = rule.index, count, "sweep resubmitted files"),
                    Err(e) => debug!(rule = rule.index, error = %e, "sweep failed, retrying next interval"),
                }
            }
        }
    }

    debug!(rule = rule.index, "reconciliation stopped");
}
