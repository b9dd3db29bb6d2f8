//! Top-level supervisor: owns every watch and reconciliation loop.
//!
//! Each rule moves through `Registered -> Watching -> Stopped`. A rule whose
//! watch cannot be established stays `Registered`: its reconciliation loop
//! still runs, so files are picked up once the source appears, but no live
//! events are delivered for it.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::dispatch::{self, ActionCounts};
use crate::reconcile;
use crate::rule::ResolvedRule;
use crate::shutdown::{self, ShutdownRx};
use crate::watcher::{self, RuleWatch};

/// Lifecycle state of a single rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    /// Resolved and sweeping, but without a live watch.
    Registered,
    /// Live watch established.
    Watching,
    /// Shut down.
    Stopped,
}

/// Everything the supervisor owns for one rule.
#[derive(Debug)]
struct RuleHandle {
    rule: Arc<ResolvedRule>,
    watch: Option<RuleWatch>,
    sweeper: JoinHandle<()>,
    state: RuleState,
}

/// Summary returned when the supervisor stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Rules that were resolved and started.
    pub rules: usize,
    /// Rules that reached [`RuleState::Watching`].
    pub watching: usize,
    /// Rules whose live watch could not be established.
    pub watch_failures: usize,
    /// Final dispatcher counters.
    pub actions: ActionCounts,
}

/// Runs all rules of a configuration until shutdown.
#[derive(Debug)]
pub struct Supervisor {
    config: Config,
}

impl Supervisor {
    /// Create a supervisor for a loaded, validated configuration.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Register every rule, then run until `shutdown` fires.
    ///
    /// Rules are registered in configuration order. A rule that fails to
    /// resolve or to watch is reported and does not affect the others.
    ///
    /// # Errors
    ///
    /// Returns an error only if the dispatcher task itself fails.
    pub async fn run(self, mut shutdown: ShutdownRx) -> anyhow::Result<RunReport> {
        let engine = &self.config.engine;
        let (submitter, dispatcher) = dispatch::queue(engine);
        let dispatcher_task = tokio::spawn(dispatcher.run(shutdown.clone()));

        let mut handles: Vec<RuleHandle> = Vec::with_capacity(self.config.rules.len());
        let mut report = RunReport::default();

        for (index, raw) in self.config.rules.iter().enumerate() {
            if shutdown::is_requested(&shutdown) {
                break;
            }

            let rule = match ResolvedRule::resolve(index, raw) {
                Ok(rule) => Arc::new(rule),
                Err(e) => {
                    warn!(rule = index, error = %e, "skipping rule");
                    continue;
                }
            };

            let (watch, state) = match watcher::register(Arc::clone(&rule), &submitter).await {
                Ok(watch) => (Some(watch), RuleState::Watching),
                Err(e) => {
                    warn!(rule = index, error = %e, "cannot watch source, relying on periodic sweeps");
                    report.watch_failures = report.watch_failures.saturating_add(1);
                    (None, RuleState::Registered)
                }
            };

            let sweeper = tokio::spawn(reconcile::run_reconciliation(
                Arc::clone(&rule),
                submitter.clone(),
                engine.sweep_interval(),
                shutdown.clone(),
            ));

            info!(%rule, state = ?state, "rule registered");
            handles.push(RuleHandle {
                rule,
                watch,
                sweeper,
                state,
            });
        }

        report.rules = handles.len();
        report.watching = handles
            .iter()
            .filter(|h| h.state == RuleState::Watching)
            .count();
        info!(
            rules = report.rules,
            watching = report.watching,
            "file mover running"
        );

        shutdown::requested(&mut shutdown).await;
        info!("stopping rules");

        for handle in &mut handles {
            // Dropping the watcher detaches it from the OS.
            handle.watch = None;
            if let Err(e) = (&mut handle.sweeper).await {
                warn!(rule = handle.rule.index, error = %e, "reconciliation task failed");
            }
            handle.state = RuleState::Stopped;
        }
        drop(submitter);

        report.actions = dispatcher_task
            .await
            .map_err(|e| anyhow::anyhow!("dispatcher task failed: {e}"))?;

        info!(
            rules = report.rules,
            moved = report.actions.moved,
            deleted = report.actions.deleted,
            failed = report.actions.failed,
            cancelled = report.actions.cancelled,
            "file mover stopped"
        );
        Ok(report)
    }
}

/// Enumerate every rule's source once, act on all matches, and return.
///
/// No watches are created and no delays apply. `shutdown` aborts pending
/// actions.
///
/// # Errors
///
/// Returns an error only if the dispatcher task itself fails.
pub async fn sweep_once(config: &Config, shutdown: ShutdownRx) -> anyhow::Result<ActionCounts> {
    let (submitter, dispatcher) = dispatch::queue(&config.engine);
    let dispatcher_task = tokio::spawn(dispatcher.run(shutdown));

    for (index, raw) in config.rules.iter().enumerate() {
        let rule = match ResolvedRule::resolve(index, raw) {
            Ok(rule) => Arc::new(rule),
            Err(e) => {
                warn!(rule = index, error = %e, "skipping rule");
                continue;
            }
        };
        match reconcile::sweep(&rule, &submitter).await {
            Ok(count) => info!(%rule, count, "swept"),
            Err(e) => warn!(%rule, error = %e, "sweep failed"),
        }
    }
    drop(submitter);

    dispatcher_task
        .await
        .map_err(|e| anyhow::anyhow!("dispatcher task failed: {e}"))
}
