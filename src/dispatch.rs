//! Bounded worker pool between watchers and the rule executor.
//!
//! Watch callbacks and sweeps push [`Job`]s into a bounded queue through a
//! [`Submitter`]. A single [`Dispatcher`] task drains the queue and runs each
//! job on a `JoinSet`. The semaphore bounds filesystem work only: a delayed
//! move sleeps without a permit and takes one when its delay is over. A job
//! whose `(rule, path)` key is already in flight is dropped before it waits
//! for anything, so a live event and a sweep racing on the same file do not
//! both act on it.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, FileAction};
use crate::error::ExecutionError;
use crate::executor::{self, Origin, Outcome};
use crate::rule::ResolvedRule;
use crate::shutdown::{self, ShutdownRx};

/// One file to act on.
#[derive(Debug, Clone)]
pub struct Job {
    /// Rule that matched the file.
    pub rule: Arc<ResolvedRule>,
    /// Path of the matched file.
    pub path: PathBuf,
    /// Whether the file came from a live event or a scan.
    pub origin: Origin,
}

type JobKey = (usize, PathBuf);

impl Job {
    fn key(&self) -> JobKey {
        (self.rule.index, self.path.clone())
    }
}

/// Why a non-blocking submission was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// The queue is at capacity.
    Full,
    /// The dispatcher has stopped.
    Closed,
}

/// Cloneable handle used to enqueue jobs.
#[derive(Debug, Clone)]
pub struct Submitter {
    tx: mpsc::Sender<Job>,
}

impl Submitter {
    /// Enqueue a job, waiting for queue capacity.
    ///
    /// Returns `false` if the dispatcher has stopped.
    pub async fn submit(&self, job: Job) -> bool {
        self.tx.send(job).await.is_ok()
    }

    /// Enqueue a job without waiting. Used from watcher callbacks, which run
    /// on the platform watcher's own thread.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Full`] when the queue is at capacity and
    /// [`SubmitError::Closed`] when the dispatcher has stopped.
    pub fn try_submit(&self, job: Job) -> Result<(), SubmitError> {
        self.tx.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => SubmitError::Full,
            TrySendError::Closed(_) => SubmitError::Closed,
        })
    }
}

/// Counters for every job the dispatcher handled.
#[derive(Debug, Default)]
struct ActionStats {
    moved: AtomicU64,
    deleted: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    duplicates: AtomicU64,
}

impl ActionStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ActionCounts {
        ActionCounts {
            moved: self.moved.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of the dispatcher's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionCounts {
    /// Files moved.
    pub moved: u64,
    /// Files deleted.
    pub deleted: u64,
    /// Paths left alone because they were not regular files.
    pub skipped: u64,
    /// Actions that failed.
    pub failed: u64,
    /// Actions aborted by shutdown.
    pub cancelled: u64,
    /// Submissions dropped because the same file was already in flight.
    pub duplicates: u64,
}

/// Removes a key from the in-flight set when the job ends, including when
/// the task is aborted.
struct InFlightGuard {
    key: Option<JobKey>,
    set: Arc<Mutex<HashSet<JobKey>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let (Some(key), Ok(mut set)) = (self.key.take(), self.set.lock()) {
            set.remove(&key);
        }
    }
}

/// Queue consumer that runs jobs on a bounded worker pool.
#[derive(Debug)]
pub struct Dispatcher {
    rx: mpsc::Receiver<Job>,
    permits: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<JobKey>>>,
    stats: Arc<ActionStats>,
    grace: Duration,
}

/// Create a connected submitter/dispatcher pair sized from `engine`.
pub fn queue(engine: &EngineConfig) -> (Submitter, Dispatcher) {
    let (tx, rx) = mpsc::channel(engine.queue_capacity.max(1));
    let dispatcher = Dispatcher {
        rx,
        permits: Arc::new(Semaphore::new(engine.max_concurrent_actions.max(1))),
        in_flight: Arc::new(Mutex::new(HashSet::new())),
        stats: Arc::new(ActionStats::default()),
        grace: engine.shutdown_grace(),
    };
    (Submitter { tx }, dispatcher)
}

/// How a spawned job gets its worker slot.
enum Slot {
    /// Taken by the dispatcher before spawning.
    Held(OwnedSemaphorePermit),
    /// Taken by the job itself once the delay has elapsed, so sleeping moves
    /// never occupy the pool.
    AfterDelay(Duration),
}

impl Dispatcher {
    /// Run until shutdown is requested or every [`Submitter`] is dropped.
    ///
    /// On shutdown, running jobs get the configured grace period before they
    /// are aborted. When the queue simply closes, all running jobs are
    /// awaited. Returns the final counters.
    pub async fn run(mut self, mut shutdown: ShutdownRx) -> ActionCounts {
        let mut tasks = JoinSet::new();
        let mut cancelled = false;

        loop {
            tokio::select! {
                biased;
                () = shutdown::requested(&mut shutdown) => {
                    cancelled = true;
                    break;
                }
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    log_join(result);
                }
                job = self.rx.recv() => {
                    let Some(job) = job else { break };
                    let Some(guard) = self.claim(&job) else { continue };
                    let slot = match executor::pending_delay(&job.rule, job.origin) {
                        Some(delay) => Slot::AfterDelay(delay),
                        None => match self.acquire(&mut shutdown).await {
                            Some(permit) => Slot::Held(permit),
                            None => {
                                cancelled = true;
                                break;
                            }
                        },
                    };
                    self.spawn(job, guard, slot, &mut tasks, &shutdown);
                }
            }
        }

        self.rx.close();
        let grace = if cancelled { Some(self.grace) } else { None };
        drain(&mut tasks, grace).await;

        let counts = self.stats.snapshot();
        debug!(?counts, "dispatcher stopped");
        counts
    }

    async fn acquire(&self, shutdown: &mut ShutdownRx) -> Option<OwnedSemaphorePermit> {
        acquire_permit(&self.permits, shutdown).await
    }

    /// Mark the job's key as in flight, or drop the job if it already is.
    fn claim(&self, job: &Job) -> Option<InFlightGuard> {
        let key = job.key();
        let inserted = match self.in_flight.lock() {
            Ok(mut set) => set.insert(key.clone()),
            Err(_) => true,
        };
        if !inserted {
            debug!(rule = job.rule.index, path = %job.path.display(), "already in flight, dropping duplicate");
            ActionStats::bump(&self.stats.duplicates);
            return None;
        }
        Some(InFlightGuard {
            key: Some(key),
            set: Arc::clone(&self.in_flight),
        })
    }

    fn spawn(
        &self,
        job: Job,
        guard: InFlightGuard,
        slot: Slot,
        tasks: &mut JoinSet<()>,
        shutdown: &ShutdownRx,
    ) {
        let stats = Arc::clone(&self.stats);
        let permits = Arc::clone(&self.permits);
        let mut shutdown = shutdown.clone();

        tasks.spawn(async move {
            let _guard = guard;
            let result = run_job(&job, slot, &permits, &mut shutdown).await;
            report(&job, result, &stats);
        });
    }
}

/// Wait out the job's delay if it has one, then act while holding a permit.
async fn run_job(
    job: &Job,
    slot: Slot,
    permits: &Arc<Semaphore>,
    shutdown: &mut ShutdownRx,
) -> Result<Outcome, ExecutionError> {
    let _permit = match slot {
        Slot::Held(permit) => permit,
        Slot::AfterDelay(delay) => {
            debug!(rule = job.rule.index, path = %job.path.display(), ?delay, "delaying move");
            executor::wait_or_cancel(delay, shutdown).await?;
            acquire_permit(permits, shutdown)
                .await
                .ok_or(ExecutionError::Cancelled)?
        }
    };
    executor::apply(&job.rule, &job.path).await
}

async fn acquire_permit(
    permits: &Arc<Semaphore>,
    shutdown: &mut ShutdownRx,
) -> Option<OwnedSemaphorePermit> {
    tokio::select! {
        biased;
        () = shutdown::requested(shutdown) => None,
        permit = Arc::clone(permits).acquire_owned() => permit.ok(),
    }
}

/// Log the outcome of a job and update counters. Failures stop here.
fn report(job: &Job, result: Result<Outcome, ExecutionError>, stats: &ActionStats) {
    let rule = job.rule.index;
    let path = job.path.display();
    match result {
        Ok(Outcome::Moved(target)) => {
            info!(rule, from = %path, to = %target.display(), "moved file");
            ActionStats::bump(&stats.moved);
        }
        Ok(Outcome::Deleted) => {
            info!(rule, path = %path, "deleted file");
            ActionStats::bump(&stats.deleted);
        }
        Ok(Outcome::Skipped) => {
            debug!(rule, path = %path, "not a regular file, skipped");
            ActionStats::bump(&stats.skipped);
        }
        Err(ExecutionError::Cancelled) => {
            debug!(rule, path = %path, "action cancelled by shutdown");
            ActionStats::bump(&stats.cancelled);
        }
        // Deletes are best-effort, and a vanished source means another
        // attempt already handled the file.
        Err(e)
            if job.rule.action == FileAction::Delete
                || matches!(e, ExecutionError::SourceMissing(_)) =>
        {
            debug!(rule, path = %path, error = %e, "action failed (ignored)");
            ActionStats::bump(&stats.failed);
        }
        Err(e) => {
            warn!(rule, path = %path, error = %e, "cannot move the file");
            ActionStats::bump(&stats.failed);
        }
    }
}

async fn drain(tasks: &mut JoinSet<()>, grace: Option<Duration>) {
    let wait_all = async {
        while let Some(result) = tasks.join_next().await {
            log_join(result);
        }
    };

    match grace {
        None => wait_all.await,
        Some(grace) => {
            if tokio::time::timeout(grace, wait_all).await.is_err() {
                warn!(
                    remaining = tasks.len(),
                    "shutdown grace period exceeded, aborting running actions"
                );
                tasks.abort_all();
                while tasks.join_next().await.is_some() {}
            }
        }
    }
}

fn log_join(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            warn!(error = %e, "file action panicked");
        }
    }
}
