//! Applies a resolved rule to a single file.
//!
//! Delete rules remove the file. Move rules optionally wait, then move the
//! file into the destination directory without ever overwriting an existing
//! file: a hard link is created at the destination and the source unlinked,
//! falling back to copying into a `create_new` destination when hard links
//! are unavailable (different volume, filesystem without link support).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;
use tracing::debug;

use crate::config::FileAction;
use crate::error::ExecutionError;
use crate::rule::ResolvedRule;
use crate::shutdown::{self, ShutdownRx};

/// Where a file submission came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// A live create or rename notification. Subject to the rule's delay.
    Event,
    /// The initial scan or a reconciliation sweep. Acted on immediately.
    Scan,
}

/// Result of a successful execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The file was moved to the contained path.
    Moved(PathBuf),
    /// The file was deleted.
    Deleted,
    /// The path is not a regular file and was left alone.
    Skipped,
}

/// Apply `rule` to `path`, waiting out the rule's delay first when
/// [`pending_delay`] asks for it.
///
/// # Errors
///
/// Returns [`ExecutionError::Cancelled`] when shutdown interrupts the delay,
/// and the other [`ExecutionError`] variants when the filesystem operation
/// fails. Nothing is retried.
pub async fn execute(
    rule: &ResolvedRule,
    path: &Path,
    origin: Origin,
    shutdown: &mut ShutdownRx,
) -> Result<Outcome, ExecutionError> {
    if let Some(delay) = pending_delay(rule, origin) {
        debug!(rule = rule.index, path = %path.display(), ?delay, "delaying move");
        wait_or_cancel(delay, shutdown).await?;
    }
    apply(rule, path).await
}

/// The wait owed before acting on a file: only moves triggered by a live
/// event, and only when the rule has a non-zero delay.
pub fn pending_delay(rule: &ResolvedRule, origin: Origin) -> Option<Duration> {
    let delayed = rule.action == FileAction::Move && origin == Origin::Event;
    (delayed && !rule.delay.is_zero()).then_some(rule.delay)
}

/// Perform the rule's action on `path` immediately.
///
/// Paths that are not regular files are skipped.
///
/// # Errors
///
/// Returns [`ExecutionError::SourceMissing`] if `path` is gone and the other
/// [`ExecutionError`] variants when the filesystem operation fails.
pub async fn apply(rule: &ResolvedRule, path: &Path) -> Result<Outcome, ExecutionError> {
    if !is_file(path).await? {
        return Ok(Outcome::Skipped);
    }

    match rule.action {
        FileAction::Delete => {
            delete_file(path).await?;
            Ok(Outcome::Deleted)
        }
        FileAction::Move => {
            let destination_dir = rule
                .destination
                .as_deref()
                .ok_or(ExecutionError::NoDestination(rule.index))?;
            let target = move_into(path, destination_dir).await?;
            Ok(Outcome::Moved(target))
        }
    }
}

/// Sleep for `delay` unless shutdown is requested first.
///
/// # Errors
///
/// Returns [`ExecutionError::Cancelled`] if shutdown was requested before or
/// during the wait.
pub async fn wait_or_cancel(delay: Duration, rx: &mut ShutdownRx) -> Result<(), ExecutionError> {
    if shutdown::is_requested(rx) {
        return Err(ExecutionError::Cancelled);
    }
    tokio::select! {
        () = tokio::time::sleep(delay) => Ok(()),
        () = shutdown::requested(rx) => Err(ExecutionError::Cancelled),
    }
}

/// Delete a single file.
///
/// # Errors
///
/// Returns [`ExecutionError::SourceMissing`] if the file is already gone.
pub async fn delete_file(path: &Path) -> Result<(), ExecutionError> {
    fs::remove_file(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => ExecutionError::SourceMissing(path.to_path_buf()),
        _ => ExecutionError::io("delete", path, e),
    })
}

/// Move `source` into `destination_dir`, keeping its file name.
///
/// Creates `destination_dir` if needed. Returns the final path.
///
/// # Errors
///
/// Returns [`ExecutionError::DestinationExists`] when a same-named entry is
/// already present, [`ExecutionError::SourceMissing`] when the source
/// vanished, and [`ExecutionError::Io`] for anything else.
pub async fn move_into(source: &Path, destination_dir: &Path) -> Result<PathBuf, ExecutionError> {
    let name = source
        .file_name()
        .ok_or_else(|| ExecutionError::NoFileName(source.to_path_buf()))?;
    let target = destination_dir.join(name);

    fs::create_dir_all(destination_dir)
        .await
        .map_err(|e| ExecutionError::io("create directory", destination_dir, e))?;

    move_no_clobber(source, &target).await?;
    Ok(target)
}

async fn move_no_clobber(source: &Path, target: &Path) -> Result<(), ExecutionError> {
    match fs::hard_link(source, target).await {
        Ok(()) => unlink_source(source, target).await,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            Err(ExecutionError::DestinationExists(target.to_path_buf()))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(ExecutionError::SourceMissing(source.to_path_buf()))
        }
        Err(e) => {
            debug!(source = %source.display(), error = %e, "hard link unavailable, copying");
            copy_no_clobber(source, target).await?;
            unlink_source(source, target).await
        }
    }
}

/// Remove the source after the target has been populated. If that fails the
/// target is removed again so the file is never duplicated.
async fn unlink_source(source: &Path, target: &Path) -> Result<(), ExecutionError> {
    match fs::remove_file(source).await {
        Ok(()) => Ok(()),
        // Someone else removed the source in the meantime; the target holds the data.
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => {
            if let Err(undo) = fs::remove_file(target).await {
                debug!(target = %target.display(), error = %undo, "failed to roll back move target");
            }
            Err(ExecutionError::io("remove source", source, e))
        }
    }
}

async fn copy_no_clobber(source: &Path, target: &Path) -> Result<(), ExecutionError> {
    let mut reader = fs::File::open(source).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => ExecutionError::SourceMissing(source.to_path_buf()),
        _ => ExecutionError::io("open", source, e),
    })?;
    let permissions = reader
        .metadata()
        .await
        .map_err(|e| ExecutionError::io("stat", source, e))?
        .permissions();

    let mut writer = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => ExecutionError::DestinationExists(target.to_path_buf()),
            _ => ExecutionError::io("create", target, e),
        })?;

    let copied = async {
        tokio::io::copy(&mut reader, &mut writer).await?;
        writer.sync_all().await
    }
    .await;
    drop(writer);

    if let Err(e) = copied {
        if let Err(undo) = fs::remove_file(target).await {
            debug!(target = %target.display(), error = %undo, "failed to remove partial copy");
        }
        return Err(ExecutionError::io("copy", source, e));
    }

    if let Err(e) = fs::set_permissions(target, permissions).await {
        debug!(target = %target.display(), error = %e, "failed to copy permissions");
    }
    Ok(())
}

async fn is_file(path: &Path) -> Result<bool, ExecutionError> {
    match fs::symlink_metadata(path).await {
        Ok(meta) => Ok(!meta.is_dir()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(ExecutionError::SourceMissing(path.to_path_buf()))
        }
        Err(e) => Err(ExecutionError::io("stat", path, e)),
    }
}
