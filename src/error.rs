//! Error taxonomy for the rule engine.
//!
//! Each boundary has its own error kind so the policy of what gets reported,
//! swallowed or propagated is visible at the call site:
//!
//! - [`ConfigError`] stops startup before any watch is created.
//! - [`WatchError`] disables the live watch of a single rule.
//! - [`SweepError`] loses one enumeration of a source directory.
//! - [`ExecutionError`] loses one action on one file.

use std::path::PathBuf;

/// Errors produced while loading or validating the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file '{}' does not exist", .0.display())]
    Missing(PathBuf),
    /// The configuration file exists but could not be read.
    #[error("failed to read configuration file '{}': {source}", path.display())]
    Read {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The configuration file could not be deserialized.
    #[error("cannot deserialize the configuration file '{}': {message}", path.display())]
    Parse {
        /// Path of the configuration file.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },
    /// A value in the configuration is out of bounds or inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// A rule pattern is not a valid glob.
    #[error("rule {index}: invalid pattern '{pattern}': {source}")]
    Pattern {
        /// Position of the rule in the configuration.
        index: usize,
        /// Offending pattern.
        pattern: String,
        /// Glob compiler error.
        source: globset::Error,
    },
}

/// Errors produced while registering the live watch for one rule.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The source directory does not exist or is not a directory.
    #[error("source directory '{}' does not exist", .0.display())]
    MissingSource(PathBuf),
    /// The platform watcher could not be created or attached.
    #[error("failed to watch '{}': {source}", path.display())]
    Notify {
        /// Directory being watched.
        path: PathBuf,
        /// Underlying notify error.
        source: notify::Error,
    },
}

/// Errors produced while enumerating a source directory.
#[derive(Debug, thiserror::Error)]
#[error("failed to enumerate '{}': {source}", path.display())]
pub struct SweepError {
    /// Directory being enumerated.
    pub path: PathBuf,
    /// Underlying I/O error.
    pub source: std::io::Error,
}

/// Errors produced while applying a rule to a single file.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// Shutdown was requested while the action was suspended.
    #[error("cancelled before the action ran")]
    Cancelled,
    /// The source file disappeared before the action ran.
    #[error("source '{}' no longer exists", .0.display())]
    SourceMissing(PathBuf),
    /// A file with the same name already exists at the destination.
    #[error("destination '{}' already exists", .0.display())]
    DestinationExists(PathBuf),
    /// The source path has no file name component.
    #[error("'{}' has no file name", .0.display())]
    NoFileName(PathBuf),
    /// A move rule was resolved without a destination directory.
    #[error("rule {0} has no destination")]
    NoDestination(usize),
    /// Any other filesystem failure.
    #[error("{op} '{}' failed: {source}", path.display())]
    Io {
        /// Operation that failed.
        op: &'static str,
        /// Path the operation was applied to.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl ExecutionError {
    /// Wrap an I/O error raised by `op` on `path`.
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}
