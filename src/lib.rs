//! filemover: rule-driven directory watcher.
//!
//! Watches configured directories and applies one rule per directory and
//! glob: move matching files to a destination (optionally after a delay) or
//! delete them. Live filesystem notifications drive the common path; a
//! periodic sweep of every source catches anything the notifications missed.
//!
//! See `DESIGN.md` for the component layout.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Configuration loading, validation and path expansion.
pub mod config;
/// Bounded worker pool feeding the rule executor.
pub mod dispatch;
/// Error kinds for every engine boundary.
pub mod error;
/// Single-file delete and move actions.
pub mod executor;
/// Tracing subscriber setup.
pub mod logging;
/// Directory enumeration and periodic reconciliation.
pub mod reconcile;
/// Resolved rules and file-name patterns.
pub mod rule;
/// Process-wide shutdown flag.
pub mod shutdown;
/// Owner of all watches and loops.
pub mod supervisor;
/// Live filesystem watches.
pub mod watcher;
