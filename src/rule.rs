//! Resolved rules and file-name matching.
//!
//! A [`Rule`] from the configuration is resolved exactly once, when its watch
//! is registered: placeholders in the source and destination are expanded and
//! the glob is compiled. Event handling never re-expands paths.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use globset::{GlobBuilder, GlobMatcher};

use crate::config::{expand_path, FileAction, Rule};
use crate::error::ConfigError;

/// Whether the host filesystem treats names case-insensitively by convention.
const CASE_INSENSITIVE: bool = cfg!(any(windows, target_os = "macos"));

/// Compiled glob matched against bare file names.
///
/// Only `*` and `?` are wildcards and neither crosses a path separator, so a
/// pattern only ever selects direct children of the watched directory.
/// Brackets and braces match themselves, and `*.*` matches every name,
/// including names without an extension.
#[derive(Debug, Clone)]
pub struct FilePattern {
    glob: String,
    matcher: GlobMatcher,
}

impl FilePattern {
    /// Compile `pattern`, following the host's case-sensitivity convention.
    ///
    /// # Errors
    ///
    /// Returns the glob compiler error for malformed patterns.
    pub fn new(pattern: &str) -> Result<Self, globset::Error> {
        Self::with_case(pattern, CASE_INSENSITIVE)
    }

    /// Compile `pattern` with explicit case handling.
    ///
    /// # Errors
    ///
    /// Returns the glob compiler error for malformed patterns.
    pub fn with_case(pattern: &str, case_insensitive: bool) -> Result<Self, globset::Error> {
        let matcher = GlobBuilder::new(&wildcard_glob(pattern))
            .case_insensitive(case_insensitive)
            .literal_separator(true)
            .backslash_escape(!cfg!(windows))
            .build()?
            .compile_matcher();
        Ok(Self {
            glob: pattern.to_owned(),
            matcher,
        })
    }

    /// Match a bare file name.
    pub fn matches_name(&self, name: &OsStr) -> bool {
        self.matcher.is_match(Path::new(name))
    }

    /// Match the final component of `path`.
    pub fn matches_path(&self, path: &Path) -> bool {
        path.file_name().is_some_and(|name| self.matches_name(name))
    }

    /// The glob as written in the configuration.
    pub fn as_str(&self) -> &str {
        &self.glob
    }
}

/// Rewrite a file-name pattern into globset syntax with `*` and `?` as the
/// only wildcards.
fn wildcard_glob(pattern: &str) -> String {
    if pattern == "*.*" {
        return "*".to_owned();
    }
    let mut glob = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '[' | ']' | '{' | '}' => {
                glob.push('[');
                glob.push(c);
                glob.push(']');
            }
            c => glob.push(c),
        }
    }
    glob
}

/// A rule with absolute paths and a compiled pattern, ready to execute.
#[derive(Debug, Clone)]
pub struct ResolvedRule {
    /// Position of the rule in the configuration.
    pub index: usize,
    /// Action applied to matching files.
    pub action: FileAction,
    /// Absolute source directory.
    pub source: PathBuf,
    /// Absolute destination directory (move rules only).
    pub destination: Option<PathBuf>,
    /// Compiled file-name pattern.
    pub pattern: FilePattern,
    /// Delay applied to event-originated moves.
    pub delay: Duration,
}

impl ResolvedRule {
    /// Expand and compile the rule at position `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Pattern`] if the glob does not compile.
    pub fn resolve(index: usize, rule: &Rule) -> Result<Self, ConfigError> {
        let pattern = FilePattern::new(&rule.pattern).map_err(|source| ConfigError::Pattern {
            index,
            pattern: rule.pattern.clone(),
            source,
        })?;

        let destination = match rule.action {
            FileAction::Move => rule.destination.as_deref().map(expand_path),
            FileAction::Delete => None,
        };

        Ok(Self {
            index,
            action: rule.action,
            source: expand_path(&rule.source),
            destination,
            pattern,
            delay: rule.delay,
        })
    }

    /// Whether `path` is a direct child of the source whose name matches.
    pub fn accepts(&self, path: &Path) -> bool {
        path.parent() == Some(self.source.as_path()) && self.pattern.matches_path(path)
    }
}

impl fmt::Display for ResolvedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rule {} ({} {} in {}",
            self.index,
            self.action,
            self.pattern.as_str(),
            self.source.display()
        )?;
        if let Some(destination) = &self.destination {
            write!(f, " -> {}", destination.display())?;
        }
        if !self.delay.is_zero() {
            write!(f, " after {:?}", self.delay)?;
        }
        f.write_str(")")
    }
}
