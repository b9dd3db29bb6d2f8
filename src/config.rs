//! Configuration loading and validation.
//!
//! Rules are read from a single file next to the executable (or the path
//! given on the command line). The format is chosen by extension: `.json`
//! files are parsed with `serde_json`, everything else as TOML. Field names
//! accept both `snake_case` and `PascalCase` so configuration files written
//! for other tools load unchanged.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;
use crate::rule::FilePattern;

/// File name looked up beside the executable when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "filemover.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Ordered list of rules. Order only affects registration order.
    #[serde(alias = "Rules")]
    pub rules: Vec<Rule>,

    /// Engine tuning knobs.
    #[serde(default, alias = "Engine")]
    pub engine: EngineConfig,
}

/// What to do with a matching file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum FileAction {
    /// Move the file into the rule's destination directory.
    #[serde(alias = "move", alias = "MOVE")]
    Move,
    /// Delete the file.
    #[serde(alias = "delete", alias = "DELETE")]
    Delete,
}

impl std::fmt::Display for FileAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Move => f.write_str("move"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// A single watch rule as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Rule {
    /// Action applied to matching files.
    #[serde(alias = "Action")]
    pub action: FileAction,

    /// Directory to watch. May contain environment variable placeholders.
    #[serde(alias = "Source")]
    pub source: String,

    /// Target directory for [`FileAction::Move`]. Same expansion as `source`.
    #[serde(default, alias = "Destination")]
    pub destination: Option<String>,

    /// Glob matched against file names directly inside `source`.
    #[serde(alias = "Pattern")]
    pub pattern: String,

    /// Time to wait before moving a freshly created file.
    #[serde(default, alias = "Delay", deserialize_with = "deserialize_delay")]
    pub delay: Duration,
}

/// Engine tuning knobs. Every field has a default.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Seconds between reconciliation sweeps of each rule's source.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Maximum number of file actions running at the same time.
    #[serde(default = "default_max_concurrent_actions")]
    pub max_concurrent_actions: usize,

    /// Capacity of the queue between watchers and the worker pool.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Seconds to wait for running actions after shutdown is requested.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            max_concurrent_actions: default_max_concurrent_actions(),
            queue_capacity: default_queue_capacity(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl EngineConfig {
    /// Interval between reconciliation sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Grace period granted to running actions on shutdown.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Config {
    /// Validate that rules are complete and engine values are within bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for inconsistent rules or zero-valued
    /// engine settings, and [`ConfigError::Pattern`] for globs that do not
    /// compile.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, rule) in self.rules.iter().enumerate() {
            if rule.source.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "rule {index}: source must not be empty"
                )));
            }
            if rule.pattern.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "rule {index}: pattern must not be empty"
                )));
            }
            let has_destination = rule
                .destination
                .as_deref()
                .is_some_and(|d| !d.trim().is_empty());
            if rule.action == FileAction::Move && !has_destination {
                return Err(ConfigError::Invalid(format!(
                    "rule {index}: move rules require a destination"
                )));
            }
            FilePattern::new(&rule.pattern).map_err(|source| ConfigError::Pattern {
                index,
                pattern: rule.pattern.clone(),
                source,
            })?;
        }

        if self.engine.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "engine.sweep_interval_secs must be > 0".to_owned(),
            ));
        }
        if self.engine.max_concurrent_actions == 0 {
            return Err(ConfigError::Invalid(
                "engine.max_concurrent_actions must be > 0".to_owned(),
            ));
        }
        if self.engine.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "engine.queue_capacity must be > 0".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Load and validate the configuration file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Missing`] when the file does not exist, and the
/// other [`ConfigError`] variants when it cannot be read, parsed, or fails
/// validation.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::Missing(path.to_path_buf()));
    }

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let config = if is_json {
        parse_json(&contents)
    } else {
        parse_toml(&contents)
    }
    .map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })?;

    config.validate()?;
    Ok(config)
}

/// Parse a TOML configuration document without validating it.
///
/// # Errors
///
/// Returns the parser diagnostic as a string.
pub fn parse_toml(contents: &str) -> Result<Config, String> {
    toml::from_str(contents).map_err(|e| e.to_string())
}

/// Parse a JSON configuration document without validating it.
///
/// # Errors
///
/// Returns the parser diagnostic as a string.
pub fn parse_json(contents: &str) -> Result<Config, String> {
    serde_json::from_str(contents).map_err(|e| e.to_string())
}

/// Path of the configuration file used when none is given: `filemover.toml`
/// in the directory containing the running executable.
///
/// # Errors
///
/// Returns an error if the executable path cannot be determined.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let exe = std::env::current_exe()
        .map_err(|e| anyhow::anyhow!("failed to locate the running executable: {e}"))?;
    let dir = exe
        .parent()
        .ok_or_else(|| anyhow::anyhow!("executable path {} has no parent", exe.display()))?;
    Ok(dir.join(DEFAULT_CONFIG_FILE))
}

// ---------------------------------------------------------------------------
// Path expansion
// ---------------------------------------------------------------------------

/// Expand a configured directory into an absolute path.
///
/// Replaces `%VAR%`, `$VAR` and `${VAR}` with environment values, a leading
/// `~` with the home directory, and resolves relative results against the
/// current directory. Unknown variables are left untouched.
pub fn expand_path(raw: &str) -> PathBuf {
    let expanded = expand_env_vars(raw);
    let path = expand_home(&expanded);
    std::path::absolute(&path).unwrap_or(path)
}

/// Replace environment variable placeholders using the process environment.
pub fn expand_env_vars(input: &str) -> String {
    expand_vars_with(input, |name| std::env::var(name).ok())
}

/// Replace `%VAR%`, `${VAR}` and `$VAR` placeholders using `lookup`.
///
/// Placeholders whose variable is unknown are copied verbatim.
pub fn expand_vars_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find(['%', '$']) {
        let (head, tail) = rest.split_at(pos);
        out.push_str(head);

        if let Some(after) = tail.strip_prefix('%') {
            match after.split_once('%') {
                Some((name, remainder)) if is_percent_name(name) => {
                    match lookup(name) {
                        Some(value) => out.push_str(&value),
                        None => {
                            out.push('%');
                            out.push_str(name);
                            out.push('%');
                        }
                    }
                    rest = remainder;
                }
                _ => {
                    out.push('%');
                    rest = after;
                }
            }
        } else if let Some(after) = tail.strip_prefix("${") {
            match after.split_once('}') {
                Some((name, remainder)) if !name.is_empty() => {
                    match lookup(name) {
                        Some(value) => out.push_str(&value),
                        None => {
                            out.push_str("${");
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = remainder;
                }
                _ => {
                    out.push_str("${");
                    rest = after;
                }
            }
        } else {
            let after = tail.strip_prefix('$').unwrap_or(tail);
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            let (name, remainder) = after.split_at(end);
            match (name.is_empty(), lookup(name)) {
                (false, Some(value)) => out.push_str(&value),
                _ => {
                    out.push('$');
                    out.push_str(name);
                }
            }
            rest = remainder;
        }
    }

    out.push_str(rest);
    out
}

fn is_percent_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\', ' '])
}

/// Replace a leading `~` with the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with(['/', '\\']) => rest,
        _ => return PathBuf::from(path),
    };
    match directories::BaseDirs::new() {
        Some(base) => base.home_dir().join(rest.trim_start_matches(['/', '\\'])),
        None => PathBuf::from(path),
    }
}

// ---------------------------------------------------------------------------
// Delay parsing
// ---------------------------------------------------------------------------

/// Delay as written in the file: whole seconds or a `[D.]HH:MM:SS[.fff]` string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawDelay {
    Seconds(u64),
    Text(String),
}

fn deserialize_delay<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match RawDelay::deserialize(deserializer)? {
        RawDelay::Seconds(secs) => Ok(Duration::from_secs(secs)),
        RawDelay::Text(text) => parse_delay(&text).map_err(serde::de::Error::custom),
    }
}

/// Parse a delay string.
///
/// Accepts plain seconds (`"90"`), `HH:MM:SS`, `D.HH:MM:SS` and an optional
/// fractional second part (`HH:MM:SS.250`).
///
/// # Errors
///
/// Returns a description of the problem when the string is malformed or the
/// value overflows.
pub fn parse_delay(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    if let Ok(secs) = text.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let invalid = || format!("invalid delay '{text}', expected [D.]HH:MM:SS[.fff]");

    let mut parts = text.split(':');
    let (Some(first), Some(minutes), Some(seconds), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };

    let (days, hours) = match first.split_once('.') {
        Some((d, h)) => (parse_field(d, u64::MAX).ok_or_else(invalid)?, h),
        None => (0, first),
    };
    let hours = parse_field(hours, 23).ok_or_else(invalid)?;
    let minutes = parse_field(minutes, 59).ok_or_else(invalid)?;

    let (whole, fraction) = match seconds.split_once('.') {
        Some((s, f)) => (s, Some(f)),
        None => (seconds, None),
    };
    let whole = parse_field(whole, 59).ok_or_else(invalid)?;
    let nanos = match fraction {
        Some(f) => parse_fraction(f).ok_or_else(invalid)?,
        None => 0,
    };

    let total = days
        .checked_mul(86_400)
        .and_then(|s| s.checked_add(hours.checked_mul(3_600)?))
        .and_then(|s| s.checked_add(minutes.checked_mul(60)?))
        .and_then(|s| s.checked_add(whole))
        .ok_or_else(|| format!("delay '{text}' is too large"))?;

    Ok(Duration::new(total, nanos))
}

fn parse_field(field: &str, max: u64) -> Option<u64> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse::<u64>().ok().filter(|v| *v <= max)
}

/// Convert up to nine fractional digits into nanoseconds.
fn parse_fraction(fraction: &str) -> Option<u32> {
    if fraction.is_empty() || fraction.len() > 9 || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let padded = format!("{fraction:0<9}");
    padded.parse::<u32>().ok()
}

// Default value functions for serde.

fn default_sweep_interval_secs() -> u64 {
    3_600
}

fn default_max_concurrent_actions() -> usize {
    16
}

fn default_queue_capacity() -> usize {
    1_024
}

fn default_shutdown_grace_secs() -> u64 {
    5
}
