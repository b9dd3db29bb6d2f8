//! filemover CLI entry point.
//!
//! Runs the watcher daemon by default. `check` validates a configuration and
//! prints the resolved rules; `sweep` applies every rule once to the files
//! currently present and exits.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use filemover::config::{default_config_path, load_config, Config};
use filemover::rule::ResolvedRule;
use filemover::{logging, shutdown};
use filemover::supervisor::{self, Supervisor};

/// Move or delete files as they land in watched directories.
#[derive(Parser)]
#[command(name = "filemover", version, about, args_conflicts_with_subcommands = true)]
struct Cli {
    /// Subcommand to execute. Defaults to `start`.
    #[command(subcommand)]
    command: Option<Command>,

    /// Arguments for the implicit `start`.
    #[command(flatten)]
    start: StartArgs,
}

/// Arguments shared by every subcommand.
#[derive(Args, Clone, Default)]
struct ConfigArgs {
    /// Configuration file. Defaults to `filemover.toml` beside the executable.
    config: Option<PathBuf>,

    /// Log skipped and swallowed failures too (`RUST_LOG` still wins).
    #[arg(short, long)]
    verbose: bool,
}

/// Arguments for running the daemon.
#[derive(Args, Clone, Default)]
struct StartArgs {
    #[command(flatten)]
    common: ConfigArgs,

    /// Also write JSON logs with daily rotation into this directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Watch the configured directories until interrupted.
    Start(StartArgs),
    /// Validate the configuration and print the resolved rules.
    Check(ConfigArgs),
    /// Apply every rule once to the files currently present, then exit.
    Sweep(ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Start(cli.start)) {
        Command::Start(args) => handle_start(args).await,
        Command::Check(args) => handle_check(args),
        Command::Sweep(args) => handle_sweep(args).await,
    }
}

/// Run the watcher daemon until Ctrl-C / SIGTERM.
async fn handle_start(args: StartArgs) -> anyhow::Result<()> {
    let _logging_guard = logging::init(args.log_dir.as_deref(), args.common.verbose)?;

    let path = config_path(args.common.config)?;
    let Some(config) = load_or_report(&path) else {
        return Ok(());
    };

    info!(config = %path.display(), rules = config.rules.len(), "filemover starting");

    let (tx, rx) = shutdown::channel();
    tokio::spawn(shutdown::trigger_on_signal(tx));

    Supervisor::new(config).run(rx).await?;
    Ok(())
}

/// Validate the configuration and log each resolved rule.
fn handle_check(args: ConfigArgs) -> anyhow::Result<()> {
    logging::init(None, args.verbose)?;

    let path = config_path(args.config)?;
    let config =
        load_config(&path).with_context(|| format!("failed to load {}", path.display()))?;

    for (index, raw) in config.rules.iter().enumerate() {
        let rule = ResolvedRule::resolve(index, raw)?;
        let source_ok = rule.source.is_dir();
        info!(%rule, source_exists = source_ok, "rule");
    }

    info!(
        rules = config.rules.len(),
        sweep_interval_secs = config.engine.sweep_interval_secs,
        "configuration is valid"
    );
    Ok(())
}

/// Apply every rule once and exit.
async fn handle_sweep(args: ConfigArgs) -> anyhow::Result<()> {
    logging::init(None, args.verbose)?;

    let path = config_path(args.config)?;
    let Some(config) = load_or_report(&path) else {
        return Ok(());
    };

    let (tx, rx) = shutdown::channel();
    tokio::spawn(shutdown::trigger_on_signal(tx));

    let counts = supervisor::sweep_once(&config, rx).await?;
    info!(
        moved = counts.moved,
        deleted = counts.deleted,
        failed = counts.failed,
        "sweep complete"
    );
    Ok(())
}

fn config_path(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => default_config_path(),
    }
}

/// Load the configuration, reporting failures instead of propagating them:
/// a broken configuration means the process does nothing and exits cleanly.
fn load_or_report(path: &Path) -> Option<Config> {
    match load_config(path) {
        Ok(config) => Some(config),
        Err(e) => {
            error!(error = %e, "no rules started");
            None
        }
    }
}
