//! CLI interface for dev-watch.
//!
//! Without a subcommand: poll the configured GitHub projects once, or keep
//! polling. Each cycle prints exactly one JSON line to stdout; everything
//! meant for humans goes to stderr.
//!
//! - `dev-watch [--once | --watch]`: poll.
//! - `dev-watch comment --issue-url <url>`: post a comment on an issue.
//!
//! Exit status: 0 when everything was clean, 1 when any project, action,
//! comment, or snapshot write failed, 2 for configuration and usage errors.

use std::io;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};

use crate::act::{ActionSink, DryRun, ScriptRunner};
use crate::comment::{self, CommentError, Commenter, IssueRef};
use crate::config::{self, Config, ConfigError, Credential, DEFAULT_CONFIG_PATH};
use crate::observe::GhGraphql;
use crate::poll::Poller;
use crate::schedule::{self, Mode, RunSummary, Shutdown};
use crate::storage::{SnapshotStore, StorageError};

/// dev-watch: watch GitHub Projects for issues moved to Todo.
#[derive(Debug, Parser)]
#[command(name = "dev-watch", version, after_long_help = USAGE_HELP)]
pub struct Cli {
    /// Config file: JSON, or TOML when the path ends in `.toml`.
    #[arg(
        long,
        global = true,
        env = "DEV_WATCH_CONFIG",
        default_value = DEFAULT_CONFIG_PATH
    )]
    config: String,

    #[command(flatten)]
    watch: WatchArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

/// Options for polling, the default command.
#[derive(Debug, Args)]
struct WatchArgs {
    /// Run a single poll and exit. This is the default.
    #[arg(long, conflicts_with = "watch")]
    once: bool,

    /// Poll continuously. SIGINT or SIGTERM stops after the current cycle.
    #[arg(long)]
    watch: bool,

    /// Seconds between polls in watch mode (minimum 5).
    /// Overrides `poll_interval_seconds`; 0 means "use the config".
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,

    /// Emit Todo transitions for projects with no saved state yet.
    #[arg(long)]
    emit_on_first_run: bool,

    /// Report events without running the action runner.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Post a comment on a GitHub issue or pull request.
    ///
    /// The body comes from `--message`, `--message-file`, or stdin.
    /// Prints `{"comment_url": ...}` on success.
    Comment(CommentArgs),
}

#[derive(Debug, Args)]
struct CommentArgs {
    /// Full issue or pull request URL.
    #[arg(long)]
    issue_url: String,

    /// Comment body.
    #[arg(long)]
    message: Option<String>,

    /// File holding the comment body.
    #[arg(long, value_name = "PATH")]
    message_file: Option<String>,

    /// Env var holding the GitHub token. Overrides `github_token_env`.
    #[arg(long, value_name = "NAME")]
    token_env: Option<String>,
}

const USAGE_HELP: &str = r#"Output: one JSON line per cycle on stdout
  {"errors":[...],"events":[{"issue_url":...,"previous_status":...,"status":"Todo",...}],"timestamp":"..."}

Examples:
  dev-watch --once
  dev-watch --watch --interval 120
  DEV_WATCH_LOG=debug dev-watch --config ~/dev.watch.json --dry-run
  echo "Picked up" | dev-watch comment --issue-url https://github.com/acme/widgets/issues/42"#;

/// Errors that stop the process.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Comment(#[from] CommentError),
}

impl CliError {
    fn exit_status(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Comment(e) if e.is_usage() => 2,
            Self::Storage(_) | Self::Comment(_) => 1,
        }
    }
}

/// Run the CLI and map the outcome to an exit status.
///
/// Usage errors (including `--once` with `--watch`) are reported by clap,
/// which exits with status 2.
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let config_path = config::expand_path(&cli.config);

    let outcome = match &cli.command {
        None => execute(&cli.watch, &config_path).map(|summary| summary.failed),
        Some(Command::Comment(args)) => post_comment(args, &config_path).map(|()| false),
    };

    match outcome {
        Ok(true) => ExitCode::FAILURE,
        Ok(false) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(e.exit_status())
        }
    }
}

fn execute(args: &WatchArgs, config_path: &Path) -> Result<RunSummary, CliError> {
    let config = Config::load(config_path)?;
    let credential = config.credential()?;

    let store = SnapshotStore::new(config.state_path()?);
    let mut snapshot = store.load()?;

    let shutdown = Shutdown::new();
    let mode = if args.once || !args.watch {
        Mode::Once
    } else {
        if let Err(e) = shutdown.cancel_on_signal() {
            warn!("failed to install signal handler: {e}");
        }
        Mode::continuous(args.interval(&config))
    };

    let sink: Box<dyn ActionSink> = if args.dry_run {
        Box::new(DryRun)
    } else {
        Box::new(ScriptRunner::new(
            config.action_command(),
            config.loops_parallel,
        ))
    };

    info!(
        config = %config_path.display(),
        state = %store.path().display(),
        projects = config.projects.len(),
        ?mode,
        "starting"
    );

    let mut poller = Poller::new(
        GhGraphql::new(credential),
        sink,
        config.projects,
        args.emit_on_first_run || config.emit_on_first_run,
    );
    let summary = schedule::run(
        &mut poller,
        &mut snapshot,
        &store,
        mode,
        &shutdown,
        &mut io::stdout().lock(),
    )?;

    info!(cycles = summary.cycles, failed = summary.failed, "done");
    Ok(summary)
}

impl WatchArgs {
    /// The wait between cycles before the floor is applied.
    fn interval(&self, config: &Config) -> Duration {
        self.interval
            .filter(|&secs| secs > 0)
            .map_or_else(|| config.poll_interval(), Duration::from_secs)
    }
}

fn post_comment(args: &CommentArgs, config_path: &Path) -> Result<(), CliError> {
    let message_file = args.message_file.as_deref().map(config::expand_path);
    let body = comment::resolve_message(
        args.message.as_deref(),
        message_file.as_deref(),
        io::stdin().lock(),
    )?;

    let credential = match &args.token_env {
        Some(name) => Credential::from_env(name)?,
        None => comment_config(config_path)?.credential()?,
    };
    let issue = IssueRef::from_url(&args.issue_url)?;

    let url = Commenter::new(credential).post(&issue, &body)?;
    info!(issue = %args.issue_url, "comment posted");
    println!("{}", comment::output_line(url.as_deref()));
    Ok(())
}

/// The config for `comment`, which works without a config file.
fn comment_config(path: &Path) -> Result<Config, ConfigError> {
    match Config::load(path) {
        Err(ConfigError::NotFound(_) | ConfigError::Empty(_)) => Ok(Config::default()),
        other => other,
    }
}
