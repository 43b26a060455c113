//! Action dispatch: hand each transition to the downstream runner.
//!
//! The runner is an external script invoked once per event as
//! `<runner> [--parallel] [--repo <name>] "<task>"`. Its output goes to our
//! stderr so stdout stays reserved for cycle results.

use std::io;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

use tracing::info;

use crate::model::TransitionEvent;
use crate::process::{self, COMMAND_TIMEOUT, RunError};

/// Failure to act on one event. Never stops the cycle.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("action runner not found at {}", .0.display())]
    RunnerNotFound(PathBuf),

    #[error("empty task string")]
    EmptyTask,

    #[error("failed to run action runner: {0}")]
    Spawn(io::Error),

    #[error("action runner timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("action runner exited with {0}")]
    Failed(ExitStatus),
}

/// Consumes transition events, one at a time, in emission order.
pub trait ActionSink {
    fn dispatch(&mut self, event: &TransitionEvent) -> Result<(), SinkError>;
}

impl<T: ActionSink + ?Sized> ActionSink for Box<T> {
    fn dispatch(&mut self, event: &TransitionEvent) -> Result<(), SinkError> {
        (**self).dispatch(event)
    }
}

/// Runs the configured runner script for every event.
pub struct ScriptRunner {
    command: PathBuf,
    parallel: bool,
    timeout: Duration,
}

impl ScriptRunner {
    pub fn new(command: impl Into<PathBuf>, parallel: bool) -> Self {
        Self {
            command: command.into(),
            parallel,
            timeout: COMMAND_TIMEOUT,
        }
    }
}

impl ActionSink for ScriptRunner {
    fn dispatch(&mut self, event: &TransitionEvent) -> Result<(), SinkError> {
        if !self.command.exists() {
            return Err(SinkError::RunnerNotFound(self.command.clone()));
        }
        let args = runner_args(event, self.parallel)?;

        let mut command = Command::new(&self.command);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(io::stderr()))
            .stderr(Stdio::inherit());

        let finished =
            process::run_with_timeout(&mut command, self.timeout).map_err(|e| match e {
                RunError::Spawn(e) | RunError::Wait(e) => SinkError::Spawn(e),
                RunError::TimedOut(d) => SinkError::TimedOut(d),
            })?;

        if finished.status.success() {
            Ok(())
        } else {
            Err(SinkError::Failed(finished.status))
        }
    }
}

/// Sink for `--dry-run`: logs each event and does nothing else.
pub struct DryRun;

impl ActionSink for DryRun {
    fn dispatch(&mut self, event: &TransitionEvent) -> Result<(), SinkError> {
        info!(task = %task_string(event), "dry run: skipping action");
        Ok(())
    }
}

/// The task handed to the runner: `repo: X | title: Y | url: Z`.
///
/// Missing or empty parts are left out.
pub fn task_string(event: &TransitionEvent) -> String {
    let parts = [
        ("repo", event.issue_repo.as_deref()),
        ("title", event.issue_title.as_deref()),
        ("url", Some(event.issue_url.as_str())),
    ];

    parts
        .into_iter()
        .filter_map(|(label, value)| {
            value
                .filter(|v| !v.is_empty())
                .map(|v| format!("{label}: {v}"))
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Arguments for one runner invocation.
fn runner_args(event: &TransitionEvent, parallel: bool) -> Result<Vec<String>, SinkError> {
    let task = task_string(event);
    if task.is_empty() {
        return Err(SinkError::EmptyTask);
    }

    let mut args = Vec::new();
    if parallel {
        args.push("--parallel".to_string());
    }
    if let Some(name) = event.issue_repo.as_deref().and_then(repo_name) {
        args.push("--repo".to_string());
        args.push(name.to_string());
    }
    args.push(task);
    Ok(args)
}

/// Repository name without its owner: `acme/widgets` → `widgets`.
fn repo_name(name_with_owner: &str) -> Option<&str> {
    name_with_owner
        .rsplit_once('/')
        .map(|(_, name)| name)
        .filter(|name| !name.is_empty())
}
