//! Child processes with a hard deadline.
//!
//! Both the GitHub transport (`gh`) and the action runner are external
//! commands. Each call is bounded: a command still running at the deadline
//! is killed and reported as timed out.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Upper bound on any single external command.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// How often a running child is checked for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A command that ran to completion (successfully or not).
#[derive(Debug)]
pub struct Finished {
    pub status: ExitStatus,

    /// Captured stdout, empty unless stdout was piped.
    pub stdout: Vec<u8>,

    /// Captured stderr, empty unless stderr was piped.
    pub stderr: Vec<u8>,
}

impl Finished {
    /// Captured stderr as trimmed text.
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to start: {0}")]
    Spawn(io::Error),

    #[error("failed while waiting: {0}")]
    Wait(io::Error),

    #[error("timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
}

/// Runs `command` to completion or until `timeout` elapses.
///
/// Piped stdout and stderr are drained on background threads so a chatty
/// child can't block on a full pipe while we wait on it.
pub fn run_with_timeout(command: &mut Command, timeout: Duration) -> Result<Finished, RunError> {
    let mut child = command.spawn().map_err(RunError::Spawn)?;
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status = wait_until(&mut child, Instant::now() + timeout)
        .map_err(RunError::Wait)?
        .ok_or(RunError::TimedOut(timeout))?;

    Ok(Finished {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

/// Waits for the child to exit, killing it if the deadline passes first.
fn wait_until(child: &mut Child, deadline: Instant) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            // Already-exited races surface as errors here; either way it's gone.
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        // A read error just truncates the capture.
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}
