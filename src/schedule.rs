//! Cycle scheduling: run once, or keep polling until told to stop.
//!
//! Cancellation is only observed between cycles, while waiting for the next
//! one. A cycle that has started always runs to completion and saves. In
//! watch mode SIGINT and SIGTERM cancel through [`Shutdown::cancel_on_signal`].

use std::io::Write;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

use crate::act::ActionSink;
use crate::observe::PageSource;
use crate::poll::Poller;
use crate::storage::{Snapshot, SnapshotStore, StorageError};

/// Floor on the wait between cycles, so a tiny interval can't hot-loop the API.
pub const MIN_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Once,
    Continuous { interval: Duration },
}

impl Mode {
    /// Continuous mode with the interval clamped to [`MIN_INTERVAL`].
    pub fn continuous(interval: Duration) -> Self {
        Self::Continuous {
            interval: interval.max(MIN_INTERVAL),
        }
    }
}

/// Cross-thread stop signal, checked at the wait between cycles.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels on SIGINT or SIGTERM (Ctrl-C on Windows).
    ///
    /// Only one handler can be installed per process.
    pub fn cancel_on_signal(&self) -> Result<(), ctrlc::Error> {
        let shutdown = self.clone();
        ctrlc::set_handler(move || {
            info!("signal received, stopping after the current cycle");
            shutdown.cancel();
        })
    }

    /// Requests a stop and wakes any pending wait.
    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    /// Sleeps for up to `timeout`. Returns `true` if cancelled.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (cancelled, _) = cvar
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled
    }
}

/// What a whole run amounted to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: usize,

    /// Any cycle had a project error, a sink failure, or lost output.
    pub failed: bool,
}

/// Runs cycles according to `mode` until done or cancelled.
///
/// Returns early only if the snapshot can't be saved.
pub fn run<S: PageSource, A: ActionSink>(
    poller: &mut Poller<S, A>,
    snapshot: &mut Snapshot,
    store: &SnapshotStore,
    mode: Mode,
    shutdown: &Shutdown,
    out: &mut impl Write,
) -> Result<RunSummary, StorageError> {
    let mut summary = RunSummary::default();

    loop {
        let report = poller.run_cycle(snapshot, store, out)?;
        summary.cycles += 1;
        summary.failed |= report.failed();

        let Mode::Continuous { interval } = mode else {
            break;
        };
        debug!(seconds = interval.as_secs(), "waiting for next cycle");
        if shutdown.wait(interval) {
            info!("shutdown requested, stopping");
            break;
        }
    }

    Ok(summary)
}
