//! Poll cycles: fetch and diff every project, report, act, persist.
//!
//! Projects are polled strictly one after another. A failing project is
//! recorded and skipped; it keeps its previous snapshot entry while the
//! others are replaced with what was just observed.

use std::io::{self, Write};

use jiff::Timestamp;
use tracing::{debug, info, warn};

use crate::act::ActionSink;
use crate::config::{ConfigError, ProjectEntry};
use crate::diff;
use crate::extract::{self, Extraction};
use crate::model::{Item, PollResult, ResourceKey, TransitionEvent};
use crate::observe::{self, PageSource, TransportError};
use crate::storage::{Snapshot, SnapshotStore, StorageError};

/// Why one project produced nothing this cycle.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{key}: {source}")]
    Transport {
        key: ResourceKey,
        source: TransportError,
    },
}

/// A finished cycle: its result plus what went wrong after polling.
#[derive(Debug)]
pub struct CycleReport {
    pub result: PollResult,

    /// Events the action sink failed on.
    pub sink_failures: usize,

    /// The result line couldn't be written.
    pub output_failed: bool,
}

impl CycleReport {
    /// Whether the cycle should count against the exit status.
    pub fn failed(&self) -> bool {
        !self.result.errors.is_empty() || self.sink_failures > 0 || self.output_failed
    }
}

/// Drives cycles over the configured projects.
pub struct Poller<S, A> {
    source: S,
    sink: A,
    projects: Vec<ProjectEntry>,
    emit_on_first_run: bool,
}

impl<S: PageSource, A: ActionSink> Poller<S, A> {
    pub fn new(source: S, sink: A, projects: Vec<ProjectEntry>, emit_on_first_run: bool) -> Self {
        Self {
            source,
            sink,
            projects,
            emit_on_first_run,
        }
    }

    /// Polls every project in configured order.
    ///
    /// Each project that succeeds has its snapshot entry replaced; each that
    /// fails leaves its entry untouched and adds one line to `errors`.
    pub fn poll(&self, snapshot: &mut Snapshot) -> PollResult {
        let mut result = PollResult {
            timestamp: Timestamp::now(),
            events: Vec::new(),
            errors: Vec::new(),
        };

        for entry in &self.projects {
            match self.poll_project(entry, snapshot) {
                Ok(events) => result.events.extend(events),
                Err(e) => {
                    warn!("{e}");
                    result.errors.push(e.to_string());
                }
            }
        }

        result
    }

    fn poll_project(
        &self,
        entry: &ProjectEntry,
        snapshot: &mut Snapshot,
    ) -> Result<Vec<TransitionEvent>, ResourceError> {
        let resource = entry.resolve()?;
        let key = resource.key();

        let fetched = observe::fetch_all(&self.source, &resource).map_err(|source| {
            ResourceError::Transport {
                key: key.clone(),
                source,
            }
        })?;

        let items: Vec<Item> = fetched
            .records
            .iter()
            .filter_map(|raw| match extract::extract(raw, &resource.status_field) {
                Extraction::Item(item) => Some(item),
                Extraction::Skip(reason) => {
                    debug!(project = %key, %reason, "skipped record");
                    None
                }
            })
            .collect();

        let diff = diff::diff(
            &resource,
            fetched.title.as_deref(),
            snapshot.project(&key),
            &items,
            self.emit_on_first_run,
        );
        debug!(
            project = %key,
            records = fetched.records.len(),
            items = items.len(),
            events = diff.events.len(),
            "polled project"
        );

        snapshot.replace_project(key, diff.statuses);
        Ok(diff.events)
    }

    /// Hands each event to the sink in order, returning how many failed.
    pub fn dispatch(&mut self, events: &[TransitionEvent]) -> usize {
        let mut failures = 0;
        for event in events {
            if let Err(e) = self.sink.dispatch(event) {
                warn!(issue = %event.issue_url, "action failed: {e}");
                failures += 1;
            }
        }
        failures
    }

    /// Runs one full cycle: poll, print the result line, act, save.
    ///
    /// The snapshot is saved regardless of project, output, or sink failures.
    /// Only a failed save is returned as an error.
    pub fn run_cycle(
        &mut self,
        snapshot: &mut Snapshot,
        store: &SnapshotStore,
        out: &mut impl Write,
    ) -> Result<CycleReport, StorageError> {
        let result = self.poll(snapshot);

        let output_failed = match write_line(out, &result) {
            Ok(()) => false,
            Err(e) => {
                warn!("failed to write cycle output: {e}");
                true
            }
        };

        let sink_failures = self.dispatch(&result.events);

        store.save(snapshot)?;

        info!(
            events = result.events.len(),
            errors = result.errors.len(),
            sink_failures,
            "cycle complete"
        );

        Ok(CycleReport {
            result,
            sink_failures,
            output_failed,
        })
    }
}

fn write_line(out: &mut impl Write, result: &PollResult) -> io::Result<()> {
    let line = result.to_json_line()?;
    writeln!(out, "{line}")?;
    out.flush()
}
