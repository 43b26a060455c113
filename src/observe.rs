//! Observation: read every item of a watched project, page by page.
//!
//! The transport is a black box behind [`PageSource`]: given a project and a
//! continuation cursor, return one page. [`fetch_all`] follows cursors until
//! the source reports no further pages.

mod github;

pub use github::GhGraphql;
pub(crate) use github::run_gh;

use std::collections::HashSet;
use std::time::Duration;

use serde_json::Value;

use crate::model::TrackedResource;

/// Failure talking to GitHub through `gh`.
///
/// While polling it is scoped to one project: the cycle records it and moves on.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to run gh: {0}")]
    Spawn(std::io::Error),

    #[error("GitHub API request timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("gh api failed: {0}")]
    Command(String),

    #[error("GitHub API returned an unreadable response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("GitHub API returned errors: {0}")]
    Upstream(String),

    #[error("project not found for {owner_kind} {owner} #{number}")]
    ProjectNotFound {
        owner_kind: &'static str,
        owner: String,
        number: u64,
    },

    #[error("GitHub API reported another page without a cursor")]
    MissingCursor,

    #[error("GitHub API returned cursor {0} twice")]
    RepeatedCursor(String),
}

/// One page of project items.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub project_title: Option<String>,

    /// Raw item records, in the order returned.
    pub records: Vec<Value>,

    /// Cursor for the next page, or `None` on the last page.
    pub next_cursor: Option<String>,
}

/// Fetches single pages of a project's items.
pub trait PageSource {
    fn fetch_page(
        &self,
        resource: &TrackedResource,
        after: Option<&str>,
    ) -> Result<Page, TransportError>;
}

/// Every raw record of one project, across all pages.
#[derive(Debug, Clone, Default)]
pub struct FetchedProject {
    pub title: Option<String>,
    pub records: Vec<Value>,
}

/// Fetches all pages of a project, preserving record order.
///
/// Any page failure aborts the whole project; records from earlier pages are
/// discarded rather than diffed on their own. A cursor handed out twice means
/// the pages loop, which also aborts.
pub fn fetch_all<S: PageSource + ?Sized>(
    source: &S,
    resource: &TrackedResource,
) -> Result<FetchedProject, TransportError> {
    let mut fetched = FetchedProject::default();
    let mut seen = HashSet::new();
    let mut after: Option<String> = None;

    loop {
        let page = source.fetch_page(resource, after.as_deref())?;
        fetched.title = page.project_title.or(fetched.title);
        fetched.records.extend(page.records);

        let Some(cursor) = page.next_cursor else {
            return Ok(fetched);
        };
        if !seen.insert(cursor.clone()) {
            return Err(TransportError::RepeatedCursor(cursor));
        }
        after = Some(cursor);
    }
}
