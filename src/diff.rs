//! Diffing fresh items against the prior snapshot for one project.
//!
//! Pure: the prior statuses are only read, and the caller swaps in the
//! returned map once the diff is done.

use crate::model::{Item, TrackedResource, TransitionEvent, eq_casefold};
use crate::storage::StatusMap;

/// What one project's diff produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// Transitions to the target status, in fetch order.
    pub events: Vec<TransitionEvent>,

    /// Every fresh item's status. Replaces the project's snapshot entry.
    pub statuses: StatusMap,
}

/// Compares fresh items with the project's prior statuses.
///
/// `prior` is `None` when the project has never been polled. An item whose
/// status matches the target (case-insensitively) produces an event iff its
/// status differs from the prior one and the project was already known, or
/// `emit_on_first_run` is set. Items missing from `items` are dropped from
/// the returned statuses.
pub fn diff(
    resource: &TrackedResource,
    project_title: Option<&str>,
    prior: Option<&StatusMap>,
    items: &[Item],
    emit_on_first_run: bool,
) -> Diff {
    let may_emit = prior.is_some() || emit_on_first_run;
    let mut result = Diff::default();

    for item in items {
        let Some(status) = &item.status else {
            continue;
        };
        result.statuses.insert(item.id.clone(), status.clone());

        if !may_emit || !eq_casefold(status, &resource.target_status) {
            continue;
        }

        let previous = prior.and_then(|p| p.get(&item.id));
        if previous == Some(status) {
            continue;
        }

        result.events.push(TransitionEvent {
            project_key: resource.key(),
            project_url: resource.url.clone(),
            project_title: project_title.map(String::from),
            issue_url: item.url.clone(),
            issue_title: item.title.clone(),
            issue_number: item.number,
            issue_repo: item.repo.clone(),
            status: status.clone(),
            previous_status: previous.cloned(),
        });
    }

    result
}
