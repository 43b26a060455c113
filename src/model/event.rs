//! Transition events and the per-cycle result that carries them.

use jiff::Timestamp;
use serde::Serialize;

use super::ResourceKey;

/// An item's status newly equals the project's target status.
///
/// Field names match the cycle output line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionEvent {
    pub project_key: ResourceKey,
    pub project_url: String,
    pub project_title: Option<String>,
    pub issue_url: String,
    pub issue_title: Option<String>,
    pub issue_number: Option<u64>,
    pub issue_repo: Option<String>,
    pub status: String,

    /// Status from the prior snapshot, absent if the item is new.
    pub previous_status: Option<String>,
}

/// Everything one cycle produced, in order.
#[derive(Debug, Clone, Serialize)]
pub struct PollResult {
    pub timestamp: Timestamp,
    pub events: Vec<TransitionEvent>,

    /// One entry per project that failed this cycle.
    pub errors: Vec<String>,
}

impl PollResult {
    /// Serializes to a single JSON line with keys in sorted order.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        // `serde_json::Map` is a `BTreeMap` here, so a round trip through
        // `Value` sorts every object's keys.
        let value = serde_json::to_value(self)?;
        serde_json::to_string(&value)
    }
}
