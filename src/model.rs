//! Core data model for dev-watch.
//!
//! These types carry a poll cycle end to end: the projects being watched,
//! the items read from them, and the transitions reported downstream.

mod event;
mod item;
mod resource;

pub use event::{PollResult, TransitionEvent};
pub use item::Item;
pub use resource::{OwnerKind, ResourceKey, ResourceUrlError, TrackedResource};
pub(crate) use resource::url_path;

/// Case-insensitive comparison used for field names and status values.
///
/// Upper-casing first expands characters like `ß` to `SS`, so the result
/// folds the way Unicode full case folding does for them.
pub fn eq_casefold(a: &str, b: &str) -> bool {
    fold(a) == fold(b)
}

fn fold(s: &str) -> String {
    s.to_uppercase().to_lowercase()
}
