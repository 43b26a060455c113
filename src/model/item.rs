//! Items: the issues read from a project during one cycle.

/// One issue-backed item inside a project.
///
/// Rebuilt every cycle. Only `id → status` survives into the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Project item node id, stable within the project.
    pub id: String,

    /// Value of the status field, if the item has one.
    pub status: Option<String>,

    pub title: Option<String>,
    pub url: String,

    /// Owning repository as `owner/name`.
    pub repo: Option<String>,

    /// Issue number within its repository.
    pub number: Option<u64>,
}
