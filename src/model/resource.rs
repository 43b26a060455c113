//! Tracked resources: the GitHub projects being watched.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which kind of account owns a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerKind {
    Organization,
    User,
}

impl OwnerKind {
    /// The name used both in resource keys and as the GraphQL root field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::User => "user",
        }
    }

    /// Maps the first URL path segment (`orgs` / `users`) to an owner kind.
    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "orgs" => Some(Self::Organization),
            "users" => Some(Self::User),
            _ => None,
        }
    }
}

/// Snapshot partition key: `{owner_kind}:{owner}:{number}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKey(String);

impl ResourceKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ResourceKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A project URL that doesn't point at a user or organization project.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceUrlError {
    #[error("unrecognized project URL: {0}")]
    Unrecognized(String),

    #[error("unsupported project URL (expected /orgs/ or /users/): {0}")]
    UnsupportedScope(String),

    #[error("unsupported project URL (expected /projects/): {0}")]
    MissingProjects(String),

    #[error("invalid project number in URL: {0}")]
    InvalidNumber(String),
}

/// One GitHub project being watched, with its per-project overrides resolved.
///
/// Built fresh every cycle from configuration. Only its key survives into the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedResource {
    pub owner_kind: OwnerKind,
    pub owner: String,
    pub number: u64,

    /// The URL as written in the config, echoed back in events.
    pub url: String,

    /// Display name of the single-select field holding the status.
    pub status_field: String,

    /// Status value that triggers an event.
    pub target_status: String,
}

impl TrackedResource {
    /// Parses a project URL of the shape `/{orgs|users}/{owner}/projects/{number}`.
    ///
    /// Accepts full URLs (`https://github.com/orgs/acme/projects/3`) or bare paths.
    /// Trailing segments such as `/views/1` are ignored.
    pub fn from_url(
        url: &str,
        status_field: impl Into<String>,
        target_status: impl Into<String>,
    ) -> Result<Self, ResourceUrlError> {
        let path = url_path(url);
        let parts: Vec<&str> = path.trim_matches('/').split('/').collect();

        if parts.len() < 4 {
            return Err(ResourceUrlError::Unrecognized(url.to_string()));
        }
        let owner_kind = OwnerKind::from_segment(parts[0])
            .ok_or_else(|| ResourceUrlError::UnsupportedScope(url.to_string()))?;
        if parts[2] != "projects" {
            return Err(ResourceUrlError::MissingProjects(url.to_string()));
        }
        let number = parts[3]
            .parse()
            .map_err(|_| ResourceUrlError::InvalidNumber(url.to_string()))?;

        Ok(Self {
            owner_kind,
            owner: parts[1].to_string(),
            number,
            url: url.to_string(),
            status_field: status_field.into(),
            target_status: target_status.into(),
        })
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey(format!(
            "{}:{}:{}",
            self.owner_kind.as_str(),
            self.owner,
            self.number
        ))
    }
}

/// Strips scheme, host, query, and fragment, leaving only the path.
pub(crate) fn url_path(url: &str) -> &str {
    let path = match url.split_once("://") {
        Some((_, rest)) => rest.find('/').map_or("", |i| &rest[i..]),
        None => url,
    };
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}
