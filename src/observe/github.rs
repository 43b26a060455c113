//! GitHub Projects (v2) items via `gh api graphql`.
//!
//! The token is handed to `gh` explicitly as `GH_TOKEN`, so nothing here
//! depends on whatever `gh auth` state the host happens to have. Other
//! GitHub calls (issue comments) go through the same [`run_gh`].

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use super::{Page, PageSource, TransportError};
use crate::config::Credential;
use crate::model::{OwnerKind, TrackedResource};
use crate::process::{self, COMMAND_TIMEOUT, Finished, RunError};

/// Page source backed by the `gh` CLI.
pub struct GhGraphql {
    credential: Credential,
    program: PathBuf,
    timeout: Duration,
}

impl GhGraphql {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            program: PathBuf::from("gh"),
            timeout: COMMAND_TIMEOUT,
        }
    }
}

impl PageSource for GhGraphql {
    fn fetch_page(
        &self,
        resource: &TrackedResource,
        after: Option<&str>,
    ) -> Result<Page, TransportError> {
        let mut args = vec![
            "api".to_string(),
            "graphql".to_string(),
            "-f".to_string(),
            format!("query={}", items_query(resource.owner_kind)),
            "-f".to_string(),
            format!("owner={}", resource.owner),
            "-F".to_string(),
            format!("number={}", resource.number),
        ];
        if let Some(cursor) = after {
            args.push("-f".to_string());
            args.push(format!("after={cursor}"));
        }

        let finished = run_gh(&self.program, &self.credential, &args, self.timeout)?;

        // GraphQL errors come back as a JSON body with a failing exit status,
        // so look at the body before the status.
        match parse_page(resource, &finished.stdout) {
            Err(TransportError::Decode(_)) if !finished.status.success() => {
                Err(TransportError::Command(finished.stderr_text()))
            }
            result => result,
        }
    }
}

/// Runs `gh` with the credential as `GH_TOKEN`, capturing its output.
///
/// A non-zero exit is not an error here; callers decide from the body.
pub(crate) fn run_gh(
    program: &Path,
    credential: &Credential,
    args: &[String],
    timeout: Duration,
) -> Result<Finished, TransportError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .env("GH_TOKEN", credential.expose())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    process::run_with_timeout(&mut command, timeout).map_err(|e| match e {
        RunError::Spawn(e) | RunError::Wait(e) => TransportError::Spawn(e),
        RunError::TimedOut(d) => TransportError::TimedOut(d),
    })
}

/// The items query for a project owned by an organization or a user.
fn items_query(owner_kind: OwnerKind) -> String {
    format!(
        r"query($owner: String!, $number: Int!, $after: String) {{
  {owner}(login: $owner) {{
    projectV2(number: $number) {{
      id
      title
      items(first: 100, after: $after) {{
        nodes {{
          id
          content {{
            __typename
            ... on Issue {{
              id
              url
              title
              number
              repository {{
                nameWithOwner
              }}
            }}
          }}
          fieldValues(first: 20) {{
            nodes {{
              __typename
              ... on ProjectV2ItemFieldSingleSelectValue {{
                name
                field {{
                  __typename
                  ... on ProjectV2SingleSelectField {{
                    name
                  }}
                }}
              }}
            }}
          }}
        }}
        pageInfo {{
          hasNextPage
          endCursor
        }}
      }}
    }}
  }}
}}",
        owner = owner_kind.as_str()
    )
}

// ── Response shapes ──

#[derive(Deserialize)]
struct Response {
    data: Option<Data>,
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Deserialize)]
struct Data {
    organization: Option<Owner>,
    user: Option<Owner>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Owner {
    project_v2: Option<Project>,
}

#[derive(Deserialize)]
struct Project {
    title: Option<String>,
    items: ItemConnection,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemConnection {
    nodes: Option<Vec<Value>>,
    page_info: PageInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

/// Decodes one GraphQL response body into a page.
fn parse_page(resource: &TrackedResource, body: &[u8]) -> Result<Page, TransportError> {
    let response: Response = serde_json::from_slice(body)?;

    if let Some(errors) = response.errors.filter(|e| !e.is_empty()) {
        let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
        return Err(TransportError::Upstream(messages.join("; ")));
    }

    let owner = response.data.and_then(|data| match resource.owner_kind {
        OwnerKind::Organization => data.organization,
        OwnerKind::User => data.user,
    });
    let Some(project) = owner.and_then(|o| o.project_v2) else {
        return Err(TransportError::ProjectNotFound {
            owner_kind: resource.owner_kind.as_str(),
            owner: resource.owner.clone(),
            number: resource.number,
        });
    };

    let next_cursor = if project.items.page_info.has_next_page {
        Some(
            project
                .items
                .page_info
                .end_cursor
                .ok_or(TransportError::MissingCursor)?,
        )
    } else {
        None
    };

    Ok(Page {
        project_title: project.title,
        records: project.items.nodes.unwrap_or_default(),
        next_cursor,
    })
}
