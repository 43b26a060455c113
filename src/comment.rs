//! Issue comments: post a message to a GitHub issue or pull request.
//!
//! Used by whatever the action runner starts to report back on the issue
//! that triggered it. The body comes from `--message`, `--message-file`, or
//! stdin; the result is one JSON line with the new comment's URL.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::config::Credential;
use crate::model::url_path;
use crate::observe::{TransportError, run_gh};
use crate::process::COMMAND_TIMEOUT;

#[derive(Debug, thiserror::Error)]
pub enum CommentError {
    #[error("provide either --message or --message-file, not both")]
    ConflictingMessage,

    #[error("missing comment body: provide --message, --message-file, or stdin")]
    MissingMessage,

    #[error("failed to read {}: {source}", path.display())]
    ReadMessage { path: PathBuf, source: io::Error },

    #[error("failed to read stdin: {0}")]
    ReadStdin(io::Error),

    #[error("unrecognized issue URL: {0}")]
    UnrecognizedUrl(String),

    #[error("unsupported issue URL (expected /issues/ or /pull/): {0}")]
    UnsupportedKind(String),

    #[error("invalid issue number in URL: {0}")]
    InvalidNumber(String),

    #[error(transparent)]
    Post(#[from] TransportError),
}

impl CommentError {
    /// Bad input, as opposed to GitHub rejecting a well-formed request.
    pub fn is_usage(&self) -> bool {
        !matches!(self, Self::Post(_))
    }
}

/// An issue or pull request, addressed the way the REST API wants it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl IssueRef {
    /// Parses `https://github.com/{owner}/{repo}/{issues|pull}/{number}`.
    ///
    /// Trailing segments, query, and fragment are ignored.
    pub fn from_url(url: &str) -> Result<Self, CommentError> {
        let parts: Vec<&str> = url_path(url).trim_matches('/').split('/').collect();
        if parts.len() < 4 {
            return Err(CommentError::UnrecognizedUrl(url.to_string()));
        }
        if !matches!(parts[2], "issues" | "pull") {
            return Err(CommentError::UnsupportedKind(url.to_string()));
        }
        let number = parts[3]
            .parse()
            .map_err(|_| CommentError::InvalidNumber(url.to_string()))?;

        Ok(Self {
            owner: parts[0].to_string(),
            repo: parts[1].to_string(),
            number,
        })
    }
}

/// Picks the comment body: `message`, else `message_file`, else `stdin`.
///
/// Whitespace is trimmed from either end. Both sources at once, or nothing
/// but whitespace, is an error.
pub fn resolve_message(
    message: Option<&str>,
    message_file: Option<&Path>,
    mut stdin: impl Read,
) -> Result<String, CommentError> {
    let body = match (message, message_file) {
        (Some(_), Some(_)) => return Err(CommentError::ConflictingMessage),
        (Some(message), None) => message.trim().to_string(),
        (None, Some(path)) => fs::read_to_string(path)
            .map_err(|source| CommentError::ReadMessage {
                path: path.to_path_buf(),
                source,
            })?
            .trim()
            .to_string(),
        (None, None) => {
            let mut buf = String::new();
            stdin
                .read_to_string(&mut buf)
                .map_err(CommentError::ReadStdin)?;
            buf.trim().to_string()
        }
    };

    if body.is_empty() {
        return Err(CommentError::MissingMessage);
    }
    Ok(body)
}

/// Posts issue comments with `gh api`.
pub struct Commenter {
    credential: Credential,
    program: PathBuf,
    timeout: Duration,
}

impl Commenter {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            program: PathBuf::from("gh"),
            timeout: COMMAND_TIMEOUT,
        }
    }

    /// Posts `body` on `issue`, returning the new comment's URL if GitHub sent one.
    pub fn post(&self, issue: &IssueRef, body: &str) -> Result<Option<String>, CommentError> {
        let finished = run_gh(
            &self.program,
            &self.credential,
            &comment_args(issue, body),
            self.timeout,
        )?;
        if !finished.status.success() {
            return Err(TransportError::Command(finished.stderr_text()).into());
        }

        let created: CreatedComment =
            serde_json::from_slice(&finished.stdout).map_err(TransportError::from)?;
        Ok(created.html_url)
    }
}

#[derive(Deserialize)]
struct CreatedComment {
    html_url: Option<String>,
}

fn comment_args(issue: &IssueRef, body: &str) -> Vec<String> {
    vec![
        "api".to_string(),
        format!(
            "repos/{}/{}/issues/{}/comments",
            issue.owner, issue.repo, issue.number
        ),
        "--method".to_string(),
        "POST".to_string(),
        "-f".to_string(),
        format!("body={body}"),
    ]
}

/// The JSON line printed after posting.
pub fn output_line(comment_url: Option<&str>) -> String {
    serde_json::json!({ "comment_url": comment_url }).to_string()
}
