//! dev-watch configuration.
//!
//! Loaded from `--config`, `$DEV_WATCH_CONFIG`, or `./dev.watch.json`.
//! JSON by default; a path ending in `.toml` is read as TOML with the same keys:
//!
//! ```json
//! {
//!   "projects": [
//!     { "url": "https://github.com/orgs/acme/projects/3" },
//!     { "url": "https://github.com/users/octocat/projects/1", "status_field": "Stage", "todo_status": "Ready" }
//!   ],
//!   "github_token_env": "GITHUB_TOKEN",
//!   "state_file": "~/.dev-watch/state.json",
//!   "poll_interval_seconds": 60,
//!   "emit_on_first_run": false,
//!   "loops_parallel": false
//! }
//! ```

use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::model::{ResourceUrlError, TrackedResource};
use crate::storage::SnapshotStore;

pub const DEFAULT_CONFIG_PATH: &str = "dev.watch.json";
pub const DEFAULT_STATUS_FIELD: &str = "Status";
pub const DEFAULT_TODO_STATUS: &str = "Todo";
pub const DEFAULT_TOKEN_ENV: &str = "GITHUB_TOKEN";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Action runner looked up next to the executable when none is configured.
pub const DEFAULT_ACTION_RUNNER: &str = "loops.sh";

/// Configuration problems.
///
/// Load and credential failures stop the process. `MissingUrl` and `Url`
/// are scoped to one project entry and only fail that entry.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("config is empty: {}", .0.display())]
    Empty(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid config at {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid config at {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("missing GitHub token in env var: {0}")]
    MissingCredential(String),

    #[error("could not determine home directory")]
    NoHome,

    #[error("project entry missing 'url'")]
    MissingUrl,

    #[error(transparent)]
    Url(#[from] ResourceUrlError),
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub projects: Vec<ProjectEntry>,

    /// Name of the env var holding the GitHub token.
    pub github_token_env: Option<String>,

    pub state_file: Option<String>,
    pub poll_interval_seconds: Option<u64>,

    /// Emit events for a project's very first poll instead of only recording it.
    #[serde(default)]
    pub emit_on_first_run: bool,

    /// Pass `--parallel` to the action runner.
    #[serde(default)]
    pub loops_parallel: bool,

    /// Path of the action runner script.
    pub action_command: Option<String>,
}

/// One watched project as written in the config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectEntry {
    pub url: Option<String>,
    pub status_field: Option<String>,
    pub todo_status: Option<String>,
}

impl ProjectEntry {
    /// Parses the entry into a tracked resource with defaults applied.
    pub fn resolve(&self) -> Result<TrackedResource, ConfigError> {
        let url = self.url.as_deref().ok_or(ConfigError::MissingUrl)?;
        let resource = TrackedResource::from_url(
            url,
            self.status_field.as_deref().unwrap_or(DEFAULT_STATUS_FIELD),
            self.todo_status.as_deref().unwrap_or(DEFAULT_TODO_STATUS),
        )?;
        Ok(resource)
    }
}

impl Config {
    /// Load config from `path`.
    ///
    /// A missing file, an unparseable file, or one with no content at all
    /// (empty file, `{}`, `null`) is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        if contents.trim().is_empty() {
            return Err(ConfigError::Empty(path.to_path_buf()));
        }

        if path.extension().is_some_and(|ext| ext == "toml") {
            Self::parse_toml(path, &contents)
        } else {
            Self::parse_json(path, &contents)
        }
    }

    fn parse_json(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let json_error = |source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        };

        let value: serde_json::Value = serde_json::from_str(contents).map_err(json_error)?;
        if value.is_null() || value.as_object().is_some_and(serde_json::Map::is_empty) {
            return Err(ConfigError::Empty(path.to_path_buf()));
        }
        serde_json::from_value(value).map_err(json_error)
    }

    fn parse_toml(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let toml_error = |source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        };

        let table: toml::Table = toml::from_str(contents).map_err(toml_error)?;
        if table.is_empty() {
            return Err(ConfigError::Empty(path.to_path_buf()));
        }
        toml::from_str(contents).map_err(toml_error)
    }

    /// The env var the GitHub token is read from.
    pub fn token_env(&self) -> &str {
        self.github_token_env
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_TOKEN_ENV)
    }

    /// Reads the GitHub token from the configured env var.
    pub fn credential(&self) -> Result<Credential, ConfigError> {
        Credential::from_env(self.token_env())
    }

    /// Where the snapshot lives: `state_file`, or `~/.dev-watch/state.json`.
    pub fn state_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.state_file {
            Some(path) => Ok(expand_path(path)),
            None => SnapshotStore::default_path().ok_or(ConfigError::NoHome),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval_seconds
            .map_or(DEFAULT_POLL_INTERVAL, Duration::from_secs)
    }

    /// The action runner: `action_command`, or `loops.sh` beside the executable.
    pub fn action_command(&self) -> PathBuf {
        if let Some(command) = &self.action_command {
            return expand_path(command);
        }
        env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_ACTION_RUNNER)))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ACTION_RUNNER))
    }
}

/// A GitHub token, passed explicitly to whatever talks to GitHub.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Reads a token from the env var `name`. Unset and empty are both missing.
    pub fn from_env(name: &str) -> Result<Self, ConfigError> {
        match env::var(name) {
            Ok(token) if !token.is_empty() => Ok(Self::new(token)),
            _ => Err(ConfigError::MissingCredential(name.to_string())),
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Expands a leading `~` and any `$VAR` / `${VAR}` references.
///
/// Unset variables are left as written.
pub fn expand_path(path: &str) -> PathBuf {
    let expanded = expand_vars(path, |name| env::var(name).ok());
    expand_home(&expanded, dirs::home_dir())
}

fn expand_home(path: &str, home: Option<PathBuf>) -> PathBuf {
    match (path.strip_prefix('~'), home) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) if rest.starts_with('/') => home.join(&rest[1..]),
        _ => PathBuf::from(path),
    }
}

fn expand_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        match (name.is_empty(), lookup(name)) {
            (false, Some(value)) => out.push_str(&value),
            _ => out.push_str(&rest[pos..=pos + consumed]),
        }
        rest = &after[consumed..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::model::OwnerKind;

    fn write_config(name: &str, contents: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    fn lookup(name: &str) -> Option<String> {
        match name {
            "HOME" => Some("/home/dev".into()),
            "STATE" => Some("state.json".into()),
            _ => None,
        }
    }

    #[test]
    fn loads_json_config() {
        let (_dir, path) = write_config(
            "dev.watch.json",
            r#"{
                "projects": [
                    { "url": "https://github.com/orgs/acme/projects/3" },
                    { "url": "https://github.com/users/octocat/projects/1", "status_field": "Stage", "todo_status": "Ready" }
                ],
                "github_token_env": "ACME_TOKEN",
                "poll_interval_seconds": 120,
                "emit_on_first_run": true,
                "loops_parallel": true
            }"#,
        );
        let config = Config::load(&path).unwrap();

        assert_eq!(config.projects.len(), 2);
        assert_eq!(config.token_env(), "ACME_TOKEN");
        assert_eq!(config.poll_interval(), Duration::from_secs(120));
        assert!(config.emit_on_first_run);
        assert!(config.loops_parallel);

        let second = config.projects[1].resolve().unwrap();
        assert_eq!(second.owner_kind, OwnerKind::User);
        assert_eq!(second.status_field, "Stage");
        assert_eq!(second.target_status, "Ready");
    }

    #[test]
    fn loads_toml_config() {
        let (_dir, path) = write_config(
            "dev.watch.toml",
            r#"
                poll_interval_seconds = 30

                [[projects]]
                url = "https://github.com/orgs/acme/projects/3"
            "#,
        );
        let config = Config::load(&path).unwrap();

        assert_eq!(config.projects.len(), 1);
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
    }

    #[test]
    fn defaults_apply() {
        let config = Config::default();

        assert_eq!(config.token_env(), DEFAULT_TOKEN_ENV);
        assert_eq!(config.poll_interval(), DEFAULT_POLL_INTERVAL);
        assert!(!config.emit_on_first_run);

        let entry = ProjectEntry {
            url: Some("https://github.com/orgs/acme/projects/3".into()),
            ..ProjectEntry::default()
        };
        let resource = entry.resolve().unwrap();
        assert_eq!(resource.status_field, "Status");
        assert_eq!(resource.target_status, "Todo");
    }

    #[test]
    fn missing_config_fails() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(&dir.path().join("nope.json")).unwrap_err();

        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn empty_config_fails() {
        for contents in ["", "  \n", "{}", "null"] {
            let (_dir, path) = write_config("dev.watch.json", contents);
            let err = Config::load(&path).unwrap_err();
            assert!(matches!(err, ConfigError::Empty(_)), "{contents:?}: {err}");
        }
    }

    #[test]
    fn invalid_json_fails() {
        let (_dir, path) = write_config("dev.watch.json", r#"{ "projects": "#);
        let err = Config::load(&path).unwrap_err();

        assert!(matches!(err, ConfigError::Json { .. }));
    }

    #[test]
    fn entry_without_url_fails() {
        let err = ProjectEntry::default().resolve().unwrap_err();
        assert_eq!(err.to_string(), "project entry missing 'url'");
    }

    #[test]
    fn entry_with_bad_url_fails() {
        let entry = ProjectEntry {
            url: Some("https://github.com/acme/widgets".into()),
            ..ProjectEntry::default()
        };
        let err = entry.resolve().unwrap_err();

        assert!(matches!(err, ConfigError::Url(_)));
    }

    #[test]
    fn missing_credential_names_the_env_var() {
        let config = Config {
            github_token_env: Some("DEV_WATCH_TEST_TOKEN_THAT_IS_NEVER_SET".into()),
            ..Config::default()
        };
        let err = config.credential().unwrap_err();

        assert_eq!(
            err.to_string(),
            "missing GitHub token in env var: DEV_WATCH_TEST_TOKEN_THAT_IS_NEVER_SET"
        );
    }

    #[test]
    fn credential_debug_hides_token() {
        let credential = Credential::new("ghp_secret");
        assert_eq!(format!("{credential:?}"), "Credential(***)");
        assert_eq!(credential.expose(), "ghp_secret");
    }

    #[test]
    fn configured_state_file_wins() {
        let config = Config {
            state_file: Some("/var/lib/dev-watch/state.json".into()),
            ..Config::default()
        };
        assert_eq!(
            config.state_path().unwrap(),
            PathBuf::from("/var/lib/dev-watch/state.json")
        );
    }

    #[test]
    fn expands_variables() {
        assert_eq!(expand_vars("$HOME/x", lookup), "/home/dev/x");
        assert_eq!(expand_vars("${HOME}/.w/$STATE", lookup), "/home/dev/.w/state.json");
        assert_eq!(expand_vars("$UNSET/x", lookup), "$UNSET/x");
        assert_eq!(expand_vars("${UNSET}/x", lookup), "${UNSET}/x");
        assert_eq!(expand_vars("cost: $5", lookup), "cost: $5");
        assert_eq!(expand_vars("trailing $", lookup), "trailing $");
        assert_eq!(expand_vars("${open", lookup), "${open");
    }

    #[test]
    fn expands_home() {
        let home = Some(PathBuf::from("/home/dev"));

        assert_eq!(
            expand_home("~/.dev-watch/state.json", home.clone()),
            PathBuf::from("/home/dev/.dev-watch/state.json")
        );
        assert_eq!(expand_home("~", home.clone()), PathBuf::from("/home/dev"));
        assert_eq!(expand_home("~other/x", home.clone()), PathBuf::from("~other/x"));
        assert_eq!(expand_home("/abs", home), PathBuf::from("/abs"));
    }
}
