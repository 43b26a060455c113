//! Durable snapshot of last-observed statuses.
//!
//! The whole snapshot lives in one JSON file:
//!
//! ```text
//! {
//!   "projects": {
//!     "organization:acme:3": { "<item id>": "<status>", ... },
//!     ...
//!   }
//! }
//! ```
//!
//! Loaded once at startup and rewritten at the end of every cycle.
//! Writes go through a temp file in the same directory and are renamed into
//! place, so a crash mid-save leaves the previous file intact.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::model::ResourceKey;

/// Item id → last observed status, for one project.
pub type StatusMap = BTreeMap<String, String>;

/// Errors that can occur while reading or writing the snapshot.
///
/// All of them are fatal: carrying on with an empty or partial snapshot
/// would replay events that were already emitted.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("invalid snapshot at {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to replace {path}: {source}")]
    Persist {
        path: PathBuf,
        source: tempfile::PersistError,
    },
}

pub type Result<T> = core::result::Result<T, StorageError>;

/// Last observed status of every item, partitioned by project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub projects: BTreeMap<ResourceKey, StatusMap>,
}

impl Snapshot {
    /// The prior statuses for a project, or `None` if it has never been polled.
    pub fn project(&self, key: &ResourceKey) -> Option<&StatusMap> {
        self.projects.get(key)
    }

    /// Replaces a project's statuses wholesale.
    pub fn replace_project(&mut self, key: ResourceKey, statuses: StatusMap) {
        self.projects.insert(key, statuses);
    }
}

/// File-backed home of the snapshot.
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the default state file: `~/.dev-watch/state.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".dev-watch").join("state.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the snapshot, or an empty one if the file doesn't exist yet.
    ///
    /// An empty file also counts as "no state". A file that exists but can't
    /// be parsed is an error, never silently reset.
    pub fn load(&self) -> Result<Snapshot> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Snapshot::default()),
            Err(e) => return Err(self.io_error(e)),
        };

        if contents.trim().is_empty() {
            return Ok(Snapshot::default());
        }

        serde_json::from_str(&contents).map_err(|source| StorageError::Json {
            path: self.path.clone(),
            source,
        })
    }

    /// Atomically replaces the snapshot file.
    ///
    /// The parent directory is created if it doesn't exist.
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;

        let mut json = serde_json::to_string_pretty(snapshot).map_err(|source| {
            StorageError::Json {
                path: self.path.clone(),
                source,
            }
        })?;
        json.push('\n');

        let mut temp = NamedTempFile::new_in(parent).map_err(|e| self.io_error(e))?;
        temp.write_all(json.as_bytes()).map_err(|e| self.io_error(e))?;
        temp.as_file().sync_all().map_err(|e| self.io_error(e))?;

        temp.persist(&self.path)
            .map_err(|source| StorageError::Persist {
                path: self.path.clone(),
                source,
            })?;
        Ok(())
    }

    fn io_error(&self, source: io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn test_store() -> (TempDir, SnapshotStore) {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("state").join("state.json"));
        (dir, store)
    }

    fn sample_snapshot() -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.replace_project(
            ResourceKey::from("organization:acme:3"),
            StatusMap::from([
                ("PVTI_a".to_string(), "Todo".to_string()),
                ("PVTI_b".to_string(), "Done".to_string()),
            ]),
        );
        snapshot.replace_project(ResourceKey::from("user:octocat:1"), StatusMap::new());
        snapshot
    }

    #[test]
    fn load_missing_file_is_empty() {
        let (_dir, store) = test_store();
        let snapshot = store.load().unwrap();

        assert!(snapshot.projects.is_empty());
    }

    #[test]
    fn load_empty_file_is_empty() {
        let (_dir, store) = test_store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "").unwrap();

        assert_eq!(store.load().unwrap(), Snapshot::default());
    }

    #[test]
    fn save_and_load_round_trip() {
        let (_dir, store) = test_store();
        let snapshot = sample_snapshot();

        store.save(&snapshot).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn save_creates_parent_directory() {
        let (_dir, store) = test_store();
        store.save(&Snapshot::default()).unwrap();

        assert!(store.path().is_file());
    }

    #[test]
    fn save_overwrites_previous_snapshot() {
        let (_dir, store) = test_store();
        store.save(&sample_snapshot()).unwrap();
        store.save(&Snapshot::default()).unwrap();

        assert!(store.load().unwrap().projects.is_empty());
    }

    #[test]
    fn save_leaves_no_temp_files_behind() {
        let (_dir, store) = test_store();
        store.save(&sample_snapshot()).unwrap();
        store.save(&sample_snapshot()).unwrap();

        let entries: Vec<_> = fs::read_dir(store.path().parent().unwrap())
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn saved_file_matches_documented_shape() {
        let (_dir, store) = test_store();
        store.save(&sample_snapshot()).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(json["projects"]["organization:acme:3"]["PVTI_a"], "Todo");
        assert_eq!(json["projects"]["user:octocat:1"], serde_json::json!({}));
    }

    #[test]
    fn keys_are_written_in_sorted_order() {
        let (_dir, store) = test_store();
        store.save(&sample_snapshot()).unwrap();

        let contents = fs::read_to_string(store.path()).unwrap();
        let a = contents.find("PVTI_a").unwrap();
        let b = contents.find("PVTI_b").unwrap();
        let org = contents.find("organization:acme:3").unwrap();
        let user = contents.find("user:octocat:1").unwrap();
        assert!(a < b);
        assert!(org < user);
    }

    #[test]
    fn load_accepts_state_without_projects_key() {
        let (_dir, store) = test_store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{}").unwrap();

        assert_eq!(store.load().unwrap(), Snapshot::default());
    }

    #[test]
    fn load_corrupt_file_fails() {
        let (_dir, store) = test_store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{\"projects\": ").unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, StorageError::Json { .. }));
    }

    #[test]
    fn unknown_project_is_none() {
        let snapshot = sample_snapshot();

        assert!(snapshot.project(&ResourceKey::from("user:nobody:9")).is_none());
        assert!(snapshot.project(&ResourceKey::from("user:octocat:1")).is_some());
    }
}
