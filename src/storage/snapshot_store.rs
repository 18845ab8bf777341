//! File-backed snapshot of everything the watcher has seen.
//!
//! The store is a plain string-keyed map with no expiration. Two key families
//! are used:
//!
//! - `record:<id>` holds the last-known value of a record that has been seen
//! - `flag:first_run` holds whether the very first cycle is still pending
//!
//! Values are a closed enum, so a record entry always decodes back to `R`.
//! The whole map is loaded once at startup and written back wholesale; a
//! save goes to a sibling temp file first and is renamed over the target so
//! an interrupted write never clobbers the previous snapshot.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Key holding the first-run flag.
pub const FIRST_RUN_KEY: &str = "flag:first_run";
/// Prefix shared by all record keys.
pub const RECORD_KEY_PREFIX: &str = "record:";

const FORMAT_VERSION: u32 = 1;

/// Build the store key for a record id.
pub fn record_key(id: &str) -> String {
    format!("{}{}", RECORD_KEY_PREFIX, id)
}

/// Errors from loading or saving the state file.
#[derive(Debug, thiserror::Error)]
pub enum StoreIoError {
    #[error("Failed to read state file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse state file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported state file version {found} in '{}'", path.display())]
    UnsupportedVersion { path: PathBuf, found: u32 },

    #[error("Failed to encode state: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to write state file '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A value held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StoredValue<R> {
    Record(R),
    Flag(bool),
}

#[derive(Serialize, Deserialize)]
struct StateFile<E> {
    version: u32,
    entries: E,
}

/// Persistent key/value snapshot of previously seen records.
#[derive(Debug, Clone)]
pub struct SnapshotStore<R> {
    entries: BTreeMap<String, StoredValue<R>>,
    revision: u64,
}

impl<R> Default for SnapshotStore<R> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            revision: 0,
        }
    }
}

impl<R> SnapshotStore<R> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&StoredValue<R>> {
        self.entries.get(key)
    }

    /// Insert or replace a value.
    pub fn set(&mut self, key: impl Into<String>, value: StoredValue<R>) {
        self.entries.insert(key.into(), value);
        self.revision += 1;
    }

    /// Remove a key. Absent keys are ignored.
    ///
    /// Returns the removed value, if any.
    pub fn delete(&mut self, key: &str) -> Option<StoredValue<R>> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.revision += 1;
        }
        removed
    }

    /// Snapshot of all entries at call time. Order must not be relied upon.
    pub fn items(&self) -> Vec<(String, StoredValue<R>)>
    where
        R: Clone,
    {
        self.entries
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counter advanced by every effective mutation since load.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn record(&self, id: &str) -> Option<&R> {
        match self.entries.get(&record_key(id)) {
            Some(StoredValue::Record(record)) => Some(record),
            _ => None,
        }
    }

    pub fn put_record(&mut self, id: &str, record: R) {
        self.set(record_key(id), StoredValue::Record(record));
    }

    pub fn remove_record(&mut self, id: &str) -> Option<R> {
        match self.delete(&record_key(id)) {
            Some(StoredValue::Record(record)) => Some(record),
            _ => None,
        }
    }

    /// Ids of every tracked record.
    pub fn record_ids(&self) -> Vec<String> {
        self.entries
            .keys()
            .filter_map(|key| key.strip_prefix(RECORD_KEY_PREFIX))
            .map(str::to_string)
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.entries
            .keys()
            .filter(|key| key.starts_with(RECORD_KEY_PREFIX))
            .count()
    }

    /// Whether the first cycle is still pending. An absent flag counts as `true`.
    pub fn first_run(&self) -> bool {
        match self.entries.get(FIRST_RUN_KEY) {
            Some(StoredValue::Flag(flag)) => *flag,
            _ => true,
        }
    }

    pub fn set_first_run(&mut self, first_run: bool) {
        self.set(FIRST_RUN_KEY, StoredValue::Flag(first_run));
    }
}

impl<R: DeserializeOwned> SnapshotStore<R> {
    /// Load a store from `path`.
    ///
    /// A missing file yields an empty store.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StoreIoError> {
        let path = path.as_ref();

        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(file = %path.display(), "State file absent, starting empty");
                return Ok(Self::new());
            }
            Err(source) => {
                return Err(StoreIoError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let file: StateFile<BTreeMap<String, StoredValue<R>>> = serde_json::from_slice(&bytes)
            .map_err(|source| StoreIoError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        if file.version != FORMAT_VERSION {
            return Err(StoreIoError::UnsupportedVersion {
                path: path.to_path_buf(),
                found: file.version,
            });
        }

        Ok(Self {
            entries: file.entries,
            revision: 0,
        })
    }
}

impl<R: Serialize> SnapshotStore<R> {
    /// Write the store to `path`, replacing any previous file.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreIoError> {
        let path = path.as_ref();
        let write_err = |source| StoreIoError::Write {
            path: path.to_path_buf(),
            source,
        };

        let body = serde_json::to_vec_pretty(&StateFile {
            version: FORMAT_VERSION,
            entries: &self.entries,
        })
        .map_err(StoreIoError::Encode)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(write_err)?;
            }
        }

        // Write atomically using temp file + rename
        let temp_path = temp_path_for(path);
        let mut file = fs::File::create(&temp_path).await.map_err(write_err)?;
        file.write_all(&body).await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;
        drop(file);
        fs::rename(&temp_path, path).await.map_err(write_err)?;

        debug!(file = %path.display(), entries = self.entries.len(), "State saved");
        Ok(())
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}
