//! JSON-file backed preferences.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::debug;

use super::PreferenceStore;
use crate::error::{StoreError, StoreResult};

const TEMP_SUFFIX: &str = ".tmp";

/// Preferences persisted as a single JSON object on disk.
///
/// Every mutation rewrites the document through a sibling temp file followed
/// by a rename, so readers never observe a partially written file.
#[derive(Debug)]
pub struct JsonFilePreferences {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl JsonFilePreferences {
    /// Open (or lazily create) the preference file at `path`.
    ///
    /// A missing file yields an empty store; the file is created on first write.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or does not hold
    /// a JSON object.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<BTreeMap<String, Value>>(&bytes)
                .map_err(|source| StoreError::Parse {
                    path: path.clone(),
                    source,
                })?,
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(StoreError::Io {
                    operation: "prefs.read",
                    path,
                    source,
                });
            }
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate(&self, apply: impl FnOnce(&mut BTreeMap<String, Value>)) -> StoreResult<()> {
        let mut guard = self.lock();
        let mut next = guard.clone();
        apply(&mut next);
        self.write_document(&next)?;
        *guard = next;
        Ok(())
    }

    fn write_document(&self, entries: &BTreeMap<String, Value>) -> StoreResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                operation: "prefs.create_dir",
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let payload = serde_json::to_vec_pretty(entries).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;

        let mut temp = self.path.clone().into_os_string();
        temp.push(TEMP_SUFFIX);
        let temp = PathBuf::from(temp);

        fs::write(&temp, payload).map_err(|source| StoreError::Io {
            operation: "prefs.write",
            path: temp.clone(),
            source,
        })?;
        fs::rename(&temp, &self.path).map_err(|source| StoreError::Io {
            operation: "prefs.rename",
            path: self.path.clone(),
            source,
        })?;

        debug!(path = %self.path.display(), entries = entries.len(), "preferences written");
        Ok(())
    }
}

impl PreferenceStore for JsonFilePreferences {
    fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        self.mutate(|entries| {
            entries.insert(key.to_string(), value);
        })
    }

    fn clear(&self, key: &str) -> StoreResult<()> {
        if !self.lock().contains_key(key) {
            return Ok(());
        }
        self.mutate(|entries| {
            entries.remove(key);
        })
    }

    fn set_many(&self, batch: Vec<(&'static str, Value)>) -> StoreResult<()> {
        self.mutate(|entries| {
            for (key, value) in batch {
                entries.insert(key.to_string(), value);
            }
        })
    }
}
