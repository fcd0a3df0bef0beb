//! Durable key-value preferences consumed by trackers.
//!
//! Values are plain `serde_json::Value`s so string, integer, and list
//! preferences share one storage contract. Each tracker exclusively owns the
//! keys it writes; other components read tracked values through the tracker
//! accessor rather than through the store.

mod file;

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::error::StoreResult;

pub use file::JsonFilePreferences;

/// Persisted preference key names.
pub mod keys {
    /// Last accepted tracked value (canonical URL string).
    pub const LAST_KNOWN_VALUE: &str = "last_known_value";
    /// Value last shown to the user; reserved for UI layers.
    pub const LAST_PROMPTED_VALUE: &str = "last_prompted_value";
    /// Last accepted settings version (versioned policy only).
    pub const LAST_KNOWN_VERSION: &str = "last_known_version";
    /// Ordered list of provider override objects.
    pub const PROVIDER_OVERRIDES: &str = "provider_overrides";
    /// Version of the persisted provider override list.
    pub const PROVIDER_OVERRIDES_VERSION: &str = "provider_overrides_version";
    /// Server-side suggestion flag delivered through a response header.
    pub const ENABLE_SERVER_SUGGESTIONS: &str = "enable_server_suggestions";
}

/// Synchronous, durable key-value storage.
pub trait PreferenceStore: Send + Sync {
    /// Fetch the raw value stored under `key`.
    fn get(&self, key: &str) -> Option<Value>;

    /// Store `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be made durable.
    fn set(&self, key: &str, value: Value) -> StoreResult<()>;

    /// Remove `key` entirely.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal cannot be made durable.
    fn clear(&self, key: &str) -> StoreResult<()>;

    /// Write several entries as one unit.
    ///
    /// The default implementation writes entries one at a time; stores with a
    /// single backing document override it to write once.
    ///
    /// # Errors
    ///
    /// Returns an error if any entry cannot be made durable.
    fn set_many(&self, entries: Vec<(&'static str, Value)>) -> StoreResult<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// String preference, if present and a string.
    fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    /// Integer preference, if present and representable as `i64`.
    fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|value| value.as_i64())
    }

    /// List preference, if present and an array.
    fn get_list(&self, key: &str) -> Option<Vec<Value>> {
        match self.get(key)? {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Store a string preference.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be made durable.
    fn set_string(&self, key: &str, value: &str) -> StoreResult<()> {
        self.set(key, Value::String(value.to_string()))
    }

    /// Store an integer preference.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be made durable.
    fn set_int(&self, key: &str, value: i64) -> StoreResult<()> {
        self.set(key, Value::from(value))
    }

    /// Store a list preference.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be made durable.
    fn set_list(&self, key: &str, items: Vec<Value>) -> StoreResult<()> {
        self.set(key, Value::Array(items))
    }
}

/// In-memory store; durable only for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryPreferences {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a store pre-populated with `entries`.
    #[must_use]
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(key, value)| (key.into(), value))
            .collect();
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Copy of every stored entry.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        self.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn clear(&self, key: &str) -> StoreResult<()> {
        self.lock().remove(key);
        Ok(())
    }
}
