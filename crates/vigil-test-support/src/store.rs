//! Preference store that counts writes.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;
use vigil_tracker::{MemoryPreferences, PreferenceStore, StoreResult};

/// In-memory store recording how many write operations reached it.
///
/// A batch written through `set_many` counts as one write.
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: MemoryPreferences,
    writes: AtomicUsize,
}

impl CountingStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a store pre-populated with `entries`; seeding is not counted.
    #[must_use]
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            inner: MemoryPreferences::with_entries(entries),
            writes: AtomicUsize::new(0),
        }
    }

    /// Write operations performed since construction.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Copy of every stored entry.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.inner.snapshot()
    }

    fn record(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl PreferenceStore for CountingStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        self.record();
        self.inner.set(key, value)
    }

    fn clear(&self, key: &str) -> StoreResult<()> {
        self.record();
        self.inner.clear(key)
    }

    fn set_many(&self, entries: Vec<(&'static str, Value)>) -> StoreResult<()> {
        self.record();
        self.inner.set_many(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vigil_tracker::keys;

    #[test]
    fn batches_count_once() {
        let store = CountingStore::with_entries([(keys::LAST_KNOWN_VERSION, json!(5))]);
        assert_eq!(store.writes(), 0);

        store
            .set_many(vec![
                (keys::LAST_KNOWN_VERSION, json!(7)),
                (keys::PROVIDER_OVERRIDES_VERSION, json!(7)),
            ])
            .expect("memory write");
        store.set_int(keys::ENABLE_SERVER_SUGGESTIONS, 1).expect("memory write");

        assert_eq!(store.writes(), 2);
        assert_eq!(store.get_int(keys::LAST_KNOWN_VERSION), Some(7));
        assert_eq!(store.snapshot().len(), 3);
    }
}
