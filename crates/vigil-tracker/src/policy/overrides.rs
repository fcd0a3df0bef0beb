//! Read path for persisted search provider overrides.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::StoreResult;
use crate::store::{PreferenceStore, keys};

/// Typed view of one persisted provider override entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOverride {
    /// Display name.
    pub name: String,
    /// Omnibox keyword.
    pub keyword: String,
    /// Search URL template.
    pub search_url: String,
    /// Suggestion URL template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggest_url: Option<String>,
    /// Favicon location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon_url: Option<String>,
    /// Input encoding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    /// Provider identifier.
    pub id: i64,
}

impl ProviderOverride {
    /// Parse one list entry; `None` when it is not an object or lacks a
    /// required field.
    #[must_use]
    pub fn from_entry(entry: &Value) -> Option<Self> {
        if !entry.is_object() {
            return None;
        }
        serde_json::from_value(entry.clone()).ok()
    }
}

/// Overrides currently persisted, skipping unusable entries.
#[must_use]
pub fn stored_provider_overrides(store: &dyn PreferenceStore) -> Vec<ProviderOverride> {
    let Some(entries) = store.get_list(keys::PROVIDER_OVERRIDES) else {
        return Vec::new();
    };
    let total = entries.len();
    let parsed: Vec<ProviderOverride> = entries
        .iter()
        .filter_map(ProviderOverride::from_entry)
        .collect();
    if parsed.len() != total {
        debug!(
            total,
            usable = parsed.len(),
            "skipped unusable provider override entries"
        );
    }
    parsed
}

/// Data version of the effective provider list: the persisted override
/// version when present, otherwise `builtin`.
#[must_use]
pub fn overrides_data_version(store: &dyn PreferenceStore, builtin: i64) -> i64 {
    store
        .get_int(keys::PROVIDER_OVERRIDES_VERSION)
        .unwrap_or(builtin)
}

/// Remove the persisted override list and its version.
///
/// # Errors
///
/// Returns an error if the store rejects either removal.
pub fn clear_provider_overrides(store: &dyn PreferenceStore) -> StoreResult<()> {
    store.clear(keys::PROVIDER_OVERRIDES)?;
    store.clear(keys::PROVIDER_OVERRIDES_VERSION)
}
