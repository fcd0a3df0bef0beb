//! Versioned provider settings policy.
//!
//! Responses carry a JSON document plus a version code header. A document is
//! accepted only when its version is positive and differs from the last one
//! accepted, and when it holds a plausible provider override list. A second
//! header carries the server suggestion flag, which is recorded whenever a
//! versioned response arrives, accepted or not.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{Evaluation, Rejection, ResponsePolicy};
use crate::config::TrackerMode;
use crate::error::StoreResult;
use crate::fetch::FetchResponse;
use crate::store::{PreferenceStore, keys};

/// Header carrying the settings version code.
pub const VERSION_HEADER: &str = "se-version-code";

/// Header carrying the server suggestion flag.
pub const SUGGESTIONS_HEADER: &str = "se-enable-server-suggestions";

/// Document field holding the provider override list.
pub const OVERRIDES_FIELD: &str = "search_provider_overrides";

/// Bodies of this many bytes or fewer are never plausible.
pub const MIN_BODY_LEN: usize = 10;

/// Minimum number of overrides in an accepted list.
pub const MIN_OVERRIDES: usize = 2;

/// Version reported before anything has been accepted.
pub const UNKNOWN_VERSION: i64 = -1;

/// Tracked value: the accepted override list and its version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Version code of the accepted document, or [`UNKNOWN_VERSION`].
    pub version: i64,
    /// Override entries in server order.
    pub overrides: Vec<Value>,
}

impl ProviderSettings {
    /// Settings with no accepted document.
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            version: UNKNOWN_VERSION,
            overrides: Vec::new(),
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Policy for the provider settings tracker.
#[derive(Debug, Clone)]
pub struct VersionedSettingsPolicy {
    version_header: String,
    suggestions_header: String,
    overrides_field: String,
    min_body_len: usize,
    min_overrides: usize,
}

impl VersionedSettingsPolicy {
    /// Policy with the standard header names and thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version_header: VERSION_HEADER.to_string(),
            suggestions_header: SUGGESTIONS_HEADER.to_string(),
            overrides_field: OVERRIDES_FIELD.to_string(),
            min_body_len: MIN_BODY_LEN,
            min_overrides: MIN_OVERRIDES,
        }
    }

    /// Return the policy reading different header names.
    #[must_use]
    pub fn with_headers(
        mut self,
        version_header: impl Into<String>,
        suggestions_header: impl Into<String>,
    ) -> Self {
        self.version_header = version_header.into();
        self.suggestions_header = suggestions_header.into();
        self
    }

    /// Return the policy extracting overrides from a different field.
    #[must_use]
    pub fn with_overrides_field(mut self, field: impl Into<String>) -> Self {
        self.overrides_field = field.into();
        self
    }

    /// Return the policy with different plausibility thresholds.
    #[must_use]
    pub const fn with_thresholds(mut self, min_body_len: usize, min_overrides: usize) -> Self {
        self.min_body_len = min_body_len;
        self.min_overrides = min_overrides;
        self
    }

    /// Version code carried by `response`.
    ///
    /// A present but non-numeric header reads as [`UNKNOWN_VERSION`].
    fn version_code(&self, response: &FetchResponse) -> Option<i64> {
        response.header(&self.version_header)?;
        Some(
            response
                .int_header(&self.version_header)
                .unwrap_or(UNKNOWN_VERSION),
        )
    }

    fn extract_overrides(&self, body: &[u8]) -> Result<Vec<Value>, Rejection> {
        let document: Value =
            serde_json::from_slice(body).map_err(|_| Rejection::InvalidDocument)?;
        let Value::Object(mut root) = document else {
            return Err(Rejection::RootNotObject);
        };
        let Some(Value::Array(overrides)) = root.remove(&self.overrides_field) else {
            return Err(Rejection::MissingOverrides);
        };
        if overrides.is_empty() || overrides.len() < self.min_overrides {
            return Err(Rejection::TooFewOverrides {
                count: overrides.len(),
            });
        }
        Ok(overrides)
    }
}

impl Default for VersionedSettingsPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponsePolicy for VersionedSettingsPolicy {
    type Value = ProviderSettings;

    fn kind(&self) -> &'static str {
        "provider_settings"
    }

    fn initial_value(&self, mode: TrackerMode, store: &dyn PreferenceStore) -> ProviderSettings {
        if mode == TrackerMode::Fixed {
            return ProviderSettings::unknown();
        }
        ProviderSettings {
            version: store
                .get_int(keys::LAST_KNOWN_VERSION)
                .unwrap_or(UNKNOWN_VERSION),
            overrides: store
                .get_list(keys::PROVIDER_OVERRIDES)
                .unwrap_or_default(),
        }
    }

    fn evaluate(
        &self,
        current: &ProviderSettings,
        response: &FetchResponse,
    ) -> Evaluation<ProviderSettings> {
        let Some(version) = self.version_code(response) else {
            return Evaluation::Rejected(Rejection::MissingVersion);
        };
        if response.body.first() != Some(&b'{') {
            return Evaluation::Rejected(Rejection::NotStructured);
        }
        if version <= 0 {
            return Evaluation::Rejected(Rejection::NonPositiveVersion);
        }
        if version == current.version {
            return Evaluation::Unchanged;
        }
        if response.body.len() <= self.min_body_len {
            return Evaluation::Rejected(Rejection::BodyTooShort);
        }
        match self.extract_overrides(&response.body) {
            Ok(overrides) => Evaluation::Changed(ProviderSettings { version, overrides }),
            Err(rejection) => Evaluation::Rejected(rejection),
        }
    }

    fn persist(&self, value: &ProviderSettings, store: &dyn PreferenceStore) -> StoreResult<()> {
        store.set_many(vec![
            (keys::PROVIDER_OVERRIDES, Value::Array(value.overrides.clone())),
            (keys::PROVIDER_OVERRIDES_VERSION, Value::from(value.version)),
            (keys::LAST_KNOWN_VERSION, Value::from(value.version)),
        ])
    }

    fn record_side_channel(
        &self,
        response: &FetchResponse,
        store: &dyn PreferenceStore,
    ) -> StoreResult<()> {
        if response.header(&self.version_header).is_none() {
            return Ok(());
        }
        let Some(flag) = response.int_header(&self.suggestions_header) else {
            return Ok(());
        };
        debug!(flag, "recording server suggestion flag");
        store.set_int(keys::ENABLE_SERVER_SUGGESTIONS, flag)
    }
}
