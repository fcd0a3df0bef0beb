//! Tracker configuration and presets.
//!
//! # Design
//! - Presets carry the delays observed for each tracked payload.
//! - `from_value` validates loosely typed documents (for example a section of a
//!   host configuration file) into a typed `TrackerConfig`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::{TrackerError, TrackerResult};

/// Endpoint answering with the canonical search domain suffix.
pub const DOMAIN_CHECK_URL: &str =
    "https://www.google.com/searchdomaincheck?format=domain&type=chrome";

/// Startup delay for the canonical domain tracker.
pub const DOMAIN_STARTUP_DELAY: Duration = Duration::from_secs(5);

/// Startup delay for the provider settings tracker.
pub const SETTINGS_STARTUP_DELAY: Duration = Duration::from_secs(7);

/// Operating mode for a tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerMode {
    /// Schedule the startup timer and fetch on demand.
    #[default]
    Normal,
    /// Pin the value to the policy default; never schedule or fetch on its own.
    Fixed,
}

impl TrackerMode {
    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Fixed => "fixed",
        }
    }
}

/// Runtime configuration for a single tracker instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Name recorded in logs and spans.
    pub name: String,
    /// Operating mode.
    #[serde(default)]
    pub mode: TrackerMode,
    /// Delay between construction and the end of the startup sleep.
    #[serde(rename = "startup_delay_ms", with = "duration_ms")]
    pub startup_delay: Duration,
    /// Endpoint queried on each fetch.
    pub check_url: Url,
}

impl TrackerConfig {
    /// Build a configuration in normal mode.
    #[must_use]
    pub fn new(name: impl Into<String>, startup_delay: Duration, check_url: Url) -> Self {
        Self {
            name: name.into(),
            mode: TrackerMode::Normal,
            startup_delay,
            check_url,
        }
    }

    /// Preset for the canonical search domain tracker.
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in check URL fails to parse.
    pub fn canonical_domain() -> TrackerResult<Self> {
        let url = parse_url("check_url", DOMAIN_CHECK_URL)?;
        Ok(Self::new("canonical_domain", DOMAIN_STARTUP_DELAY, url))
    }

    /// Preset for the versioned provider settings tracker.
    #[must_use]
    pub fn provider_settings(check_url: Url) -> Self {
        Self::new("provider_settings", SETTINGS_STARTUP_DELAY, check_url)
    }

    /// Return the configuration with `mode` applied.
    #[must_use]
    pub fn with_mode(mut self, mode: TrackerMode) -> Self {
        self.mode = mode;
        self
    }

    /// Return the configuration with a different startup delay.
    #[must_use]
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Validate a loosely typed document into a configuration.
    ///
    /// Missing `mode` defaults to normal; `name` and `check_url` are required;
    /// `startup_delay_ms` falls back to `default_delay`.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::InvalidConfig` naming the first offending field.
    pub fn from_value(value: &Value, default_delay: Duration) -> TrackerResult<Self> {
        let map = value.as_object().ok_or(TrackerError::InvalidConfig {
            field: "tracker",
            reason: "must be an object",
            value: None,
        })?;

        let name = map
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| TrackerError::InvalidConfig {
                field: "name",
                reason: "must be a non-empty string",
                value: map.get("name").map(Value::to_string),
            })?;

        let mode = match map.get("mode") {
            None | Some(Value::Null) => TrackerMode::Normal,
            Some(Value::String(raw)) => parse_mode(raw)?,
            Some(other) => {
                return Err(TrackerError::InvalidConfig {
                    field: "mode",
                    reason: "must be a string",
                    value: Some(other.to_string()),
                });
            }
        };

        let startup_delay = match map.get("startup_delay_ms") {
            None | Some(Value::Null) => default_delay,
            Some(raw) => raw
                .as_u64()
                .map(Duration::from_millis)
                .ok_or_else(|| TrackerError::InvalidConfig {
                    field: "startup_delay_ms",
                    reason: "must be a non-negative integer",
                    value: Some(raw.to_string()),
                })?,
        };

        let raw_url = map
            .get("check_url")
            .and_then(Value::as_str)
            .ok_or_else(|| TrackerError::InvalidConfig {
                field: "check_url",
                reason: "must be a string",
                value: map.get("check_url").map(Value::to_string),
            })?;
        let check_url = parse_url("check_url", raw_url)?;
        if !matches!(check_url.scheme(), "http" | "https") {
            return Err(TrackerError::InvalidConfig {
                field: "check_url",
                reason: "must use http or https",
                value: Some(raw_url.to_string()),
            });
        }

        Ok(Self {
            name: name.to_string(),
            mode,
            startup_delay,
            check_url,
        })
    }
}

fn parse_mode(raw: &str) -> TrackerResult<TrackerMode> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "normal" => Ok(TrackerMode::Normal),
        "fixed" => Ok(TrackerMode::Fixed),
        _ => Err(TrackerError::InvalidConfig {
            field: "mode",
            reason: "must be 'normal' or 'fixed'",
            value: Some(raw.to_string()),
        }),
    }
}

fn parse_url(field: &'static str, raw: &str) -> TrackerResult<Url> {
    Url::parse(raw).map_err(|_| TrackerError::InvalidConfig {
        field,
        reason: "must be an absolute URL",
        value: Some(raw.to_string()),
    })
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
