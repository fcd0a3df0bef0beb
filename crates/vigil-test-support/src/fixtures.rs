//! Test fixtures and scheduling helpers.

use std::time::Duration;

use serde_json::{Value, json};
use url::Url;
use vigil_tracker::policy::versioned::{SUGGESTIONS_HEADER, VERSION_HEADER};
use vigil_tracker::{FetchResponse, TrackerConfig};

/// Check URL used by settings tracker suites.
pub const SETTINGS_CHECK_URL: &str = "https://settings.example.net/search/recommended";

/// Domain tracker configuration with the production check URL.
///
/// # Panics
///
/// Panics if the built-in preset fails to parse.
#[must_use]
pub fn domain_config() -> TrackerConfig {
    TrackerConfig::canonical_domain().expect("built-in domain preset parses")
}

/// Provider settings configuration pointing at [`SETTINGS_CHECK_URL`].
///
/// # Panics
///
/// Panics if the fixture URL fails to parse.
#[must_use]
pub fn settings_config() -> TrackerConfig {
    TrackerConfig::provider_settings(Url::parse(SETTINGS_CHECK_URL).expect("fixture url parses"))
}

/// A provider override entry carrying every required field.
#[must_use]
pub fn provider_entry(name: &str, id: i64) -> Value {
    json!({
        "name": name,
        "keyword": name.to_ascii_lowercase(),
        "search_url": format!("https://{}.example/search?q={{searchTerms}}", name.to_ascii_lowercase()),
        "favicon_url": format!("https://{}.example/favicon.ico", name.to_ascii_lowercase()),
        "encoding": "UTF-8",
        "id": id
    })
}

/// Settings document holding `entries` under the override list field.
#[must_use]
pub fn settings_body(entries: &[Value]) -> String {
    json!({ "search_provider_overrides": entries }).to_string()
}

/// Settings response with a version header.
#[must_use]
pub fn versioned_response(body: impl Into<Vec<u8>>, version: i64) -> FetchResponse {
    FetchResponse::from_body(body).with_header(VERSION_HEADER, version.to_string())
}

/// Settings response with version and suggestion flag headers.
#[must_use]
pub fn flagged_response(body: impl Into<Vec<u8>>, version: i64, flag: i64) -> FetchResponse {
    versioned_response(body, version).with_header(SUGGESTIONS_HEADER, flag.to_string())
}

/// Let every runnable task progress until the runtime is idle.
///
/// Intended for paused-clock tests: the short sleep only completes once all
/// other tasks are parked, advancing virtual time by one millisecond.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_entries_are_complete_overrides() {
        let entry = provider_entry("Alpha", 3);
        let parsed = vigil_tracker::ProviderOverride::from_entry(&entry).expect("entry parses");
        assert_eq!(parsed.keyword, "alpha");
        assert_eq!(parsed.id, 3);
    }

    #[test]
    fn versioned_responses_carry_headers() {
        let response = flagged_response("{}", 7, 1);
        assert_eq!(response.int_header(VERSION_HEADER), Some(7));
        assert_eq!(response.int_header(SUGGESTIONS_HEADER), Some(1));
        assert!(settings_body(&[]).contains("search_provider_overrides"));
        assert_eq!(settings_config().check_url.as_str(), SETTINGS_CHECK_URL);
        assert_eq!(domain_config().name, "canonical_domain");
    }
}
