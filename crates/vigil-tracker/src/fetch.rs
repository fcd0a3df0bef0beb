//! Fetch channel contract and the `reqwest` backed implementation.
//!
//! A tracker never holds more than one fetch in flight. The owner task runs
//! each fetch as its own task and keeps only the abort handle, so cancelling a
//! fetch both releases the channel's resources and guarantees the completion
//! is never applied.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, HeaderValue, PRAGMA};
use tracing::debug;
use url::Url;

use crate::error::FetchError;

/// Default network timeout applied by [`HttpFetchChannel`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("vigil-tracker/", env!("CARGO_PKG_VERSION"));

/// Description of a single fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Endpoint to query.
    pub url: Url,
    /// Skip any intermediate caches.
    pub bypass_cache: bool,
}

impl FetchRequest {
    /// Request for `url` that bypasses caches.
    #[must_use]
    pub const fn new(url: Url) -> Self {
        Self {
            url,
            bypass_cache: true,
        }
    }
}

/// Raw response delivered by a fetch channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResponse {
    /// Response body bytes.
    pub body: Vec<u8>,
    /// Response headers keyed by lower-cased name.
    pub headers: BTreeMap<String, String>,
}

impl FetchResponse {
    /// Response with `body` and no headers.
    #[must_use]
    pub fn from_body(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Return the response with an additional header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Header value parsed as an integer; `None` when absent or not numeric.
    #[must_use]
    pub fn int_header(&self, name: &str) -> Option<i64> {
        self.header(name)?.trim().parse().ok()
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Performs network requests on behalf of a tracker.
#[async_trait]
pub trait FetchChannel: Send + Sync {
    /// Perform `request` and resolve with the response or a failure.
    ///
    /// Implementations own their network-level timeout and report it as an
    /// ordinary failure.
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// HTTP fetch channel built on `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetchChannel {
    client: reqwest::Client,
}

impl HttpFetchChannel {
    /// Build a channel with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Build a channel with a custom request timeout.
    ///
    /// Cookies are never stored or sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|source| FetchError::Transport {
                url: String::new(),
                source,
            })?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    #[must_use]
    pub const fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FetchChannel for HttpFetchChannel {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let url = request.url.to_string();
        let mut builder = self.client.get(request.url);
        if request.bypass_cache {
            builder = builder
                .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
                .header(PRAGMA, HeaderValue::from_static("no-cache"));
        }

        let response = builder
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?
            .to_vec();

        debug!(%url, bytes = body.len(), "fetch completed");
        Ok(FetchResponse { body, headers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let response = FetchResponse::from_body("{}")
            .with_header("SE-Version-Code", "12")
            .with_header("x-note", "hello");
        assert_eq!(response.header("se-version-code"), Some("12"));
        assert_eq!(response.int_header("SE-VERSION-CODE"), Some(12));
        assert_eq!(response.int_header("x-note"), None);
        assert_eq!(response.int_header("missing"), None);
    }

    #[test]
    fn body_text_tolerates_invalid_utf8() {
        let response = FetchResponse::from_body(vec![b'.', 0xff, b'x']);
        assert_eq!(response.body_text(), ".\u{fffd}x");
    }

    #[test]
    fn requests_bypass_cache_by_default() {
        let url = Url::parse("https://example.net/check").expect("valid url");
        assert!(FetchRequest::new(url).bypass_cache);
    }
}
