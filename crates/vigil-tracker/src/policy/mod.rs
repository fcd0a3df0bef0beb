//! Payload-specific validation policies.
//!
//! A policy turns a raw fetch response into an [`Evaluation`] without touching
//! any state; only [`ResponsePolicy::persist`] (called after acceptance) and
//! the optional side channel write to the store.

pub mod domain;
pub mod overrides;
pub mod versioned;

use std::fmt::Debug;

use thiserror::Error;

use crate::config::TrackerMode;
use crate::error::StoreResult;
use crate::fetch::FetchResponse;
use crate::store::PreferenceStore;

pub use domain::DomainPolicy;
pub use overrides::{
    ProviderOverride, clear_provider_overrides, overrides_data_version, stored_provider_overrides,
};
pub use versioned::{ProviderSettings, VersionedSettingsPolicy};

/// Outcome of validating one response against the current value.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation<V> {
    /// Valid and different from the current value.
    Changed(V),
    /// Valid and identical to the current value.
    Unchanged,
    /// Malformed or semantically invalid.
    Rejected(Rejection),
}

/// Reason a response was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Body does not start with the expected domain marker.
    #[error("response missing domain marker")]
    MissingMarker,
    /// Candidate URL failed to parse.
    #[error("candidate url invalid")]
    InvalidUrl,
    /// Candidate URL carries a path beyond the root.
    #[error("candidate url has a path")]
    UnexpectedPath,
    /// Candidate URL carries a query string.
    #[error("candidate url has a query")]
    UnexpectedQuery,
    /// Candidate URL carries a fragment.
    #[error("candidate url has a fragment")]
    UnexpectedFragment,
    /// Candidate URL uses a non-standard port.
    #[error("candidate url uses a non-standard port")]
    NonStandardPort,
    /// Candidate host is not an accepted parent domain.
    #[error("candidate host not allowed")]
    ForeignDomain,
    /// Version header absent.
    #[error("version header missing")]
    MissingVersion,
    /// Version header is not a positive integer.
    #[error("version not positive")]
    NonPositiveVersion,
    /// Body does not open a structured document.
    #[error("body is not a structured document")]
    NotStructured,
    /// Body is too short to hold a plausible document.
    #[error("body too short")]
    BodyTooShort,
    /// Body failed to parse as JSON.
    #[error("body failed to parse")]
    InvalidDocument,
    /// Document root is not a keyed mapping.
    #[error("document root is not an object")]
    RootNotObject,
    /// Override list field absent or not a list.
    #[error("override list missing")]
    MissingOverrides,
    /// Override list shorter than required.
    #[error("override list too short")]
    TooFewOverrides {
        /// Number of entries received.
        count: usize,
    },
}

impl Rejection {
    /// Whether the response was structurally malformed rather than
    /// well-formed but semantically unacceptable.
    #[must_use]
    pub const fn is_malformed(self) -> bool {
        matches!(
            self,
            Self::MissingMarker
                | Self::InvalidUrl
                | Self::MissingVersion
                | Self::NotStructured
                | Self::BodyTooShort
                | Self::InvalidDocument
                | Self::RootNotObject
        )
    }
}

/// Validation and persistence rules for one tracked payload type.
pub trait ResponsePolicy: Send + Sync + 'static {
    /// Tracked value.
    type Value: Clone + Debug + PartialEq + Send + Sync + 'static;

    /// Short label for logs.
    fn kind(&self) -> &'static str;

    /// Value at construction: the policy default in fixed mode, otherwise the
    /// persisted value falling back to the default.
    fn initial_value(&self, mode: TrackerMode, store: &dyn PreferenceStore) -> Self::Value;

    /// Validate `response` against `current`. Must not mutate anything.
    fn evaluate(&self, current: &Self::Value, response: &FetchResponse) -> Evaluation<Self::Value>;

    /// Persist an accepted value.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    fn persist(&self, value: &Self::Value, store: &dyn PreferenceStore) -> StoreResult<()>;

    /// Persist values carried alongside the main payload, independent of
    /// whether the payload is accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    fn record_side_channel(
        &self,
        _response: &FetchResponse,
        _store: &dyn PreferenceStore,
    ) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_and_semantic_rejections_are_distinguished() {
        assert!(Rejection::MissingMarker.is_malformed());
        assert!(Rejection::InvalidDocument.is_malformed());
        assert!(!Rejection::ForeignDomain.is_malformed());
        assert!(!Rejection::TooFewOverrides { count: 1 }.is_malformed());
        assert_eq!(
            Rejection::TooFewOverrides { count: 1 }.to_string(),
            "override list too short"
        );
    }
}
