//! Error types for tracker construction, fetching, and persistence.
//!
//! # Design
//! - Keep error messages constant; carry operational context in fields.
//! - Fetch and store failures are handled inside the owner task and only ever
//!   logged; `TrackerError` is the one type surfaced to callers.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Construction-time and handle-level failures reported to the caller.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// No tokio runtime is available to host the owner task and startup timer.
    #[error("tokio runtime unavailable")]
    RuntimeUnavailable {
        /// Underlying runtime lookup failure.
        source: tokio::runtime::TryCurrentError,
    },
    /// Subscribing to the connectivity signal failed.
    #[error("failed to subscribe to connectivity changes")]
    ConnectivitySubscribe {
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Configuration values were invalid.
    #[error("invalid tracker configuration")]
    InvalidConfig {
        /// Field name that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// The owner task has already stopped.
    #[error("tracker has shut down")]
    Shutdown {
        /// Operation that could not be delivered.
        operation: &'static str,
    },
}

/// Failure reported by a fetch channel for a single request.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP client failed before a response was received.
    #[error("fetch transport failed")]
    Transport {
        /// URL used for the request.
        url: String,
        /// Source HTTP client error.
        source: reqwest::Error,
    },
    /// The server answered with a non-success status.
    #[error("fetch returned non-success status")]
    Status {
        /// URL used for the request.
        url: String,
        /// HTTP status code returned by the server.
        status: u16,
    },
    /// The channel could not service the request.
    #[error("fetch channel unavailable")]
    Unavailable {
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
}

/// Failure raised by a preference store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("preference store io failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// The backing file did not contain a JSON object.
    #[error("preference store parse failed")]
    Parse {
        /// Path involved in the failure.
        path: PathBuf,
        /// Source JSON error.
        source: serde_json::Error,
    },
}

/// Convenience alias for tracker results.
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Convenience alias for preference store results.
pub type StoreResult<T> = Result<T, StoreError>;
