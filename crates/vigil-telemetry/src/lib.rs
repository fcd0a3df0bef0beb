#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    unreachable_pub,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Logging initialisation for hosts embedding vigil trackers.
//!
//! Trackers only emit `tracing` events; this crate installs the subscriber
//! that renders them. Embedding hosts call [`init_logging`] once at startup;
//! the tracker integration suites install it with [`LogWriter::TestCapture`]
//! through `vigil-test-support`.

pub mod error;
pub mod init;

pub use error::{Result, TelemetryError};
pub use init::{
    DEFAULT_LOG_LEVEL, LogFormat, LogWriter, LoggingConfig, build_sha, init_logging, log_format_from_config,
};
