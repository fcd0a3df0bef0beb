//! Subscriber installation for hosts embedding trackers.
//!
//! # Design
//! - `RUST_LOG` wins when it parses; otherwise the configured directives are
//!   used and must parse.
//! - The build SHA is recorded only once a subscriber is actually installed.

use std::{env, io};

use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Result, TelemetryError};

/// Filter directives used when neither `RUST_LOG` nor the host sets a level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const FILTER_ENV: &str = "RUST_LOG";
const UNKNOWN_BUILD: &str = "dev";

static BUILD_SHA: OnceCell<String> = OnceCell::new();

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidFilter` when `RUST_LOG` is unusable and the
/// configured level does not parse either, and
/// `TelemetryError::SubscriberInstall` when a global subscriber already exists.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = resolve_filter(env::var(FILTER_ENV).ok().as_deref(), &config.level)?;
    let layer = fmt::layer()
        .with_writer(config.writer.make_writer())
        .with_target(config.with_target)
        .with_thread_ids(false);

    let installed = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init(),
    };
    installed.map_err(|source| TelemetryError::SubscriberInstall { source })?;

    let _ = BUILD_SHA.set(config.build_sha.clone());
    tracing::info!(
        build_sha = build_sha(),
        format = config.format.as_str(),
        level = %config.level,
        "logging initialised"
    );
    Ok(())
}

/// Build id recorded by the installed subscriber, or `dev` before install.
#[must_use]
pub fn build_sha() -> &'static str {
    BUILD_SHA.get().map_or(UNKNOWN_BUILD, String::as_str)
}

/// Logging settings supplied by the embedding host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directives, e.g. `info` or `warn,vigil_tracker=debug`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Build identifier attached to the startup event.
    pub build_sha: String,
    /// Include the event target (module path) in each line.
    pub with_target: bool,
    /// Destination of rendered lines.
    pub writer: LogWriter,
}

impl LoggingConfig {
    /// Read `log_level`, `log_format` and `build_sha` from a host document.
    ///
    /// Absent or mistyped keys keep their defaults.
    #[must_use]
    pub fn from_value(document: Option<&Value>) -> Self {
        let mut config = Self::default();
        let Some(document) = document else {
            return config;
        };
        if let Some(level) = document
            .get("log_level")
            .and_then(Value::as_str)
            .filter(|level| !level.trim().is_empty())
        {
            config.level = level.to_string();
        }
        if let Some(format) = log_format_from_config(Some(document)) {
            config.format = format;
        }
        if let Some(sha) = document.get("build_sha").and_then(Value::as_str) {
            config.build_sha = sha.to_string();
        }
        config
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::infer(),
            build_sha: UNKNOWN_BUILD.to_string(),
            with_target: false,
            writer: LogWriter::Stdout,
        }
    }
}

/// Destination of rendered log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogWriter {
    /// Process standard output.
    #[default]
    Stdout,
    /// Process standard error.
    Stderr,
    /// Routed through the test harness so output is captured per test.
    TestCapture,
}

impl LogWriter {
    fn make_writer(self) -> BoxMakeWriter {
        match self {
            Self::Stdout => BoxMakeWriter::new(io::stdout),
            Self::Stderr => BoxMakeWriter::new(io::stderr),
            Self::TestCapture => BoxMakeWriter::new(fmt::TestWriter::new()),
        }
    }
}

/// Rendering of log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Human-readable lines.
    Pretty,
}

impl LogFormat {
    /// Pretty in debug builds, JSON otherwise.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }

    /// Parse a case-insensitive format label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" | "text" => Some(Self::Pretty),
            _ => None,
        }
    }

    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        }
    }
}

/// Format named by a host document's `log_format` key.
///
/// Returns `None` when the key is absent; unrecognised labels fall back to
/// [`LogFormat::infer`].
#[must_use]
pub fn log_format_from_config(document: Option<&Value>) -> Option<LogFormat> {
    document
        .and_then(|value| value.get("log_format"))
        .and_then(Value::as_str)
        .map(|label| LogFormat::parse(label).unwrap_or_else(LogFormat::infer))
}

fn resolve_filter(from_env: Option<&str>, level: &str) -> Result<EnvFilter> {
    if let Some(filter) = from_env
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
    {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|source| TelemetryError::InvalidFilter {
        directives: level.to_string(),
        source,
    })
}
