//! Logging for integration suites.

use once_cell::sync::OnceCell;
use vigil_telemetry::{LogFormat, LogWriter, LoggingConfig, init_logging};

/// Directives used unless `RUST_LOG` overrides them.
pub const TEST_LOG_LEVEL: &str = "warn,vigil_tracker=debug";

static INSTALLED: OnceCell<bool> = OnceCell::new();

/// Install harness-captured logging once per test binary.
///
/// Returns whether this binary's subscriber is the one rendering events;
/// `false` means another subscriber was already installed globally.
pub fn init_test_logging() -> bool {
    *INSTALLED.get_or_init(|| {
        let config = LoggingConfig {
            level: TEST_LOG_LEVEL.to_string(),
            format: LogFormat::Pretty,
            build_sha: "test".to_string(),
            with_target: true,
            writer: LogWriter::TestCapture,
        };
        init_logging(&config).is_ok()
    })
}
