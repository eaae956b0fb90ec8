//! Tracing/logging setup shared by every binary.

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{LOG_FORMAT_VAR, LogFormat, ParseLogFormatError};

/// Initialize process-wide logging.
///
/// The output format comes from `STOCKROOM_LOG_FORMAT` (`json` or `pretty`,
/// default `json`), the filter from `RUST_LOG` (default `info`). Safe to call
/// multiple times; subsequent calls are no-ops.
pub fn init() {
    self::tracing::init();
}
