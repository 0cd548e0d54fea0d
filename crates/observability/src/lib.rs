//! Process-wide logging setup shared by the back-office binaries.

/// Initialize tracing/logging with the format selected by
/// `BACKOFFICE_LOG_FORMAT` (`json` by default, `pretty` for terminals).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    let format = std::env::var("BACKOFFICE_LOG_FORMAT")
        .ok()
        .and_then(|v| LogFormat::parse(&v))
        .unwrap_or_default();
    tracing::init(format);
}

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use crate::tracing::LogFormat;
