//! Process-wide tracing setup shared by both service binaries.

/// Initialize logging with the `info` default filter.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init("info");
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use tracing::LogFormat;
