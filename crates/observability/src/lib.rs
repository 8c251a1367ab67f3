//! Process-wide tracing/logging setup shared by binaries and tests.

pub mod tracing;

pub use crate::tracing::LogFormat;

/// Initialize JSON logging filtered by `RUST_LOG` (default `info`).
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::Json, "info");
}
