//! Logging setup shared by gateway binaries.
//!
//! Metrics are emitted through the `metrics` facade at the call sites; this
//! crate only owns the `tracing` subscriber.

use anyhow::Result;

mod config;
mod tracing_init;

pub use config::{LogFormat, TelemetryConfig};
pub use tracing_init::init_telemetry;

/// Installs the subscriber configured from `LOG_FORMAT` and `RUST_LOG`.
pub fn install(service_name: &str) -> Result<()> {
    init_telemetry(TelemetryConfig::from_env(service_name, env!("CARGO_PKG_VERSION")))
}
