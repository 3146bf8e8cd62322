//! # Ledger Telemetry
//!
//! Structured logging for the tuition ledger, built on `tracing-subscriber`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ledger_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("telemetry");
//!     // stores and services now emit through the installed subscriber
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `LEDGER_SERVICE_NAME` | `tuition-ledger` | Service name on the root span |
//! | `LEDGER_LOG_LEVEL` | `RUST_LOG`, then `info` | Filter directive |
//! | `LEDGER_JSON_LOGS` | `false` | One JSON object per line |
//! | `LEDGER_LOG_SOURCE` | `false` | Include file and line |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{env_filter, init_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("invalid log filter {directive:?}: {message}")]
    Filter { directive: String, message: String },

    #[error("a global subscriber is already installed")]
    AlreadyInitialized,
}

/// Install the global subscriber and enter a root span naming the service.
///
/// Hold the returned guard for the lifetime of the process.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    init_logging(&config)?;
    let span = tracing::info_span!("service", service = %config.service_name);
    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "telemetry initialized"
    );
    Ok(TelemetryGuard {
        _root: span.entered(),
    })
}

/// Keeps the root span entered.
pub struct TelemetryGuard {
    _root: tracing::span::EnteredSpan,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("shutting down telemetry");
    }
}
