//! Subscriber installation and event helpers.
//!
//! Events are formatted either for a terminal or as one JSON object per line:
//! - `timestamp`, `level`, `target`
//! - `service`: from `TelemetryConfig::service_name`, set on the root span
//! - the event's own structured fields (`op`, `student_package_id`, ...)

use crate::{TelemetryConfig, TelemetryError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter from the configured directive.
pub fn env_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(&config.log_level).map_err(|e| TelemetryError::Filter {
        directive: config.log_level.clone(),
        message: e.to_string(),
    })
}

/// Install the global subscriber.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = env_filter(config)?;

    let installed = if config.json_logs {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_file(config.source_location)
            .with_line_number(config.source_location);
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(config.source_location)
            .with_line_number(config.source_location);
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()
    };

    installed.map_err(|_| TelemetryError::AlreadyInitialized)
}

/// Log a ledger event with the standard `op` and `student_package_id` fields.
///
/// ```rust,ignore
/// log_ledger_event!(info, "StudentPackageRepo.CancelByID", spid, "head cancelled");
/// log_ledger_event!(warn, "Cron.Expire", spid, "projection rejected", error = %e);
/// ```
#[macro_export]
macro_rules! log_ledger_event {
    ($level:ident, $op:expr, $student_package_id:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            op = $op,
            student_package_id = %$student_package_id,
            $($($field)*,)?
            $msg
        )
    };
}
