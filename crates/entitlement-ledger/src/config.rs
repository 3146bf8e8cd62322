//! Configuration for the entitlement ledger.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Ledger configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Look-back used by the expiration scan when the caller passes none.
    pub cronjob_lookback_days: i64,
    /// Offset from UTC that defines "today" and start-of-day boundaries.
    pub timezone_offset_minutes: i32,
    /// Largest pipelined batch accepted.
    pub max_batch_statements: usize,
    /// In-memory adapter enforces the partial unique index on current segments.
    pub enforce_current_segment_index: bool,
    /// How long the in-memory adapter waits to acquire its lock.
    pub lock_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            cronjob_lookback_days: 1,
            timezone_offset_minutes: 0,
            max_batch_statements: 1000,
            enforce_current_segment_index: true,
            lock_timeout_ms: 5000,
        }
    }
}

impl LedgerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `LEDGER_CRONJOB_LOOKBACK_DAYS` (default: 1)
    /// - `LEDGER_TIMEZONE_OFFSET_MINUTES` (default: 0)
    /// - `LEDGER_MAX_BATCH_STATEMENTS` (default: 1000)
    /// - `LEDGER_LOCK_TIMEOUT_MS` (default: 5000)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cronjob_lookback_days: parse_env("LEDGER_CRONJOB_LOOKBACK_DAYS")
                .unwrap_or(defaults.cronjob_lookback_days),
            timezone_offset_minutes: parse_env("LEDGER_TIMEZONE_OFFSET_MINUTES")
                .unwrap_or(defaults.timezone_offset_minutes),
            max_batch_statements: parse_env("LEDGER_MAX_BATCH_STATEMENTS")
                .unwrap_or(defaults.max_batch_statements),
            enforce_current_segment_index: defaults.enforce_current_segment_index,
            lock_timeout_ms: parse_env("LEDGER_LOCK_TIMEOUT_MS")
                .unwrap_or(defaults.lock_timeout_ms),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert_eq!(config.cronjob_lookback_days, 1);
        assert_eq!(config.max_batch_statements, 1000);
        assert!(config.enforce_current_segment_index);
        assert_eq!(config.lock_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: LedgerConfig =
            serde_json::from_str(r#"{"timezone_offset_minutes": 420}"#).unwrap();
        assert_eq!(config.timezone_offset_minutes, 420);
        assert_eq!(config.cronjob_lookback_days, 1);
    }

    #[test]
    fn test_from_env_override() {
        env::set_var("LEDGER_MAX_BATCH_STATEMENTS", "25");
        let config = LedgerConfig::from_env();
        env::remove_var("LEDGER_MAX_BATCH_STATEMENTS");
        assert_eq!(config.max_batch_statements, 25);
    }
}
