//! Cross-store scenarios over the in-memory database.

pub mod batch_atomicity;
pub mod concurrency;
pub mod cron_flow;
pub mod current_segment;
pub mod ledger_scenarios;
