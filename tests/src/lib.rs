//! # Tuition Ledger Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs           # Clock, database and request builders
//! └── integration/          # Cross-store scenarios
//!     ├── ledger_scenarios.rs   # grant → advance → cancel → void
//!     ├── concurrency.rs        # serialized transactions on one package
//!     ├── batch_atomicity.rs    # rollback of partial writes
//!     ├── cron_flow.rs          # expiration job
//!     └── current_segment.rs    # property: at most one current segment
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p ledger-tests
//! cargo test -p ledger-tests integration::cron_flow
//!
//! # Benchmarks
//! cargo bench -p ledger-tests
//! ```

#[cfg(test)]
pub mod fixtures;
pub mod integration;
