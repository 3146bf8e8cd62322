//! # Shared Types Crate
//!
//! Types shared by every entitlement store and by the integration suite.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: identifiers and time windows are defined once.
//! - **One lifecycle**: soft-delete and revert behave identically for every
//!   entity, so the convention lives here instead of being re-derived per table.

pub mod entities;
pub mod errors;
pub mod lifecycle;

pub use entities::*;
pub use errors::*;
pub use lifecycle::{Lifecycle, Revisable};
