//! Service Layer
//!
//! Orchestrates the stores through the pure position rules in `domain`.
//! Services never open or commit transactions; callers hand them an executor.

pub mod entitlement;
pub mod order_service;

pub use entitlement::{
    CancelOutcome, EntitlementService, ExpirationAction, ExpirationReport, GrantOutcome,
    GrantRequest, LedgerStores,
};
pub use order_service::OrderService;
