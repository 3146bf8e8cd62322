//! # Entitlement Ledger
//!
//! Persistence layer for student package entitlements. A package's paid time
//! is recorded as a ledger of non-overlapping order segments; the segment
//! covering "now" is mirrored into the package head and projected into
//! per-course grants and access paths.
//!
//! ## Architecture
//!
//! This crate follows Hexagonal Architecture (Ports & Adapters):
//!
//! - **Domain Layer** (`domain/`): Pure rules, no I/O
//!   - `StudentPackagePosition`: Past / Current / Future placement of a segment
//!   - `LedgerError`: Every failure carries the operation that raised it
//!   - Business-calendar day boundaries for the expiration scan
//!
//! - **SQL Layer** (`sql/`): Declarative statements
//!   - `Select` / `Insert` / `Update` / `Delete` render to `$n` parameterised SQL
//!   - `TableDescriptor` lists columns, keys and the audit-scope column
//!   - `LEDGER_SCHEMA`: DDL for the nine tables
//!
//! - **Ports Layer** (`ports/`): Trait definitions
//!   - `QueryExecutor`, `TimeSource`: Driven ports
//!   - One store trait per ledger component: Driving ports
//!
//! - **Stores** (`stores/`): Store implementations over any `QueryExecutor`
//!
//! - **Service Layer** (`service/`): Multi-store flows
//!   - `OrderService`: Position-aware segment operations
//!   - `EntitlementService`: Grant, cancel, void and expiration flows
//!
//! - **Adapters Layer** (`adapters/`)
//!   - `InMemoryDatabase`: Transactional in-memory engine with fault injection
//!   - `TracedExecutor`: Wraps an executor with statement-level spans
//!
//! ## Invariants
//!
//! - Live segments of one package never overlap.
//! - At most one live segment per package carries `is_current_student_package`.
//! - Soft-deleted rows are invisible to every read except lookups by primary key.
//!
//! ## Usage Example
//!
//! ```ignore
//! use entitlement_ledger::{
//!     EntitlementService, GrantRequest, InMemoryDatabase, LedgerConfig, LedgerStores,
//!     RequestContext, SystemTimeSource,
//! };
//! use std::sync::Arc;
//!
//! let clock = Arc::new(SystemTimeSource);
//! let service = EntitlementService::new(LedgerStores::new(clock.clone(), &LedgerConfig::from_env()), clock);
//! let db = InMemoryDatabase::new();
//!
//! let ctx = RequestContext::background().with_user("staff-1");
//! let tx = db.begin(&ctx).await?;
//! service.grant_segment(&ctx, &tx, &request).await?;
//! tx.commit()?;
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;
pub mod sql;
pub mod stores;

// Re-exports for convenience
pub use adapters::{FixedTimeSource, InMemoryDatabase, InMemoryTransaction, SystemTimeSource, TracedExecutor};
pub use config::LedgerConfig;
pub use domain::entities::{
    CourseInfo, PackageCourse, PackageCourseFee, PackageCourseMaterial, PackageLogAction,
    PackageProperties, ProductLocation, StudentCourse, StudentPackage, StudentPackageAccessPath,
    StudentPackageLog, StudentPackageOrder,
};
pub use domain::errors::{BatchFailure, ExecError, LedgerError, LedgerResult, RowError};
pub use domain::position::{SegmentState, StudentPackagePosition};
pub use ports::inbound::{
    AccessPathStore, AssociationStore, StudentCourseStore, StudentPackageLogStore,
    StudentPackageOrderStore, StudentPackageStore,
};
pub use ports::outbound::{BatchResults, QueryExecutor, RequestContext, TimeSource};
pub use service::{
    CancelOutcome, EntitlementService, ExpirationAction, ExpirationReport, GrantOutcome,
    GrantRequest, LedgerStores, OrderService,
};
pub use stores::{
    AccessPathRepo, BatchWriteCoordinator, StudentCourseRepo, StudentPackageLogRepo,
    StudentPackageOrderRepo, StudentPackageRepo,
};
