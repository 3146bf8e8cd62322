//! # Outbound Ports (Driven Ports)
//!
//! What the ledger needs from its environment.
//!
//! ## Dependencies
//!
//! - `QueryExecutor`: a database handle, usually the caller's open transaction
//! - `TimeSource`: stamps `created_at` / `updated_at` and defines "today"
//!
//! Production wires a Postgres transaction and `SystemTimeSource`.
//! Tests use `InMemoryDatabase` and `FixedTimeSource`.

use crate::domain::errors::ExecError;
use crate::sql::{Batch, Row, Statement};
use async_trait::async_trait;
use shared_types::Timestamp;
use std::time::{Duration, Instant};

/// Per-request ambient values threaded through every executor call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Statements are refused once this passes.
    pub deadline: Option<Instant>,
    /// Acting user, recorded on audit rows.
    pub user_id: Option<String>,
    /// Session scope the database stamps into `resource_path`.
    pub resource_path: Option<String>,
}

impl RequestContext {
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_resource_path(mut self, resource_path: impl Into<String>) -> Self {
        self.resource_path = Some(resource_path.into());
        self
    }

    /// Time left before the deadline. `None` means unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn check_deadline(&self) -> Result<(), ExecError> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ExecError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

/// Outcome of a pipelined batch, one entry per statement that ran.
///
/// Execution stops at the first failure, so `outcomes.len() <= submitted` and
/// only the last outcome can be an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResults {
    pub submitted: usize,
    pub outcomes: Vec<Result<u64, ExecError>>,
}

impl BatchResults {
    pub fn new(submitted: usize) -> Self {
        Self {
            submitted,
            outcomes: Vec::with_capacity(submitted),
        }
    }

    /// First failing statement and its error.
    pub fn first_error(&self) -> Option<(usize, &ExecError)> {
        self.outcomes
            .iter()
            .enumerate()
            .find_map(|(i, r)| r.as_ref().err().map(|e| (i, e)))
    }

    pub fn rows_affected(&self, index: usize) -> Option<u64> {
        self.outcomes.get(index).and_then(|r| r.as_ref().ok().copied())
    }

    pub fn is_complete(&self) -> bool {
        self.outcomes.len() == self.submitted && self.first_error().is_none()
    }
}

/// Transactional query executor.
///
/// Implemented by database transactions, by the autocommit pool, and by
/// wrappers such as `TracedExecutor`. Every call checks the context deadline
/// before touching the database.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run a statement returning rows.
    async fn query(&self, ctx: &RequestContext, stmt: &Statement) -> Result<Vec<Row>, ExecError>;

    /// Run a statement expected to return one row. Empty result is `ExecError::NoRows`.
    async fn query_row(&self, ctx: &RequestContext, stmt: &Statement) -> Result<Row, ExecError> {
        self.query(ctx, stmt)
            .await?
            .into_iter()
            .next()
            .ok_or(ExecError::NoRows)
    }

    /// Run a statement and return the number of rows it affected.
    async fn exec(&self, ctx: &RequestContext, stmt: &Statement) -> Result<u64, ExecError>;

    /// Run queued statements in order, stopping at the first error.
    async fn send_batch(&self, ctx: &RequestContext, batch: &Batch) -> BatchResults;
}

#[async_trait]
impl<T: QueryExecutor + ?Sized> QueryExecutor for &T {
    async fn query(&self, ctx: &RequestContext, stmt: &Statement) -> Result<Vec<Row>, ExecError> {
        (**self).query(ctx, stmt).await
    }

    async fn query_row(&self, ctx: &RequestContext, stmt: &Statement) -> Result<Row, ExecError> {
        (**self).query_row(ctx, stmt).await
    }

    async fn exec(&self, ctx: &RequestContext, stmt: &Statement) -> Result<u64, ExecError> {
        (**self).exec(ctx, stmt).await
    }

    async fn send_batch(&self, ctx: &RequestContext, batch: &Batch) -> BatchResults {
        (**self).send_batch(ctx, batch).await
    }
}

/// Time source abstraction for testability.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}
