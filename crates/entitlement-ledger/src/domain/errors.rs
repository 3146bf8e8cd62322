//! # Ledger Errors
//!
//! Three layers of failure:
//!
//! - `ExecError`: what the query executor reports (transport, constraint, deadline).
//! - `RowError`: a row came back but could not be decoded into an entity.
//! - `LedgerError`: the taxonomy every store operation returns. Each variant
//!   carries the operation name so the caller can tell which step of a
//!   multi-store request failed.
//!
//! No store retries. `LedgerError::is_retryable` tells the caller, who owns
//! the transaction, whether replaying the whole request makes sense.

use shared_types::ErrorKind;
use thiserror::Error;

/// Failure reported by a `QueryExecutor`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecError {
    /// `query_row` found nothing.
    #[error("no rows in result set")]
    NoRows,

    /// A primary key or unique index rejected the statement.
    #[error("duplicate key value violates unique constraint \"{constraint}\"")]
    UniqueViolation { constraint: String },

    /// Any other database-side failure.
    #[error("database error: {0}")]
    Database(String),

    /// The request context deadline passed before the statement ran.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// Failure injected by the in-memory adapter.
    #[error("injected fault at statement {index}")]
    InjectedFault { index: usize },

    /// Waiting for a row lock took longer than the configured timeout.
    #[error("lock wait timeout")]
    LockTimeout,
}

impl ExecError {
    /// Failures that may succeed on a fresh attempt of the same request.
    pub fn is_transient(&self) -> bool {
        matches!(self, ExecError::DeadlineExceeded | ExecError::LockTimeout)
    }
}

/// Failure decoding a row into an entity.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("missing column: {column}")]
    MissingColumn { column: String },

    #[error("column {column}: expected {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
    },

    #[error("column {column}: invalid json: {message}")]
    Json { column: String, message: String },
}

/// Why one statement of a pipelined batch aborted the group.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BatchFailure {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("no row affected")]
    NoRowAffected,
}

/// Error returned by every store and service operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Query or scan failed.
    #[error("{op}: read failed: {source}")]
    Read {
        op: &'static str,
        #[source]
        source: ExecError,
    },

    /// Statement execution failed.
    #[error("{op}: write failed: {source}")]
    Write {
        op: &'static str,
        #[source]
        source: ExecError,
    },

    /// Statement succeeded but matched an unexpected number of rows.
    #[error("{op}: expected {expected} row(s) affected, got {actual}")]
    NoRowAffected {
        op: &'static str,
        expected: u64,
        actual: u64,
    },

    /// Business rule conflict.
    #[error("{op}: {message}")]
    PreconditionViolation { op: &'static str, message: String },

    /// Absence the caller asked to be told about.
    #[error("{op}: {entity} not found: {key}")]
    NotFound {
        op: &'static str,
        entity: &'static str,
        key: String,
    },

    /// Row could not be decoded.
    #[error("{op}: {source}")]
    Decode {
        op: &'static str,
        #[source]
        source: RowError,
    },

    /// Caller supplied an unusable value.
    #[error("{op}: invalid argument: {message}")]
    InvalidArgument { op: &'static str, message: String },

    /// A statement of a pipelined batch failed; nothing after it ran.
    #[error("{op}: batch statement {index} of {total} failed: {cause}")]
    BatchFailed {
        op: &'static str,
        index: usize,
        total: usize,
        cause: BatchFailure,
    },
}

impl LedgerError {
    pub fn read(op: &'static str, source: ExecError) -> Self {
        LedgerError::Read { op, source }
    }

    pub fn write(op: &'static str, source: ExecError) -> Self {
        LedgerError::Write { op, source }
    }

    pub fn decode(op: &'static str, source: RowError) -> Self {
        LedgerError::Decode { op, source }
    }

    pub fn no_row_affected(op: &'static str, expected: u64, actual: u64) -> Self {
        LedgerError::NoRowAffected {
            op,
            expected,
            actual,
        }
    }

    pub fn precondition(op: &'static str, message: impl Into<String>) -> Self {
        LedgerError::PreconditionViolation {
            op,
            message: message.into(),
        }
    }

    pub fn invalid_argument(op: &'static str, message: impl Into<String>) -> Self {
        LedgerError::InvalidArgument {
            op,
            message: message.into(),
        }
    }

    /// Operation that produced the error.
    pub fn op(&self) -> &'static str {
        match self {
            LedgerError::Read { op, .. }
            | LedgerError::Write { op, .. }
            | LedgerError::NoRowAffected { op, .. }
            | LedgerError::PreconditionViolation { op, .. }
            | LedgerError::NotFound { op, .. }
            | LedgerError::Decode { op, .. }
            | LedgerError::InvalidArgument { op, .. }
            | LedgerError::BatchFailed { op, .. } => op,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Read { .. } | LedgerError::Decode { .. } => ErrorKind::Read,
            LedgerError::Write { .. } => ErrorKind::Write,
            LedgerError::NoRowAffected { .. } => ErrorKind::NoRowAffected,
            LedgerError::PreconditionViolation { .. } => ErrorKind::FailedPrecondition,
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            LedgerError::BatchFailed { cause, .. } => match cause {
                BatchFailure::Exec(_) => ErrorKind::Write,
                BatchFailure::NoRowAffected => ErrorKind::NoRowAffected,
            },
        }
    }

    /// Lost races and timeouts. The caller should roll back and replay the request.
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::NoRowAffected { .. } => true,
            LedgerError::Read { source, .. } | LedgerError::Write { source, .. } => {
                source.is_transient()
            }
            LedgerError::BatchFailed { cause, .. } => match cause {
                BatchFailure::Exec(e) => e.is_transient(),
                BatchFailure::NoRowAffected => true,
            },
            _ => false,
        }
    }
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
