//! # Error Kinds
//!
//! Coarse failure categories shared by every store. Callers map these onto
//! their transport (gRPC status codes, HTTP statuses) without inspecting
//! store-specific error variants.

use thiserror::Error;

/// Failure category of a ledger operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Query or scan failed.
    Read,
    /// Statement execution failed.
    Write,
    /// Statement ran but matched an unexpected number of rows.
    NoRowAffected,
    /// Business rule conflict (duplicate access path, cancelling the past).
    FailedPrecondition,
    /// Absence the caller asked to be told about.
    NotFound,
    /// Caller supplied an unusable value.
    InvalidArgument,
}

impl ErrorKind {
    /// Stable lowercase label, used as a structured log field.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Read => "read",
            ErrorKind::Write => "write",
            ErrorKind::NoRowAffected => "no_row_affected",
            ErrorKind::FailedPrecondition => "failed_precondition",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidArgument => "invalid_argument",
        }
    }
}

/// Errors raised while constructing shared value types.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValueError {
    /// Window end precedes its start.
    #[error("Invalid window: end {end} precedes start {start}")]
    InvertedWindow { start: String, end: String },

    /// Required identifier was empty.
    #[error("Empty identifier: {field}")]
    EmptyIdentifier { field: &'static str },
}
