//! Error types for boxquery.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! the specific condition (for example falling back from `find_unique` to
//! `find` on a non-unique result).

use thiserror::Error;

use crate::condition::{Operation, Shape};
use crate::engine::EngineError;

/// Validation errors detected locally, before any native call.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// An operation selector outside its shape's enumeration.
    ///
    /// This is a programming defect, never a user error.
    #[error("Operation {op} is not supported for {shape} conditions")]
    UnsupportedOperation {
        op: Operation,
        shape: Shape,
    },

    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument {
        name: String,
        reason: String,
    },
}

/// Errors raised by the query facade while executing.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Query matched {count} rows, expected at most one")]
    NonUniqueResult {
        count: usize,
    },

    #[error("Unsupported retrieval mode: {reason}")]
    UnsupportedRetrieval {
        reason: String,
    },

    #[error("Query has been closed")]
    QueryClosed,

    #[error("Channel disconnected: {path}")]
    Disconnected {
        path: String,
    },
}

/// Top-level error type for boxquery.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl QueryError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an invalid-argument validation error.
    #[must_use]
    pub fn invalid_argument(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation(ValidationError::InvalidArgument {
            name: name.into(),
            reason: reason.into(),
        })
    }

    /// Local validation failure.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Execution failure raised by the facade.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Failure reported by the native engine.
    #[must_use]
    pub const fn is_engine(&self) -> bool {
        matches!(self, Self::Engine(_))
    }

    /// Internal invariant violation.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if the error signals a programming defect.
    ///
    /// Defects abort compilation; retrying with the same input cannot succeed.
    #[must_use]
    pub const fn is_defect(&self) -> bool {
        matches!(
            self,
            Self::Validation(ValidationError::UnsupportedOperation { .. }) | Self::Internal { .. }
        )
    }

    /// Returns true if `find_unique` matched more than one row.
    #[must_use]
    pub const fn is_non_unique(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::NonUniqueResult { .. }))
    }

    /// Returns true if the query was already closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::QueryClosed))
    }
}

/// Result type alias for boxquery operations.
pub type QueryResult<T> = Result<T, QueryError>;
