//! Native query engine boundary.
//!
//! Everything that crosses into the opaque engine goes through the
//! [`QueryEngine`] and [`NativeQueryBuilder`] traits. Keeping the boundary
//! this narrow lets the condition algebra and the query facade run against
//! any backend, including the in-memory reference one.

use std::fmt;
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::condition::ConditionSink;
use crate::property::{OrderFlags, Property, PropertyId};

/// Failures reported by the native engine.
///
/// The facade propagates these unchanged.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The query handle is unknown (already destroyed or never built).
    #[error("Invalid query handle: {0}")]
    InvalidHandle(u64),

    #[error("No parameter bound for property {property} (alias: {alias:?})")]
    ParameterNotFound {
        property: PropertyId,
        alias: Option<String>,
    },

    #[error("Property {property} is bound by several conditions; use an alias")]
    AmbiguousParameter {
        property: PropertyId,
    },

    #[error("Parameter for property {property} expects {expected}, got {actual}")]
    ParameterTypeMismatch {
        property: PropertyId,
        expected: String,
        actual: String,
    },

    #[error("Property {property} does not support {operation}")]
    PropertyType {
        property: PropertyId,
        operation: String,
    },

    #[error("Aggregate over property {property} overflowed")]
    Overflow {
        property: PropertyId,
    },

    #[error("Corrupt query plan: {0}")]
    CorruptPlan(String),

    /// Storage-level failure (I/O, resource exhaustion).
    #[error("Storage error: {0}")]
    Backend(String),
}

/// Result type for native calls.
pub type EngineResult<T> = Result<T, EngineError>;

/// Identifier of a stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Whether the id has not been assigned yet.
    #[must_use]
    pub const fn is_unassigned(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle of a compiled native plan. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryHandle(NonZeroU64);

impl QueryHandle {
    /// Wraps a raw handle; zero is the void handle and yields `None`.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Raw engine value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query:{}", self.0)
    }
}

/// Opaque handle of a cursor lent by the storage layer for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CursorHandle(pub u64);

/// Native builder that accumulates predicate state during compilation.
pub trait NativeQueryBuilder: ConditionSink + Send {
    /// Adds an explicit sort key. Keys apply in call order.
    fn order(&mut self, property: &Property, flags: OrderFlags) -> EngineResult<()>;

    /// Compiles the accumulated state into a native plan.
    fn build(self: Box<Self>) -> EngineResult<QueryHandle>;
}

/// Native query operations over entities of type `T`.
///
/// Every execution call receives the compiled handle and a cursor acquired by
/// the caller; the engine never acquires cursors itself.
pub trait QueryEngine<T>: Send + Sync {
    /// Starts a new native builder.
    fn new_builder(&self) -> EngineResult<Box<dyn NativeQueryBuilder>>;

    /// First match in plan order.
    fn find_first(&self, query: QueryHandle, cursor: CursorHandle) -> EngineResult<Option<T>>;

    /// Returns the matching rows; engines may stop after the second match.
    fn find_unique(&self, query: QueryHandle, cursor: CursorHandle) -> EngineResult<Vec<T>>;

    /// `offset` and `limit` of zero mean unbounded.
    fn find(&self, query: QueryHandle, cursor: CursorHandle, offset: u64, limit: u64) -> EngineResult<Vec<T>>;

    /// Matching ids in storage order, ignoring any sort keys.
    fn find_ids_unordered(&self, query: QueryHandle, cursor: CursorHandle) -> EngineResult<Vec<EntityId>>;

    /// Number of matches.
    fn count(&self, query: QueryHandle, cursor: CursorHandle) -> EngineResult<u64>;

    /// Sum of an integer property over the matches.
    fn sum(&self, query: QueryHandle, cursor: CursorHandle, property: PropertyId) -> EngineResult<i64>;
    /// Sum of a float property.
    fn sum_double(&self, query: QueryHandle, cursor: CursorHandle, property: PropertyId) -> EngineResult<f64>;
    /// Largest integer value among the matches.
    fn max(&self, query: QueryHandle, cursor: CursorHandle, property: PropertyId) -> EngineResult<i64>;
    /// Largest float value.
    fn max_double(&self, query: QueryHandle, cursor: CursorHandle, property: PropertyId) -> EngineResult<f64>;
    /// Smallest integer value.
    fn min(&self, query: QueryHandle, cursor: CursorHandle, property: PropertyId) -> EngineResult<i64>;
    /// Smallest float value.
    fn min_double(&self, query: QueryHandle, cursor: CursorHandle, property: PropertyId) -> EngineResult<f64>;
    /// Mean value over the matches.
    fn avg(&self, query: QueryHandle, cursor: CursorHandle, property: PropertyId) -> EngineResult<f64>;

    /// Deletes matching rows; requires a write cursor.
    fn remove(&self, query: QueryHandle, cursor: CursorHandle) -> EngineResult<u64>;

    /// Rebinds the text operand of the slot for (`property`, `alias`).
    fn set_parameter_text(
        &self,
        query: QueryHandle,
        property: PropertyId,
        alias: Option<&str>,
        value: &str,
    ) -> EngineResult<()>;

    /// Rebinds an integer operand.
    fn set_parameter_int(
        &self,
        query: QueryHandle,
        property: PropertyId,
        alias: Option<&str>,
        value: i64,
    ) -> EngineResult<()>;

    /// Rebinds a float operand.
    fn set_parameter_float(
        &self,
        query: QueryHandle,
        property: PropertyId,
        alias: Option<&str>,
        value: f64,
    ) -> EngineResult<()>;

    /// Rebinds both bounds of an integer range.
    fn set_parameters_int(
        &self,
        query: QueryHandle,
        property: PropertyId,
        alias: Option<&str>,
        low: i64,
        high: i64,
    ) -> EngineResult<()>;

    /// Rebinds both bounds of a float range.
    fn set_parameters_float(
        &self,
        query: QueryHandle,
        property: PropertyId,
        alias: Option<&str>,
        low: f64,
        high: f64,
    ) -> EngineResult<()>;

    /// Human-readable plan description.
    fn describe(&self, query: QueryHandle) -> EngineResult<String>;

    /// Human-readable list of bound parameters.
    fn describe_parameters(&self, query: QueryHandle) -> EngineResult<String>;

    /// Releases the plan. Called at most once per handle.
    fn destroy(&self, query: QueryHandle) -> EngineResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_engine_object_safe(_: &dyn QueryEngine<String>) {}
    fn _assert_builder_object_safe(_: Box<dyn NativeQueryBuilder>) {}

    #[test]
    fn test_zero_is_void_handle() {
        assert!(QueryHandle::from_raw(0).is_none());
        assert_eq!(QueryHandle::from_raw(7).map(QueryHandle::raw), Some(7));
    }

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::ParameterNotFound {
            property: PropertyId(4),
            alias: Some("min".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("#4"));
        assert!(msg.contains("min"));

        let err = EngineError::Backend("disk full".to_string());
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_unassigned_entity_id() {
        assert!(EntityId::default().is_unassigned());
        assert!(!EntityId(3).is_unassigned());
    }
}
