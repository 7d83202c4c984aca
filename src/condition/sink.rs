//! The builder side of the apply protocol.
//!
//! A `ConditionSink` is implemented by the native query builder. It has one
//! entry point per (shape, operation) pair; conditions never call an entry
//! point their shape does not own.

use serde::{Deserialize, Serialize};

use crate::engine::EngineResult;
use crate::property::{Property, StringOrder};

/// How two applied predicates are merged.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    And,
    Or,
}

/// Receives applied conditions, one call per predicate.
///
/// Calls arrive in post-order: both operands of a combinator are applied
/// before `combine` is invoked. Native parameter slots are numbered in this
/// order, so implementations must not reorder them.
#[allow(missing_docs)]
pub trait ConditionSink {
    fn is_null(&mut self, property: &Property) -> EngineResult<()>;
    fn not_null(&mut self, property: &Property) -> EngineResult<()>;

    fn equal_int(&mut self, property: &Property, value: i64) -> EngineResult<()>;
    fn not_equal_int(&mut self, property: &Property, value: i64) -> EngineResult<()>;
    fn greater_int(&mut self, property: &Property, value: i64) -> EngineResult<()>;
    fn less_int(&mut self, property: &Property, value: i64) -> EngineResult<()>;
    fn between_int(&mut self, property: &Property, low: i64, high: i64) -> EngineResult<()>;

    fn greater_float(&mut self, property: &Property, value: f64) -> EngineResult<()>;
    fn less_float(&mut self, property: &Property, value: f64) -> EngineResult<()>;
    fn between_float(&mut self, property: &Property, low: f64, high: f64) -> EngineResult<()>;

    fn in_ints(&mut self, property: &Property, values: &[i32]) -> EngineResult<()>;
    fn not_in_ints(&mut self, property: &Property, values: &[i32]) -> EngineResult<()>;
    fn in_longs(&mut self, property: &Property, values: &[i64]) -> EngineResult<()>;
    fn not_in_longs(&mut self, property: &Property, values: &[i64]) -> EngineResult<()>;

    fn equal_text(&mut self, property: &Property, value: &str, order: StringOrder) -> EngineResult<()>;
    fn not_equal_text(&mut self, property: &Property, value: &str, order: StringOrder) -> EngineResult<()>;
    fn greater_text(&mut self, property: &Property, value: &str, order: StringOrder) -> EngineResult<()>;
    fn less_text(&mut self, property: &Property, value: &str, order: StringOrder) -> EngineResult<()>;
    fn contains_text(&mut self, property: &Property, value: &str, order: StringOrder) -> EngineResult<()>;
    fn starts_with_text(&mut self, property: &Property, value: &str, order: StringOrder) -> EngineResult<()>;
    fn ends_with_text(&mut self, property: &Property, value: &str, order: StringOrder) -> EngineResult<()>;
    fn in_texts(&mut self, property: &Property, values: &[String], order: StringOrder) -> EngineResult<()>;

    fn equal_bytes(&mut self, property: &Property, value: &[u8]) -> EngineResult<()>;
    fn greater_bytes(&mut self, property: &Property, value: &[u8]) -> EngineResult<()>;
    fn less_bytes(&mut self, property: &Property, value: &[u8]) -> EngineResult<()>;

    /// Tags the most recently applied operand slot.
    fn parameter_alias(&mut self, alias: &str) -> EngineResult<()>;

    /// Merges the two most recently applied predicates into one.
    fn combine(&mut self, combinator: Combinator) -> EngineResult<()>;
}
