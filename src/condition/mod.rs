//! Typed query conditions.
//!
//! A `PropertyCondition` is an immutable predicate over one property. Its
//! `ConditionKind` is a closed tagged union: each variant is one value shape
//! (arity x operand type) and carries only the operands that shape needs.
//! Conditions are applied to a [`ConditionSink`] exactly once while a query
//! is compiled; an optional alias tags the applied operand so it can be
//! rebound later without recompiling.
//!
//! ```
//! use boxquery::{Property, PropertyType};
//!
//! const AGE: Property = Property::new(2, "age", PropertyType::Int);
//! const NAME: Property = Property::new(3, "name", PropertyType::String);
//!
//! let adults = AGE.greater(17).alias("min_age").and(NAME.starts_with("A"));
//! # let _ = adults;
//! ```

pub mod sink;
mod value;

use std::fmt;

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::{QueryResult, ValidationError};
use crate::property::{Property, StringOrder};
use crate::time::{bool_to_int, epoch_millis};

pub use sink::{Combinator, ConditionSink};
pub use value::{MembershipOperand, RangeOperand, ScalarOperand};

/// Operation selector.
///
/// Every shape accepts a fixed subset; see [`Shape::operations`].
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    IsNull,
    NotNull,
    Equal,
    NotEqual,
    Greater,
    Less,
    Between,
    In,
    NotIn,
    Contains,
    StartsWith,
    EndsWith,
}

impl Operation {
    /// Stable snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IsNull => "is_null",
            Self::NotNull => "not_null",
            Self::Equal => "equal",
            Self::NotEqual => "not_equal",
            Self::Greater => "greater",
            Self::Less => "less",
            Self::Between => "between",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value shape of a condition.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    NullCheck,
    IntCmp,
    IntRange,
    FloatCmp,
    FloatRange,
    IntArray,
    LongArray,
    TextCmp,
    TextArray,
    ByteCmp,
}

impl Shape {
    /// The closed operation set of this shape.
    #[must_use]
    pub const fn operations(self) -> &'static [Operation] {
        use Operation::{
            Between, Contains, EndsWith, Equal, Greater, In, IsNull, Less, NotEqual, NotIn,
            NotNull, StartsWith,
        };
        match self {
            Self::NullCheck => &[IsNull, NotNull],
            Self::IntCmp => &[Equal, NotEqual, Greater, Less],
            Self::IntRange | Self::FloatRange => &[Between],
            Self::FloatCmp => &[Greater, Less],
            Self::IntArray | Self::LongArray => &[In, NotIn],
            Self::TextCmp => &[Equal, NotEqual, Greater, Less, Contains, StartsWith, EndsWith],
            Self::TextArray => &[In],
            Self::ByteCmp => &[Equal, Greater, Less],
        }
    }

    /// Whether `op` belongs to this shape.
    #[must_use]
    pub fn supports(self, op: Operation) -> bool {
        self.operations().contains(&op)
    }

    /// Stable snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NullCheck => "null_check",
            Self::IntCmp => "int_cmp",
            Self::IntRange => "int_range",
            Self::FloatCmp => "float_cmp",
            Self::FloatRange => "float_range",
            Self::IntArray => "int_array",
            Self::LongArray => "long_array",
            Self::TextCmp => "text_cmp",
            Self::TextArray => "text_array",
            Self::ByteCmp => "byte_cmp",
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape-specific operator and operands.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ConditionKind {
    NullCheck {
        op: Operation,
    },
    IntCmp {
        op: Operation,
        value: i64,
    },
    IntRange {
        op: Operation,
        low: i64,
        high: i64,
    },
    FloatCmp {
        op: Operation,
        value: f64,
    },
    FloatRange {
        op: Operation,
        low: f64,
        high: f64,
    },
    IntArray {
        op: Operation,
        values: Vec<i32>,
    },
    LongArray {
        op: Operation,
        values: Vec<i64>,
    },
    TextCmp {
        op: Operation,
        value: String,
        #[serde(default)]
        order: StringOrder,
    },
    TextArray {
        op: Operation,
        values: Vec<String>,
        #[serde(default)]
        order: StringOrder,
    },
    ByteCmp {
        op: Operation,
        value: Vec<u8>,
    },
}

impl ConditionKind {
    /// Value shape of this operator.
    #[must_use]
    pub const fn shape(&self) -> Shape {
        match self {
            Self::NullCheck { .. } => Shape::NullCheck,
            Self::IntCmp { .. } => Shape::IntCmp,
            Self::IntRange { .. } => Shape::IntRange,
            Self::FloatCmp { .. } => Shape::FloatCmp,
            Self::FloatRange { .. } => Shape::FloatRange,
            Self::IntArray { .. } => Shape::IntArray,
            Self::LongArray { .. } => Shape::LongArray,
            Self::TextCmp { .. } => Shape::TextCmp,
            Self::TextArray { .. } => Shape::TextArray,
            Self::ByteCmp { .. } => Shape::ByteCmp,
        }
    }

    /// Operation selector.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        match self {
            Self::NullCheck { op }
            | Self::IntCmp { op, .. }
            | Self::IntRange { op, .. }
            | Self::FloatCmp { op, .. }
            | Self::FloatRange { op, .. }
            | Self::IntArray { op, .. }
            | Self::LongArray { op, .. }
            | Self::TextCmp { op, .. }
            | Self::TextArray { op, .. }
            | Self::ByteCmp { op, .. } => *op,
        }
    }
}

/// An immutable predicate over a single property.
///
/// Construction only checks that operand types match the shape. Whether the
/// operation belongs to the shape is checked when the condition is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyCondition {
    property: Property,
    kind: ConditionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alias: Option<String>,
}

impl PropertyCondition {
    /// Creates a condition from an already shaped operator.
    #[must_use]
    pub fn new(property: Property, kind: ConditionKind) -> Self {
        Self {
            property,
            kind,
            alias: None,
        }
    }

    /// `is_null` / `not_null` condition.
    #[must_use]
    pub fn null_check(property: Property, op: Operation) -> Self {
        Self::new(property, ConditionKind::NullCheck { op })
    }

    /// Integer comparison.
    #[must_use]
    pub fn int(property: Property, op: Operation, value: i64) -> Self {
        Self::new(property, ConditionKind::IntCmp { op, value })
    }

    /// Integer condition on a boolean operand, stored as 1 or 0.
    #[must_use]
    pub fn from_bool(property: Property, op: Operation, value: bool) -> Self {
        Self::int(property, op, bool_to_int(value))
    }

    /// Integer condition on an instant, stored as epoch milliseconds.
    #[must_use]
    pub fn from_date<Tz: TimeZone>(property: Property, op: Operation, value: &DateTime<Tz>) -> Self {
        Self::int(property, op, epoch_millis(value))
    }

    /// Inclusive integer range.
    #[must_use]
    pub fn int_range(property: Property, op: Operation, low: i64, high: i64) -> Self {
        Self::new(property, ConditionKind::IntRange { op, low, high })
    }

    /// Inclusive range of instants, stored as epoch milliseconds.
    #[must_use]
    pub fn date_range<Tz: TimeZone>(
        property: Property,
        op: Operation,
        low: &DateTime<Tz>,
        high: &DateTime<Tz>,
    ) -> Self {
        Self::int_range(property, op, epoch_millis(low), epoch_millis(high))
    }

    /// Float comparison.
    #[must_use]
    pub fn float(property: Property, op: Operation, value: f64) -> Self {
        Self::new(property, ConditionKind::FloatCmp { op, value })
    }

    /// Inclusive float range.
    #[must_use]
    pub fn float_range(property: Property, op: Operation, low: f64, high: f64) -> Self {
        Self::new(property, ConditionKind::FloatRange { op, low, high })
    }

    /// Membership in a set of 32-bit integers.
    #[must_use]
    pub fn int_array(property: Property, op: Operation, values: Vec<i32>) -> Self {
        Self::new(property, ConditionKind::IntArray { op, values })
    }

    /// Membership in a set of 64-bit integers.
    #[must_use]
    pub fn long_array(property: Property, op: Operation, values: Vec<i64>) -> Self {
        Self::new(property, ConditionKind::LongArray { op, values })
    }

    /// Text comparison.
    #[must_use]
    pub fn text(property: Property, op: Operation, value: impl Into<String>, order: StringOrder) -> Self {
        Self::new(
            property,
            ConditionKind::TextCmp {
                op,
                value: value.into(),
                order,
            },
        )
    }

    /// Membership in a set of strings.
    #[must_use]
    pub fn text_array(property: Property, op: Operation, values: Vec<String>, order: StringOrder) -> Self {
        Self::new(property, ConditionKind::TextArray { op, values, order })
    }

    /// Byte-array comparison.
    #[must_use]
    pub fn bytes(property: Property, op: Operation, value: impl Into<Vec<u8>>) -> Self {
        Self::new(
            property,
            ConditionKind::ByteCmp {
                op,
                value: value.into(),
            },
        )
    }

    /// Tags this condition's operand for later rebinding.
    ///
    /// Calling it again replaces the previous alias; an empty alias is
    /// treated as no alias.
    #[must_use]
    pub fn alias(mut self, name: impl Into<String>) -> Self {
        self.set_alias(name);
        self
    }

    /// In-place form of [`alias`](Self::alias).
    pub fn set_alias(&mut self, name: impl Into<String>) {
        self.alias = Some(name.into());
    }

    /// The alias, if set and non-empty.
    #[must_use]
    pub fn alias_name(&self) -> Option<&str> {
        self.alias.as_deref().filter(|a| !a.is_empty())
    }

    /// Property this condition tests.
    #[must_use]
    pub const fn property(&self) -> &Property {
        &self.property
    }

    /// Shaped operator and operands.
    #[must_use]
    pub const fn kind(&self) -> &ConditionKind {
        &self.kind
    }

    /// Shape of the operand, fixed at construction.
    #[must_use]
    pub const fn shape(&self) -> Shape {
        self.kind.shape()
    }

    /// Selected operation.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.kind.operation()
    }

    /// Combines with another condition; both must match.
    #[must_use]
    pub fn and(self, other: impl Into<QueryCondition>) -> QueryCondition {
        QueryCondition::from(self).and(other)
    }

    /// Combines with another condition; either may match.
    #[must_use]
    pub fn or(self, other: impl Into<QueryCondition>) -> QueryCondition {
        QueryCondition::from(self).or(other)
    }

    /// Applies this condition to `sink`, consuming it.
    ///
    /// # Errors
    ///
    /// `ValidationError::UnsupportedOperation` if the operation is outside the
    /// shape's set; the sink is not called in that case. Sink failures are
    /// returned unchanged.
    pub fn apply<S: ConditionSink + ?Sized>(self, sink: &mut S) -> QueryResult<()> {
        let Self {
            property,
            kind,
            alias,
        } = self;
        let shape = kind.shape();
        let p = &property;

        match kind {
            ConditionKind::NullCheck { op } => match op {
                Operation::IsNull => sink.is_null(p)?,
                Operation::NotNull => sink.not_null(p)?,
                other => return Err(unsupported(other, shape)),
            },
            ConditionKind::IntCmp { op, value } => match op {
                Operation::Equal => sink.equal_int(p, value)?,
                Operation::NotEqual => sink.not_equal_int(p, value)?,
                Operation::Greater => sink.greater_int(p, value)?,
                Operation::Less => sink.less_int(p, value)?,
                other => return Err(unsupported(other, shape)),
            },
            ConditionKind::IntRange { op, low, high } => match op {
                Operation::Between => sink.between_int(p, low, high)?,
                other => return Err(unsupported(other, shape)),
            },
            ConditionKind::FloatCmp { op, value } => match op {
                Operation::Greater => sink.greater_float(p, value)?,
                Operation::Less => sink.less_float(p, value)?,
                other => return Err(unsupported(other, shape)),
            },
            ConditionKind::FloatRange { op, low, high } => match op {
                Operation::Between => sink.between_float(p, low, high)?,
                other => return Err(unsupported(other, shape)),
            },
            ConditionKind::IntArray { op, values } => match op {
                Operation::In => sink.in_ints(p, &values)?,
                Operation::NotIn => sink.not_in_ints(p, &values)?,
                other => return Err(unsupported(other, shape)),
            },
            ConditionKind::LongArray { op, values } => match op {
                Operation::In => sink.in_longs(p, &values)?,
                Operation::NotIn => sink.not_in_longs(p, &values)?,
                other => return Err(unsupported(other, shape)),
            },
            ConditionKind::TextCmp { op, value, order } => match op {
                Operation::Equal => sink.equal_text(p, &value, order)?,
                Operation::NotEqual => sink.not_equal_text(p, &value, order)?,
                Operation::Greater => sink.greater_text(p, &value, order)?,
                Operation::Less => sink.less_text(p, &value, order)?,
                Operation::Contains => sink.contains_text(p, &value, order)?,
                Operation::StartsWith => sink.starts_with_text(p, &value, order)?,
                Operation::EndsWith => sink.ends_with_text(p, &value, order)?,
                other => return Err(unsupported(other, shape)),
            },
            ConditionKind::TextArray { op, values, order } => match op {
                Operation::In => sink.in_texts(p, &values, order)?,
                other => return Err(unsupported(other, shape)),
            },
            ConditionKind::ByteCmp { op, value } => match op {
                Operation::Equal => sink.equal_bytes(p, &value)?,
                Operation::Greater => sink.greater_bytes(p, &value)?,
                Operation::Less => sink.less_bytes(p, &value)?,
                other => return Err(unsupported(other, shape)),
            },
        }

        if let Some(alias) = alias.as_deref().filter(|a| !a.is_empty()) {
            sink.parameter_alias(alias)?;
        }
        Ok(())
    }
}

fn unsupported(op: Operation, shape: Shape) -> crate::error::QueryError {
    ValidationError::UnsupportedOperation { op, shape }.into()
}

/// A predicate tree of property conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryCondition {
    Property(PropertyCondition),
    And {
        left: Box<QueryCondition>,
        right: Box<QueryCondition>,
    },
    Or {
        left: Box<QueryCondition>,
        right: Box<QueryCondition>,
    },
}

impl QueryCondition {
    /// Both sides must match.
    #[must_use]
    pub fn and(self, other: impl Into<Self>) -> Self {
        Self::And {
            left: Box::new(self),
            right: Box::new(other.into()),
        }
    }

    /// Either side may match.
    #[must_use]
    pub fn or(self, other: impl Into<Self>) -> Self {
        Self::Or {
            left: Box::new(self),
            right: Box::new(other.into()),
        }
    }

    /// Number of property conditions (leaves) in the tree.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Property(_) => 1,
            Self::And { left, right } | Self::Or { left, right } => left.leaf_count() + right.leaf_count(),
        }
    }

    /// Applies the tree in post-order: left, right, then the combinator.
    ///
    /// # Errors
    ///
    /// Stops at the first leaf or sink failure.
    pub fn apply<S: ConditionSink + ?Sized>(self, sink: &mut S) -> QueryResult<()> {
        match self {
            Self::Property(condition) => condition.apply(sink),
            Self::And { left, right } => {
                left.apply(sink)?;
                right.apply(sink)?;
                sink.combine(Combinator::And)?;
                Ok(())
            }
            Self::Or { left, right } => {
                left.apply(sink)?;
                right.apply(sink)?;
                sink.combine(Combinator::Or)?;
                Ok(())
            }
        }
    }
}

impl From<PropertyCondition> for QueryCondition {
    fn from(condition: PropertyCondition) -> Self {
        Self::Property(condition)
    }
}
