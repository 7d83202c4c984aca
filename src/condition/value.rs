//! Typed condition helpers on `Property`.
//!
//! The operand's Rust type picks the shape: integers, booleans and instants
//! become integer conditions, floats become float conditions, text becomes a
//! case-insensitive text condition, bytes a byte condition. Pairing an
//! operation with a shape that does not support it (for example `equal` on a
//! float) is reported when the query is compiled.

use chrono::{DateTime, TimeZone};

use crate::property::{Property, StringOrder};
use crate::time::{bool_to_int, epoch_millis};

use super::{Operation, PropertyCondition};

/// A single comparison operand.
pub trait ScalarOperand {
    /// Builds the condition of this operand's shape.
    fn into_condition(self, property: Property, op: Operation) -> PropertyCondition;
}

macro_rules! int_scalar {
    ($($t:ty),*) => {
        $(
            impl ScalarOperand for $t {
                fn into_condition(self, property: Property, op: Operation) -> PropertyCondition {
                    PropertyCondition::int(property, op, i64::from(self))
                }
            }
        )*
    };
}

int_scalar!(i8, i16, i32, i64, u8, u16, u32);

impl ScalarOperand for bool {
    fn into_condition(self, property: Property, op: Operation) -> PropertyCondition {
        PropertyCondition::int(property, op, bool_to_int(self))
    }
}

impl<Tz: TimeZone> ScalarOperand for DateTime<Tz> {
    fn into_condition(self, property: Property, op: Operation) -> PropertyCondition {
        PropertyCondition::int(property, op, epoch_millis(&self))
    }
}

impl ScalarOperand for f64 {
    fn into_condition(self, property: Property, op: Operation) -> PropertyCondition {
        PropertyCondition::float(property, op, self)
    }
}

impl ScalarOperand for f32 {
    fn into_condition(self, property: Property, op: Operation) -> PropertyCondition {
        PropertyCondition::float(property, op, f64::from(self))
    }
}

impl ScalarOperand for &str {
    fn into_condition(self, property: Property, op: Operation) -> PropertyCondition {
        PropertyCondition::text(property, op, self, StringOrder::default())
    }
}

impl ScalarOperand for String {
    fn into_condition(self, property: Property, op: Operation) -> PropertyCondition {
        PropertyCondition::text(property, op, self, StringOrder::default())
    }
}

impl ScalarOperand for &[u8] {
    fn into_condition(self, property: Property, op: Operation) -> PropertyCondition {
        PropertyCondition::bytes(property, op, self)
    }
}

impl ScalarOperand for Vec<u8> {
    fn into_condition(self, property: Property, op: Operation) -> PropertyCondition {
        PropertyCondition::bytes(property, op, self)
    }
}

/// Operand type usable with `between`; both bounds coerce the same way.
pub trait RangeOperand: Sized {
    /// Builds the two-operand condition.
    fn into_range(low: Self, high: Self, property: Property) -> PropertyCondition;
}

impl RangeOperand for i64 {
    fn into_range(low: Self, high: Self, property: Property) -> PropertyCondition {
        PropertyCondition::int_range(property, Operation::Between, low, high)
    }
}

impl RangeOperand for i32 {
    fn into_range(low: Self, high: Self, property: Property) -> PropertyCondition {
        PropertyCondition::int_range(property, Operation::Between, i64::from(low), i64::from(high))
    }
}

impl RangeOperand for f64 {
    fn into_range(low: Self, high: Self, property: Property) -> PropertyCondition {
        PropertyCondition::float_range(property, Operation::Between, low, high)
    }
}

impl<Tz: TimeZone> RangeOperand for DateTime<Tz> {
    fn into_range(low: Self, high: Self, property: Property) -> PropertyCondition {
        PropertyCondition::date_range(property, Operation::Between, &low, &high)
    }
}

/// A set of values for `one_of` / `not_one_of`.
pub trait MembershipOperand {
    /// Builds the membership condition.
    fn into_membership(self, property: Property, op: Operation) -> PropertyCondition;
}

impl MembershipOperand for Vec<i32> {
    fn into_membership(self, property: Property, op: Operation) -> PropertyCondition {
        PropertyCondition::int_array(property, op, self)
    }
}

impl MembershipOperand for &[i32] {
    fn into_membership(self, property: Property, op: Operation) -> PropertyCondition {
        PropertyCondition::int_array(property, op, self.to_vec())
    }
}

impl MembershipOperand for Vec<i64> {
    fn into_membership(self, property: Property, op: Operation) -> PropertyCondition {
        PropertyCondition::long_array(property, op, self)
    }
}

impl MembershipOperand for &[i64] {
    fn into_membership(self, property: Property, op: Operation) -> PropertyCondition {
        PropertyCondition::long_array(property, op, self.to_vec())
    }
}

impl MembershipOperand for Vec<String> {
    fn into_membership(self, property: Property, op: Operation) -> PropertyCondition {
        PropertyCondition::text_array(property, op, self, StringOrder::default())
    }
}

impl MembershipOperand for &[&str] {
    fn into_membership(self, property: Property, op: Operation) -> PropertyCondition {
        let values = self.iter().map(|s| (*s).to_string()).collect();
        PropertyCondition::text_array(property, op, values, StringOrder::default())
    }
}

impl Property {
    /// Matches entities with no value for this property.
    #[must_use]
    pub fn is_null(&self) -> PropertyCondition {
        PropertyCondition::null_check(self.clone(), Operation::IsNull)
    }

    /// Matches entities with a value for this property.
    #[must_use]
    pub fn not_null(&self) -> PropertyCondition {
        PropertyCondition::null_check(self.clone(), Operation::NotNull)
    }

    /// Equality; the operand type picks the shape.
    #[must_use]
    pub fn equal(&self, value: impl ScalarOperand) -> PropertyCondition {
        value.into_condition(self.clone(), Operation::Equal)
    }

    /// Inequality.
    #[must_use]
    pub fn not_equal(&self, value: impl ScalarOperand) -> PropertyCondition {
        value.into_condition(self.clone(), Operation::NotEqual)
    }

    /// Strictly greater than `value`.
    #[must_use]
    pub fn greater(&self, value: impl ScalarOperand) -> PropertyCondition {
        value.into_condition(self.clone(), Operation::Greater)
    }

    /// Strictly less than `value`.
    #[must_use]
    pub fn less(&self, value: impl ScalarOperand) -> PropertyCondition {
        value.into_condition(self.clone(), Operation::Less)
    }

    /// Inclusive range.
    #[must_use]
    pub fn between<V: RangeOperand>(&self, low: V, high: V) -> PropertyCondition {
        V::into_range(low, high, self.clone())
    }

    /// Value is one of `values`.
    #[must_use]
    pub fn one_of(&self, values: impl MembershipOperand) -> PropertyCondition {
        values.into_membership(self.clone(), Operation::In)
    }

    /// Value is none of `values`.
    #[must_use]
    pub fn not_one_of(&self, values: impl MembershipOperand) -> PropertyCondition {
        values.into_membership(self.clone(), Operation::NotIn)
    }

    /// Text membership with an explicit string order.
    #[must_use]
    pub fn one_of_with_order<I, S>(&self, values: I, order: StringOrder) -> PropertyCondition
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        PropertyCondition::text_array(self.clone(), Operation::In, values, order)
    }

    /// Text equality with an explicit string order.
    #[must_use]
    pub fn equal_with_order(&self, value: impl Into<String>, order: StringOrder) -> PropertyCondition {
        PropertyCondition::text(self.clone(), Operation::Equal, value, order)
    }

    /// Text inequality with an explicit string order.
    #[must_use]
    pub fn not_equal_with_order(&self, value: impl Into<String>, order: StringOrder) -> PropertyCondition {
        PropertyCondition::text(self.clone(), Operation::NotEqual, value, order)
    }

    /// `greater` with an explicit string order.
    #[must_use]
    pub fn greater_with_order(&self, value: impl Into<String>, order: StringOrder) -> PropertyCondition {
        PropertyCondition::text(self.clone(), Operation::Greater, value, order)
    }

    /// `less` with an explicit string order.
    #[must_use]
    pub fn less_with_order(&self, value: impl Into<String>, order: StringOrder) -> PropertyCondition {
        PropertyCondition::text(self.clone(), Operation::Less, value, order)
    }

    /// Text contains `value`, ignoring case.
    #[must_use]
    pub fn contains(&self, value: impl Into<String>) -> PropertyCondition {
        self.contains_with_order(value, StringOrder::default())
    }

    /// `contains` with an explicit string order.
    #[must_use]
    pub fn contains_with_order(&self, value: impl Into<String>, order: StringOrder) -> PropertyCondition {
        PropertyCondition::text(self.clone(), Operation::Contains, value, order)
    }

    /// Text starts with `value`, ignoring case.
    #[must_use]
    pub fn starts_with(&self, value: impl Into<String>) -> PropertyCondition {
        self.starts_with_with_order(value, StringOrder::default())
    }

    /// `starts_with` with an explicit string order.
    #[must_use]
    pub fn starts_with_with_order(&self, value: impl Into<String>, order: StringOrder) -> PropertyCondition {
        PropertyCondition::text(self.clone(), Operation::StartsWith, value, order)
    }

    /// Text ends with `value`, ignoring case.
    #[must_use]
    pub fn ends_with(&self, value: impl Into<String>) -> PropertyCondition {
        self.ends_with_with_order(value, StringOrder::default())
    }

    /// `ends_with` with an explicit string order.
    #[must_use]
    pub fn ends_with_with_order(&self, value: impl Into<String>, order: StringOrder) -> PropertyCondition {
        PropertyCondition::text(self.clone(), Operation::EndsWith, value, order)
    }
}
