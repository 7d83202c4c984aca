//! Rebinding condition operands on a compiled query.
//!
//! A parameter is addressed by its property, or by property and alias when
//! the plan holds several conditions on the same property. Booleans bind as
//! 1/0 and timestamps as epoch milliseconds, the same coercions the
//! condition constructors apply.

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};
use crate::property::Property;
use crate::storage::EntityBox;
use crate::time::{bool_to_int, epoch_millis};

use super::Query;

/// A single operand value.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParameterValue {
    Text(String),
    Int(i64),
    Float(f64),
}

/// A two-operand value for `between` conditions.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterRange {
    Int { low: i64, high: i64 },
    Float { low: f64, high: f64 },
}

/// Values accepted by [`Query::set_parameter`].
pub trait IntoParameter {
    /// Coerces into a bindable value.
    fn into_parameter(self) -> QueryResult<ParameterValue>;
}

/// Values accepted by [`Query::set_parameters`].
pub trait RangeParameter: Sized {
    /// Coerces both bounds.
    fn into_range(low: Self, high: Self) -> QueryResult<ParameterRange>;
}

impl IntoParameter for ParameterValue {
    fn into_parameter(self) -> QueryResult<ParameterValue> {
        Ok(self)
    }
}

macro_rules! int_parameter {
    ($($t:ty),*) => {
        $(
            impl IntoParameter for $t {
                fn into_parameter(self) -> QueryResult<ParameterValue> {
                    Ok(ParameterValue::Int(i64::from(self)))
                }
            }
        )*
    };
}

int_parameter!(i8, i16, i32, i64, u8, u16, u32);

impl IntoParameter for bool {
    fn into_parameter(self) -> QueryResult<ParameterValue> {
        Ok(ParameterValue::Int(bool_to_int(self)))
    }
}

impl IntoParameter for f64 {
    fn into_parameter(self) -> QueryResult<ParameterValue> {
        Ok(ParameterValue::Float(self))
    }
}

impl IntoParameter for f32 {
    fn into_parameter(self) -> QueryResult<ParameterValue> {
        Ok(ParameterValue::Float(f64::from(self)))
    }
}

impl IntoParameter for &str {
    fn into_parameter(self) -> QueryResult<ParameterValue> {
        Ok(ParameterValue::Text(self.to_string()))
    }
}

impl IntoParameter for String {
    fn into_parameter(self) -> QueryResult<ParameterValue> {
        Ok(ParameterValue::Text(self))
    }
}

impl<Tz: TimeZone> IntoParameter for DateTime<Tz> {
    fn into_parameter(self) -> QueryResult<ParameterValue> {
        Ok(ParameterValue::Int(epoch_millis(&self)))
    }
}

impl<Tz: TimeZone> IntoParameter for &DateTime<Tz> {
    fn into_parameter(self) -> QueryResult<ParameterValue> {
        Ok(ParameterValue::Int(epoch_millis(self)))
    }
}

/// An absent timestamp cannot be bound.
impl<Tz: TimeZone> IntoParameter for Option<DateTime<Tz>> {
    fn into_parameter(self) -> QueryResult<ParameterValue> {
        self.map(|value| ParameterValue::Int(epoch_millis(&value)))
            .ok_or_else(|| QueryError::invalid_argument("value", "date parameter must not be null"))
    }
}

impl RangeParameter for i64 {
    fn into_range(low: Self, high: Self) -> QueryResult<ParameterRange> {
        Ok(ParameterRange::Int { low, high })
    }
}

impl RangeParameter for i32 {
    fn into_range(low: Self, high: Self) -> QueryResult<ParameterRange> {
        Ok(ParameterRange::Int {
            low: i64::from(low),
            high: i64::from(high),
        })
    }
}

impl RangeParameter for f64 {
    fn into_range(low: Self, high: Self) -> QueryResult<ParameterRange> {
        Ok(ParameterRange::Float { low, high })
    }
}

impl<Tz: TimeZone> RangeParameter for DateTime<Tz> {
    fn into_range(low: Self, high: Self) -> QueryResult<ParameterRange> {
        Ok(ParameterRange::Int {
            low: epoch_millis(&low),
            high: epoch_millis(&high),
        })
    }
}

impl<Tz: TimeZone> RangeParameter for Option<DateTime<Tz>> {
    fn into_range(low: Self, high: Self) -> QueryResult<ParameterRange> {
        match (low, high) {
            (Some(low), Some(high)) => <DateTime<Tz>>::into_range(low, high),
            _ => Err(QueryError::invalid_argument(
                "value",
                "date range bounds must not be null",
            )),
        }
    }
}

impl<B: EntityBox> Query<B> {
    /// Rebinds the operand of the single condition on `property`.
    ///
    /// # Errors
    ///
    /// Engine errors if no condition, or more than one, targets `property`,
    /// or if the value type does not fit the condition.
    pub fn set_parameter(&self, property: &Property, value: impl IntoParameter) -> QueryResult<&Self> {
        self.bind(property, None, value.into_parameter()?)
    }

    /// Rebinds the operand of the condition tagged with `alias`.
    ///
    /// An empty alias addresses the property as [`Query::set_parameter`] does.
    pub fn set_aliased_parameter(
        &self,
        property: &Property,
        alias: &str,
        value: impl IntoParameter,
    ) -> QueryResult<&Self> {
        self.bind(property, non_empty(alias), value.into_parameter()?)
    }

    /// Rebinds both bounds of a `between` condition.
    pub fn set_parameters<V: RangeParameter>(
        &self,
        property: &Property,
        low: V,
        high: V,
    ) -> QueryResult<&Self> {
        self.bind_range(property, None, V::into_range(low, high)?)
    }

    /// Range form of [`set_aliased_parameter`](Self::set_aliased_parameter).
    pub fn set_aliased_parameters<V: RangeParameter>(
        &self,
        property: &Property,
        alias: &str,
        low: V,
        high: V,
    ) -> QueryResult<&Self> {
        self.bind_range(property, non_empty(alias), V::into_range(low, high)?)
    }

    fn bind(&self, property: &Property, alias: Option<&str>, value: ParameterValue) -> QueryResult<&Self> {
        let id = property.id();
        self.core.with_handle(|engine, query| match &value {
            ParameterValue::Text(v) => engine.set_parameter_text(query, id, alias, v),
            ParameterValue::Int(v) => engine.set_parameter_int(query, id, alias, *v),
            ParameterValue::Float(v) => engine.set_parameter_float(query, id, alias, *v),
        })?;
        Ok(self)
    }

    fn bind_range(&self, property: &Property, alias: Option<&str>, range: ParameterRange) -> QueryResult<&Self> {
        let id = property.id();
        self.core.with_handle(|engine, query| match range {
            ParameterRange::Int { low, high } => engine.set_parameters_int(query, id, alias, low, high),
            ParameterRange::Float { low, high } => {
                engine.set_parameters_float(query, id, alias, low, high)
            }
        })?;
        Ok(self)
    }
}

fn non_empty(alias: &str) -> Option<&str> {
    Some(alias).filter(|a| !a.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_scalar_coercions() {
        assert_eq!(true.into_parameter().unwrap(), ParameterValue::Int(1));
        assert_eq!(false.into_parameter().unwrap(), ParameterValue::Int(0));
        assert_eq!(7_u8.into_parameter().unwrap(), ParameterValue::Int(7));
        assert_eq!(1.5_f32.into_parameter().unwrap(), ParameterValue::Float(1.5));
        assert_eq!("x".into_parameter().unwrap(), ParameterValue::Text("x".into()));
    }

    #[test]
    fn test_dates_bind_as_epoch_millis() {
        let at = Utc.timestamp_millis_opt(1_600_000_000_123).unwrap();
        assert_eq!(at.into_parameter().unwrap(), ParameterValue::Int(1_600_000_000_123));
        assert_eq!(
            <DateTime<Utc>>::into_range(at, at).unwrap(),
            ParameterRange::Int {
                low: 1_600_000_000_123,
                high: 1_600_000_000_123
            }
        );
    }

    #[test]
    fn test_null_date_is_rejected() {
        let err = None::<DateTime<Utc>>.into_parameter().unwrap_err();
        assert!(err.is_validation());
        let err = <Option<DateTime<Utc>>>::into_range(None, Some(Utc::now())).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_empty_alias_means_none() {
        assert_eq!(non_empty(""), None);
        assert_eq!(non_empty("min"), Some("min"));
    }

    #[test]
    fn test_parameter_value_serde_shape() {
        let json = serde_json::to_string(&ParameterValue::Int(3)).unwrap();
        assert_eq!(json, r#"{"type":"int","value":3}"#);
    }
}
