//! Property descriptors.
//!
//! A `Property` identifies one typed field of an entity. Descriptors are
//! produced by the schema registry (usually generated code) and are cheap to
//! clone; conditions and aggregates address the native engine by `PropertyId`.

use std::borrow::Cow;
use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

/// Numeric property id, unique within one entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyId(pub u32);

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stored value type of a property.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Bool,
    Int,
    Long,
    Float,
    Double,
    String,
    Bytes,
    /// Instant stored as epoch milliseconds.
    Date,
    IntVector,
    LongVector,
    StringVector,
}

impl PropertyType {
    /// True for types stored as 64-bit integers by the engine.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Bool | Self::Int | Self::Long | Self::Date)
    }

    /// True for types stored as floats.
    #[must_use]
    pub const fn is_floating(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }
}

/// Descriptor of one typed entity property.
///
/// # Examples
///
/// ```
/// use boxquery::{Property, PropertyType};
///
/// const AGE: Property = Property::new(2, "age", PropertyType::Int);
/// assert_eq!(AGE.id().0, 2);
/// assert_eq!(AGE.name(), "age");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Property {
    id: PropertyId,
    name: Cow<'static, str>,
    property_type: PropertyType,
}

impl Property {
    /// Creates a descriptor; usable in `const` context.
    #[must_use]
    pub const fn new(id: u32, name: &'static str, property_type: PropertyType) -> Self {
        Self {
            id: PropertyId(id),
            name: Cow::Borrowed(name),
            property_type,
        }
    }

    /// Creates a descriptor with an owned name (e.g. built from a runtime schema).
    #[must_use]
    pub fn with_name(id: u32, name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            id: PropertyId(id),
            name: Cow::Owned(name.into()),
            property_type,
        }
    }

    /// Schema id.
    #[must_use]
    pub const fn id(&self) -> PropertyId {
        self.id
    }

    /// Schema name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage type.
    #[must_use]
    pub const fn property_type(&self) -> PropertyType {
        self.property_type
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.id)
    }
}

/// Ordering mode for text comparisons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringOrder {
    /// Compares ASCII case-folded text.
    #[default]
    CaseInsensitive,
    /// Compares text as is.
    CaseSensitive,
}

impl StringOrder {
    /// Whether comparisons keep case.
    #[must_use]
    pub const fn is_case_sensitive(self) -> bool {
        matches!(self, Self::CaseSensitive)
    }
}

/// Flags controlling an explicit sort order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderFlags(u32);

impl OrderFlags {
    /// Ascending, case-insensitive, nulls first.
    pub const NONE: Self = Self(0);
    /// Largest first.
    pub const DESCENDING: Self = Self(1);
    /// Sort text without case folding.
    pub const CASE_SENSITIVE: Self = Self(1 << 1);
    /// Entities without a value sort after the rest.
    pub const NULLS_LAST: Self = Self(1 << 3);

    /// Raw flag bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OrderFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
