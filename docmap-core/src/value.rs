//! Typed values carried by properties, and the declared types they must conform to.

use std::fmt;

use bson::{Document, oid::ObjectId};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::property::{PropertyBox, PropertySet};

/// How enumeration values are written to documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumCodecStrategy {
    /// Encode the symbolic constant name.
    #[default]
    Name,
    /// Encode the zero-based ordinal of the constant.
    Ordinal,
}

/// Granularity used when writing [`PropertyType::DateTime`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemporalType {
    /// Only the calendar date is kept; the time of day is truncated to midnight UTC.
    Date,
    /// The full instant is kept.
    DateTime,
}

/// An enumeration declaration: a name plus its ordered constants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumType {
    name: String,
    constants: Vec<String>,
}

impl EnumType {
    pub fn new<I, S>(name: impl Into<String>, constants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EnumType {
            name: name.into(),
            constants: constants.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constants(&self) -> &[String] {
        &self.constants
    }

    /// The ordinal of the constant with the given name.
    pub fn ordinal_of(&self, constant: &str) -> Option<usize> {
        self.constants.iter().position(|c| c == constant)
    }

    /// The constant with the given ordinal.
    pub fn constant(&self, ordinal: usize) -> Option<&str> {
        self.constants.get(ordinal).map(String::as_str)
    }
}

/// The declared type of a property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyType {
    String,
    Boolean,
    Integer,
    Long,
    Double,
    /// Unsigned 128-bit integer, wide enough to carry a full `ObjectId`.
    BigInteger,
    Bytes,
    ObjectId,
    Date,
    DateTime,
    LocalDateTime,
    Time,
    Enum(EnumType),
    Array(Box<PropertyType>),
    /// An embedded document described by its own property set.
    Embedded(PropertySet),
    /// A raw BSON document.
    Document,
}

impl PropertyType {
    /// Shorthand for an array of the given element type.
    pub fn array_of(element: PropertyType) -> Self {
        PropertyType::Array(Box::new(element))
    }

    /// Whether this is one of the temporal types.
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            PropertyType::Date
                | PropertyType::DateTime
                | PropertyType::LocalDateTime
                | PropertyType::Time
        )
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyType::String => f.write_str("String"),
            PropertyType::Boolean => f.write_str("Boolean"),
            PropertyType::Integer => f.write_str("Integer"),
            PropertyType::Long => f.write_str("Long"),
            PropertyType::Double => f.write_str("Double"),
            PropertyType::BigInteger => f.write_str("BigInteger"),
            PropertyType::Bytes => f.write_str("Bytes"),
            PropertyType::ObjectId => f.write_str("ObjectId"),
            PropertyType::Date => f.write_str("Date"),
            PropertyType::DateTime => f.write_str("DateTime"),
            PropertyType::LocalDateTime => f.write_str("LocalDateTime"),
            PropertyType::Time => f.write_str("Time"),
            PropertyType::Enum(enum_type) => write!(f, "Enum({})", enum_type.name()),
            PropertyType::Array(element) => write!(f, "Array<{element}>"),
            PropertyType::Embedded(_) => f.write_str("Embedded"),
            PropertyType::Document => f.write_str("Document"),
        }
    }
}

/// A property value, independent of its BSON encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Boolean(bool),
    Integer(i32),
    Long(i64),
    Double(f64),
    BigInteger(u128),
    Bytes(Vec<u8>),
    ObjectId(ObjectId),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    LocalDateTime(NaiveDateTime),
    Time(NaiveTime),
    /// An enumeration constant, held by name.
    Enum(String),
    Array(Vec<Value>),
    PropertyBox(PropertyBox),
    Document(Document),
}

impl Value {
    /// A short name of the runtime type, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::String(_) => "String",
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Long(_) => "Long",
            Value::Double(_) => "Double",
            Value::BigInteger(_) => "BigInteger",
            Value::Bytes(_) => "Bytes",
            Value::ObjectId(_) => "ObjectId",
            Value::Date(_) => "Date",
            Value::DateTime(_) => "DateTime",
            Value::LocalDateTime(_) => "LocalDateTime",
            Value::Time(_) => "Time",
            Value::Enum(_) => "Enum",
            Value::Array(_) => "Array",
            Value::PropertyBox(_) => "PropertyBox",
            Value::Document(_) => "Document",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value may be assigned to a property of the given type.
    pub fn is_compatible_with(&self, property_type: &PropertyType) -> bool {
        match (self, property_type) {
            (Value::Null, _) => true,
            (Value::String(_), PropertyType::String)
            | (Value::Boolean(_), PropertyType::Boolean)
            | (Value::Integer(_), PropertyType::Integer)
            | (Value::Long(_), PropertyType::Long)
            | (Value::Double(_), PropertyType::Double)
            | (Value::BigInteger(_), PropertyType::BigInteger)
            | (Value::Bytes(_), PropertyType::Bytes)
            | (Value::ObjectId(_), PropertyType::ObjectId)
            | (Value::Date(_), PropertyType::Date)
            | (Value::DateTime(_), PropertyType::DateTime)
            | (Value::LocalDateTime(_), PropertyType::LocalDateTime)
            | (Value::Time(_), PropertyType::Time)
            | (Value::Document(_), PropertyType::Document) => true,
            (Value::Enum(constant), PropertyType::Enum(enum_type)) => {
                enum_type.ordinal_of(constant).is_some()
            }
            (Value::Array(items), PropertyType::Array(element)) => {
                items.iter().all(|item| item.is_compatible_with(element))
            }
            (Value::PropertyBox(value), PropertyType::Embedded(set)) => value.property_set() == set,
            _ => false,
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

value_from! {
    String => String,
    bool => Boolean,
    i32 => Integer,
    i64 => Long,
    f64 => Double,
    u128 => BigInteger,
    Vec<u8> => Bytes,
    ObjectId => ObjectId,
    NaiveDate => Date,
    DateTime<Utc> => DateTime,
    NaiveDateTime => LocalDateTime,
    NaiveTime => Time,
    PropertyBox => PropertyBox,
    Document => Document,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}
