//! Typed Rust structs mapped onto property sets.
//!
//! A [`Bean`] is a struct whose fields are properties. It is usually derived:
//!
//! ```ignore
//! use docmap::{Bean, bson::oid::ObjectId};
//!
//! #[derive(Debug, Clone, PartialEq, Bean)]
//! struct Person {
//!     #[bean(id)]
//!     id: Option<ObjectId>,
//!     name: String,
//!     #[bean(path = "addr")]
//!     address: Address,
//! }
//!
//! #[derive(Debug, Clone, PartialEq, Bean)]
//! struct Address {
//!     city: String,
//! }
//! ```
//!
//! Field types implement [`BeanValue`], which links a Rust type to its [`PropertyType`]
//! and to the [`Value`] it is carried as. Nested beans are embedded documents.

use bson::{Document, oid::ObjectId};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::{
    error::{DatastoreError, DatastoreResult},
    property::{PropertyBox, PropertySet},
    value::{PropertyType, Value},
};

/// A struct mapped onto a [`PropertySet`].
pub trait Bean: Sized + Send + Sync {
    /// The property set describing this bean's fields.
    fn property_set() -> PropertySet;

    fn to_property_box(&self) -> DatastoreResult<PropertyBox>;

    fn from_property_box(value: &PropertyBox) -> DatastoreResult<Self>;
}

/// A type usable as a bean field.
pub trait BeanValue: Sized {
    /// The declared type of a property holding this value.
    fn property_type() -> PropertyType;

    /// The value to store; `None` leaves the property unset.
    fn to_value(&self) -> DatastoreResult<Option<Value>>;

    /// Rebuilds the field from a property value; `None` when the property is unset.
    fn from_value(value: Option<&Value>) -> DatastoreResult<Self>;
}

/// Reads a bean field from a property box, naming the property in type errors.
pub fn read_field<T: BeanValue>(value: &PropertyBox, name: &str) -> DatastoreResult<T> {
    T::from_value(value.get(name)).map_err(|err| match err {
        DatastoreError::TypeMismatch { expected, actual, .. } => DatastoreError::TypeMismatch {
            path: name.to_string(),
            expected,
            actual,
        },
        other => other,
    })
}

/// The error reported when a value does not fit the requested field type.
pub fn mismatch<T: BeanValue>(value: Option<&Value>) -> DatastoreError {
    DatastoreError::TypeMismatch {
        path: String::new(),
        expected: T::property_type().to_string(),
        actual: value.map_or("Null", Value::type_name).to_string(),
    }
}

macro_rules! bean_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl BeanValue for $ty {
                fn property_type() -> PropertyType {
                    PropertyType::$variant
                }

                fn to_value(&self) -> DatastoreResult<Option<Value>> {
                    Ok(Some(Value::$variant(self.clone())))
                }

                fn from_value(value: Option<&Value>) -> DatastoreResult<Self> {
                    match value {
                        Some(Value::$variant(inner)) => Ok(inner.clone()),
                        other => Err(mismatch::<Self>(other)),
                    }
                }
            }
        )*
    };
}

bean_value! {
    String => String,
    bool => Boolean,
    i32 => Integer,
    i64 => Long,
    f64 => Double,
    u128 => BigInteger,
    ObjectId => ObjectId,
    NaiveDate => Date,
    DateTime<Utc> => DateTime,
    NaiveDateTime => LocalDateTime,
    NaiveTime => Time,
    Document => Document,
}

impl<T: BeanValue> BeanValue for Option<T> {
    fn property_type() -> PropertyType {
        T::property_type()
    }

    fn to_value(&self) -> DatastoreResult<Option<Value>> {
        match self {
            Some(inner) => inner.to_value(),
            None => Ok(None),
        }
    }

    fn from_value(value: Option<&Value>) -> DatastoreResult<Self> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::from_value(Some(value)).map(Some),
        }
    }
}

impl<T: BeanValue> BeanValue for Vec<T> {
    fn property_type() -> PropertyType {
        PropertyType::array_of(T::property_type())
    }

    fn to_value(&self) -> DatastoreResult<Option<Value>> {
        let items = self
            .iter()
            .map(|item| item.to_value().map(|value| value.unwrap_or(Value::Null)))
            .collect::<DatastoreResult<Vec<_>>>()?;

        Ok(Some(Value::Array(items)))
    }

    fn from_value(value: Option<&Value>) -> DatastoreResult<Self> {
        match value {
            Some(Value::Array(items)) => items.iter().map(|item| T::from_value(Some(item))).collect(),
            other => Err(mismatch::<Self>(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Property;

    #[derive(Debug, PartialEq)]
    struct Tagged {
        label: String,
        tags: Vec<String>,
        rank: Option<i32>,
    }

    impl Bean for Tagged {
        fn property_set() -> PropertySet {
            PropertySet::new([
                Property::named("label", String::property_type()),
                Property::named("tags", Vec::<String>::property_type()),
                Property::named("rank", Option::<i32>::property_type()),
            ])
        }

        fn to_property_box(&self) -> DatastoreResult<PropertyBox> {
            let mut builder = PropertyBox::builder(Self::property_set());
            for (name, value) in [
                ("label", self.label.to_value()?),
                ("tags", self.tags.to_value()?),
                ("rank", self.rank.to_value()?),
            ] {
                if let Some(value) = value {
                    builder = builder.set(name, value);
                }
            }
            builder.build()
        }

        fn from_property_box(value: &PropertyBox) -> DatastoreResult<Self> {
            Ok(Tagged {
                label: read_field(value, "label")?,
                tags: read_field(value, "tags")?,
                rank: read_field(value, "rank")?,
            })
        }
    }

    #[test]
    fn bean_to_property_box_and_back() {
        let bean = Tagged {
            label: "a".to_string(),
            tags: vec!["x".to_string(), "y".to_string()],
            rank: None,
        };

        let value = bean.to_property_box().unwrap();
        assert!(!value.contains_value("rank"));
        assert_eq!(
            value.get("tags"),
            Some(&Value::Array(vec![Value::from("x"), Value::from("y")]))
        );
        assert_eq!(Tagged::from_property_box(&value).unwrap(), bean);
    }

    #[test]
    fn missing_required_field_names_the_property() {
        let value = PropertyBox::builder(Tagged::property_set())
            .set("tags", Value::Array(Vec::new()))
            .build()
            .unwrap();

        let err = Tagged::from_property_box(&value).unwrap_err();
        assert_eq!(
            err,
            DatastoreError::TypeMismatch {
                path: "label".to_string(),
                expected: "String".to_string(),
                actual: "Null".to_string(),
            }
        );
    }

    #[test]
    fn option_reads_null_as_none() {
        assert_eq!(Option::<i64>::from_value(Some(&Value::Null)).unwrap(), None);
        assert_eq!(Option::<i64>::from_value(Some(&Value::Long(3))).unwrap(), Some(3));
        assert!(i64::from_value(Some(&Value::Integer(3))).is_err());
    }
}
