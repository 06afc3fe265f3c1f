//! The expression vocabulary exchanged with the resolver chain.
//!
//! Expressions are immutable values. Each one can check its own structural consistency
//! through [`Expression::validate`], which runs before any resolver sees it.

use std::fmt::Debug;

use bson::{Bson, Document};

use crate::{
    error::{DatastoreError, DatastoreResult},
    path::Path,
    property::{Property, PropertyBox},
    value::Value,
};

/// A self-validating value that can be resolved into another expression.
pub trait Expression: Debug + Send + Sync + 'static {
    /// Checks the structural consistency of this expression.
    fn validate(&self) -> DatastoreResult<()> {
        Ok(())
    }
}

impl Expression for Path {
    fn validate(&self) -> DatastoreResult<()> {
        Path::validate(self)
    }
}

/// A raw, dot-joined document field name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldName(pub String);

impl FieldName {
    pub fn new(name: impl Into<String>) -> Self {
        FieldName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Expression for FieldName {
    fn validate(&self) -> DatastoreResult<()> {
        Path::parse(&self.0).map(|_| ())
    }
}

/// A value pending encoding, with the property that gives it its type context.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    pub value: Value,
    pub property: Option<Property>,
}

impl FieldValue {
    pub fn new(value: impl Into<Value>) -> Self {
        FieldValue {
            value: value.into(),
            property: None,
        }
    }

    pub fn typed(value: impl Into<Value>, property: Property) -> Self {
        FieldValue {
            value: value.into(),
            property: Some(property),
        }
    }
}

impl Expression for FieldValue {
    fn validate(&self) -> DatastoreResult<()> {
        match &self.property {
            Some(property) if !self.value.is_compatible_with(property.property_type()) => {
                Err(DatastoreError::TypeMismatch {
                    path: property.name(),
                    expected: property.property_type().to_string(),
                    actual: self.value.type_name().to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// An encoded BSON value pending decoding into the given property's type.
#[derive(Debug, Clone, PartialEq)]
pub struct BsonFieldValue {
    pub value: Bson,
    pub property: Property,
}

impl BsonFieldValue {
    pub fn new(value: Bson, property: Property) -> Self {
        BsonFieldValue { value, property }
    }
}

impl Expression for BsonFieldValue {}

/// A raw BSON document, either pending decoding or the result of an encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentValue(pub Document);

impl Expression for DocumentValue {}

/// A typed [`PropertyBox`], either pending encoding or the result of a decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyBoxValue(pub PropertyBox);

impl Expression for PropertyBoxValue {
    fn validate(&self) -> DatastoreResult<()> {
        self.0.property_set().validate()
    }
}

/// A final, driver-native BSON construct: a filter, sort, projection, update document,
/// pipeline stage or encoded scalar.
#[derive(Debug, Clone, PartialEq)]
pub struct BsonExpression(pub Bson);

impl BsonExpression {
    pub fn value(&self) -> &Bson {
        &self.0
    }

    pub fn into_value(self) -> Bson {
        self.0
    }

    /// Unwraps the expression as a document.
    ///
    /// # Errors
    ///
    /// Fails with [`DatastoreError::InvalidExpression`] if the value is not a document.
    pub fn into_document(self) -> DatastoreResult<Document> {
        match self.0 {
            Bson::Document(document) => Ok(document),
            other => Err(DatastoreError::InvalidExpression(format!(
                "Expected a BSON document, found {other}"
            ))),
        }
    }
}

impl From<Document> for BsonExpression {
    fn from(document: Document) -> Self {
        BsonExpression(Bson::Document(document))
    }
}

impl Expression for BsonExpression {}

/// A logical data target, resolved into a [`CollectionName`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataTarget(pub String);

impl DataTarget {
    pub fn named(name: impl Into<String>) -> Self {
        DataTarget(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Expression for DataTarget {
    fn validate(&self) -> DatastoreResult<()> {
        if self.0.is_empty() {
            return Err(DatastoreError::InvalidExpression(
                "Data target name must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// A validated MongoDB collection name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionName(pub String);

impl CollectionName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Expression for CollectionName {
    fn validate(&self) -> DatastoreResult<()> {
        let name = &self.0;
        if name.is_empty() || name.contains('$') || name.contains('\0') || name.starts_with("system.")
        {
            return Err(DatastoreError::InvalidExpression(format!(
                "Invalid collection name '{name}'"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PropertyType;
    use rstest::rstest;

    #[rstest]
    #[case("users", true)]
    #[case("", false)]
    #[case("us$ers", false)]
    #[case("system.users", false)]
    fn collection_name_validation(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(CollectionName(name.to_string()).validate().is_ok(), valid);
    }

    #[test]
    fn field_value_checks_type() {
        let property = Property::named("count", PropertyType::Integer);

        assert!(FieldValue::typed(1, property.clone()).validate().is_ok());
        assert!(FieldValue::typed("one", property).validate().is_err());
    }

    #[test]
    fn field_name_rejects_empty_segments() {
        assert!(FieldName::new("a.b").validate().is_ok());
        assert!(FieldName::new("a..b").validate().is_err());
    }
}
