//! Properties, property sets and the [`PropertyBox`] value container.
//!
//! A [`PropertySet`] describes the shape of a logical record: an ordered list of named,
//! typed [`Property`] declarations. A [`PropertyBox`] holds values for (some of) the
//! properties of a set. Boxes are immutable once built; use [`PropertyBox::to_builder`]
//! to derive a modified copy.
//!
//! ```ignore
//! use docmap::{property::{Property, PropertySet, PropertyBox}, value::PropertyType};
//!
//! let set = PropertySet::new([
//!     Property::named("id", PropertyType::ObjectId).identifier(),
//!     Property::named("name", PropertyType::String),
//! ]);
//!
//! let value = PropertyBox::builder(set)
//!     .set("name", "Alice")
//!     .build()?;
//! ```

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    error::{DatastoreError, DatastoreResult},
    path::{PATH_SEPARATOR, Path},
    value::{PropertyType, TemporalType, Value},
};

/// A named, typed attribute of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    path: Path,
    property_type: PropertyType,
    identifier: bool,
    temporal: Option<TemporalType>,
}

impl Property {
    /// Creates a property bound to the given path.
    pub fn new(path: Path, property_type: PropertyType) -> Self {
        Property {
            path,
            property_type,
            identifier: false,
            temporal: None,
        }
    }

    /// Creates a property from a (possibly dotted) name.
    ///
    /// The name is not validated here; empty segments are reported when the property set
    /// is validated.
    pub fn named(name: &str, property_type: PropertyType) -> Self {
        let mut segments = name.split(PATH_SEPARATOR);
        let root = Path::new(segments.next().unwrap_or_default());
        let path = segments.fold(root, |parent, segment| parent.child(segment));

        Property::new(path, property_type)
    }

    /// Declares this property as (part of) the record identifier.
    pub fn identifier(mut self) -> Self {
        self.identifier = true;
        self
    }

    /// Sets the temporal granularity used when encoding date-time values.
    pub fn temporal(mut self, temporal: TemporalType) -> Self {
        self.temporal = Some(temporal);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The dot-joined name of this property.
    pub fn name(&self) -> String {
        self.path.full_name()
    }

    pub fn property_type(&self) -> &PropertyType {
        &self.property_type
    }

    pub fn is_identifier(&self) -> bool {
        self.identifier
    }

    pub fn temporal_type(&self) -> Option<TemporalType> {
        self.temporal
    }
}

/// An ordered set of property declarations.
///
/// Cloning is cheap; the declarations are shared.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySet {
    properties: Arc<Vec<Property>>,
}

impl PropertySet {
    pub fn new(properties: impl IntoIterator<Item = Property>) -> Self {
        PropertySet {
            properties: Arc::new(properties.into_iter().collect()),
        }
    }

    pub fn builder() -> PropertySetBuilder {
        PropertySetBuilder::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Finds the first property with the given dot-joined name.
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == name)
    }

    /// Finds the first property bound to the given path.
    pub fn get_path(&self, path: &Path) -> Option<&Property> {
        self.properties.iter().find(|p| p.path() == path)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Properties declared as identifiers, in declaration order.
    pub fn identifiers(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter().filter(|p| p.is_identifier())
    }

    /// Validates every property path, recursing into embedded sets.
    pub fn validate(&self) -> DatastoreResult<()> {
        for property in self.iter() {
            property.path().validate()?;
            if let PropertyType::Embedded(nested) = property.property_type() {
                nested.validate()?;
            }
        }

        Ok(())
    }
}

impl FromIterator<Property> for PropertySet {
    fn from_iter<T: IntoIterator<Item = Property>>(iter: T) -> Self {
        PropertySet::new(iter)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PropertySetBuilder {
    properties: Vec<Property>,
}

impl PropertySetBuilder {
    pub fn add(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn build(self) -> PropertySet {
        PropertySet::new(self.properties)
    }
}

/// A typed value container shaped by a [`PropertySet`].
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyBox {
    set: PropertySet,
    values: BTreeMap<String, Value>,
}

impl PropertyBox {
    pub fn builder(set: PropertySet) -> PropertyBoxBuilder {
        PropertyBoxBuilder {
            set,
            values: Vec::new(),
        }
    }

    pub fn property_set(&self) -> &PropertySet {
        &self.set
    }

    /// The value of the property with the given dot-joined name, if set.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// The value of the given property, if set.
    pub fn value(&self, property: &Property) -> Option<&Value> {
        self.values.get(&property.name())
    }

    pub fn contains_value(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Set values paired with their property, in property set order.
    pub fn iter(&self) -> impl Iterator<Item = (&Property, &Value)> {
        self.set
            .iter()
            .filter_map(|property| self.value(property).map(|value| (property, value)))
    }

    /// A builder pre-populated with this box's values.
    pub fn to_builder(&self) -> PropertyBoxBuilder {
        PropertyBoxBuilder {
            set: self.set.clone(),
            values: self
                .values
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }

    /// A copy of this box with one value replaced.
    pub fn with_value(&self, name: &str, value: impl Into<Value>) -> DatastoreResult<PropertyBox> {
        self.to_builder().set(name, value).build()
    }
}

/// Collects values for a [`PropertyBox`]; validation happens in [`PropertyBoxBuilder::build`].
#[derive(Debug, Clone)]
pub struct PropertyBoxBuilder {
    set: PropertySet,
    values: Vec<(String, Value)>,
}

impl PropertyBoxBuilder {
    /// Sets a value; [`Value::Null`] clears it.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.push((name.into(), value.into()));
        self
    }

    /// Builds the box.
    ///
    /// # Errors
    ///
    /// Fails if a value names a property outside the set, or is not compatible with the
    /// declared property type.
    pub fn build(self) -> DatastoreResult<PropertyBox> {
        let mut values = BTreeMap::new();

        for (name, value) in self.values {
            let property = self.set.get(&name).ok_or_else(|| {
                DatastoreError::InvalidExpression(format!(
                    "Property '{name}' is not part of the property set"
                ))
            })?;

            if !value.is_compatible_with(property.property_type()) {
                return Err(DatastoreError::TypeMismatch {
                    path: name,
                    expected: property.property_type().to_string(),
                    actual: value.type_name().to_string(),
                });
            }

            if value.is_null() {
                values.remove(&name);
            } else {
                values.insert(name, value);
            }
        }

        Ok(PropertyBox {
            set: self.set,
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> PropertySet {
        PropertySet::builder()
            .add(Property::named("id", PropertyType::ObjectId).identifier())
            .add(Property::named("str", PropertyType::String))
            .add(Property::named("nested.value", PropertyType::Integer))
            .build()
    }

    #[test]
    fn named_property_builds_nested_path() {
        let property = Property::named("nested.value", PropertyType::Integer);

        assert_eq!(property.path(), &Path::new("nested").child("value"));
        assert_eq!(property.name(), "nested.value");
    }

    #[test]
    fn builder_validates_values() {
        let value = PropertyBox::builder(set())
            .set("str", "test")
            .set("nested.value", 3)
            .build()
            .unwrap();

        assert_eq!(value.get("str"), Some(&Value::from("test")));
        assert_eq!(value.iter().count(), 2);

        assert!(matches!(
            PropertyBox::builder(set()).set("str", 1).build(),
            Err(DatastoreError::TypeMismatch { .. })
        ));
        assert!(matches!(
            PropertyBox::builder(set()).set("missing", 1).build(),
            Err(DatastoreError::InvalidExpression(_))
        ));
    }

    #[test]
    fn with_value_copies() {
        let original = PropertyBox::builder(set()).set("str", "a").build().unwrap();
        let modified = original.with_value("str", "b").unwrap();

        assert_eq!(original.get("str"), Some(&Value::from("a")));
        assert_eq!(modified.get("str"), Some(&Value::from("b")));
        assert!(!modified.with_value("str", Value::Null).unwrap().contains_value("str"));
    }

    #[test]
    fn validate_rejects_empty_segments() {
        let set = PropertySet::new([Property::named("a..b", PropertyType::String)]);

        assert!(set.validate().is_err());
    }
}
