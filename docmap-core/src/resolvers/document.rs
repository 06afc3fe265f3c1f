//! [`PropertyBox`] to document conversion, both ways.
//!
//! [`PropertyBox`]: crate::property::PropertyBox

use bson::{Bson, Document};
use tracing::trace;

use crate::{
    context::ResolutionContext,
    error::{DatastoreError, DatastoreResult},
    expression::{BsonExpression, BsonFieldValue, DocumentValue, FieldName, FieldValue, PropertyBoxValue},
    path::{PATH_SEPARATOR, Path},
    property::{PropertyBox, PropertySet},
    resolver::{BUILTIN_PRIORITY, ExpressionResolver},
};

/// Encodes a property box into a document, expanding dotted names into sub-documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyBoxEncoder;

impl ExpressionResolver<PropertyBoxValue, DocumentValue> for PropertyBoxEncoder {
    fn resolve(
        &self,
        expression: &PropertyBoxValue,
        context: &ResolutionContext,
    ) -> DatastoreResult<Option<DocumentValue>> {
        let value = &expression.0;
        let in_scope = context
            .document_context()
            .is_some_and(|d| d.property_set() == value.property_set());
        let scoped;
        let context = if in_scope {
            context
        } else {
            scoped = context.for_document(value.property_set())?;
            &scoped
        };

        let mut document = Document::new();
        for (property, field) in value.iter() {
            let name: FieldName = context.resolve_or_fail(property.path())?;
            let encoded: BsonExpression =
                context.resolve_or_fail(&FieldValue::typed(field.clone(), property.clone()))?;
            insert_dotted(&mut document, name.as_str(), encoded.into_value())?;
        }

        Ok(Some(DocumentValue(document)))
    }

    fn priority(&self) -> i32 {
        BUILTIN_PRIORITY
    }
}

/// Inserts a value at a dotted field name, creating the intermediate sub-documents.
pub(crate) fn insert_dotted(document: &mut Document, name: &str, value: Bson) -> DatastoreResult<()> {
    match name.split_once(PATH_SEPARATOR) {
        None if document.contains_key(name) => Err(DatastoreError::InvalidExpression(format!(
            "More than one property is mapped to field '{name}'"
        ))),
        None => {
            document.insert(name, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }
            match document.get_mut(head) {
                Some(Bson::Document(nested)) => insert_dotted(nested, rest, value),
                _ => Err(DatastoreError::InvalidExpression(format!(
                    "Field '{head}' is both a value and the parent of '{rest}'"
                ))),
            }
        }
    }
}

/// Decodes a document into a property box shaped by the document context's property set.
///
/// Fields with no matching property are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentDecoder;

impl ExpressionResolver<DocumentValue, PropertyBoxValue> for DocumentDecoder {
    fn resolve(
        &self,
        expression: &DocumentValue,
        context: &ResolutionContext,
    ) -> DatastoreResult<Option<PropertyBoxValue>> {
        let Some(document_context) = context.document_context() else {
            return Ok(None);
        };
        let set = document_context.property_set();

        let mut builder = PropertyBox::builder(set.clone());
        for (name, value) in decode_fields(&expression.0, None, set, context)? {
            builder = builder.set(name, value);
        }

        builder.build().map(|value| Some(PropertyBoxValue(value)))
    }

    fn priority(&self) -> i32 {
        BUILTIN_PRIORITY
    }
}

fn decode_fields(
    document: &Document,
    prefix: Option<&str>,
    set: &PropertySet,
    context: &ResolutionContext,
) -> DatastoreResult<Vec<(String, crate::value::Value)>> {
    let mut decoded = Vec::new();

    for (key, value) in document {
        let name = match prefix {
            Some(prefix) => format!("{prefix}{PATH_SEPARATOR}{key}"),
            None => key.clone(),
        };
        if Path::parse(&name).is_err() {
            trace!(field = %name, "skipping unaddressable field");
            continue;
        }

        let path: Path = context.resolve_or_fail(&FieldName(name.clone()))?;
        match (set.get_path(&path), value) {
            (Some(property), _) => {
                let field: FieldValue =
                    context.resolve_or_fail(&BsonFieldValue::new(value.clone(), property.clone()))?;
                decoded.push((property.name(), field.value));
            }
            (None, Bson::Document(nested)) => {
                decoded.extend(decode_fields(nested, Some(&name), set, context)?);
            }
            (None, _) => trace!(field = %name, "ignoring field without property"),
        }
    }

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        property::Property,
        value::{EnumCodecStrategy, EnumType, PropertyType, Value},
    };
    use bson::{doc, oid::ObjectId};
    use chrono::DateTime;
    use proptest::prelude::*;

    fn set() -> PropertySet {
        PropertySet::new([
            Property::named("id", PropertyType::ObjectId).identifier(),
            Property::named("name", PropertyType::String),
            Property::named("address.city", PropertyType::String),
            Property::named("address.zip", PropertyType::Integer),
        ])
    }

    #[test]
    fn dotted_names_become_sub_documents() {
        let id = ObjectId::new();
        let value = PropertyBox::builder(set())
            .set("id", id)
            .set("name", "Alice")
            .set("address.city", "Rome")
            .set("address.zip", 100)
            .build()
            .unwrap();

        let document = ResolutionContext::default().encode_property_box(&value).unwrap();

        assert_eq!(
            document,
            doc! { "_id": id, "name": "Alice", "address": { "city": "Rome", "zip": 100 } }
        );
    }

    #[test]
    fn decoding_walks_nested_documents_and_ignores_unknown_fields() {
        let id = ObjectId::new();
        let document = doc! {
            "_id": id,
            "extra": true,
            "address": { "city": "Rome", "country": "IT" },
        };

        let value = ResolutionContext::default().decode_document(&document, &set()).unwrap();

        assert_eq!(value.get("id"), Some(&Value::ObjectId(id)));
        assert_eq!(value.get("address.city"), Some(&Value::from("Rome")));
        assert!(!value.contains_value("name"));
        assert!(!value.contains_value("address.zip"));
    }

    #[test]
    fn conflicting_dotted_names_fail() {
        let mut document = doc! { "a": 1 };

        assert!(insert_dotted(&mut document, "a.b", Bson::Int32(2)).is_err());
        assert!(matches!(
            insert_dotted(&mut document, "a", Bson::Int32(3)),
            Err(DatastoreError::InvalidExpression(_))
        ));
        assert_eq!(document, doc! { "a": 1 });
    }

    #[test]
    fn properties_sharing_a_field_name_fail_to_encode() {
        let city = PropertySet::new([Property::named("city", PropertyType::String)]);
        let set = PropertySet::new([
            Property::named("id", PropertyType::ObjectId).identifier(),
            Property::named("address.city", PropertyType::String),
            Property::named("address", PropertyType::Embedded(city.clone())),
        ]);
        let address = PropertyBox::builder(city)
            .set("city", "Oslo")
            .build()
            .unwrap();
        let value = PropertyBox::builder(set)
            .set("address.city", "Rome")
            .set("address", address)
            .build()
            .unwrap();

        let err = ResolutionContext::default().encode_property_box(&value).unwrap_err();
        assert!(matches!(err, DatastoreError::InvalidExpression(_)));
    }

    #[test]
    fn embedded_property_box_round_trip() {
        let address = PropertySet::new([
            Property::named("city", PropertyType::String),
            Property::named("oid", PropertyType::ObjectId),
        ]);
        let set = PropertySet::new([
            Property::named("code", PropertyType::String).identifier(),
            Property::named("address", PropertyType::Embedded(address.clone())),
        ]);
        let oid = ObjectId::new();
        let embedded = PropertyBox::builder(address)
            .set("city", "Oslo")
            .set("oid", oid)
            .build()
            .unwrap();
        let code = ObjectId::new().to_hex();
        let value = PropertyBox::builder(set.clone())
            .set("code", code.as_str())
            .set("address", embedded)
            .build()
            .unwrap();

        let context = ResolutionContext::default();
        let document = context.encode_property_box(&value).unwrap();

        assert_eq!(
            document.get_document("address").unwrap(),
            &doc! { "city": "Oslo", "oid": oid }
        );
        assert_eq!(context.decode_document(&document, &set).unwrap(), value);
    }

    fn typed_set() -> PropertySet {
        PropertySet::new([
            Property::named("label", PropertyType::String),
            Property::named("count", PropertyType::Integer),
            Property::named("total", PropertyType::Long),
            Property::named("ratio", PropertyType::Double),
            Property::named("flag", PropertyType::Boolean),
            Property::named("at", PropertyType::DateTime),
            Property::named("level", PropertyType::Enum(EnumType::new("Level", ["Low", "High"]))),
            Property::named("tags", PropertyType::array_of(PropertyType::String)),
            Property::named("meta.owner", PropertyType::String),
        ])
    }

    proptest! {
        #[test]
        fn encoded_values_decode_to_the_same_box(
            label in "[a-z ]{0,12}",
            count in any::<i32>(),
            total in any::<i64>(),
            ratio in -1.0e9f64..1.0e9,
            flag in any::<bool>(),
            millis in 0i64..4_102_444_800_000,
            high in any::<bool>(),
            tags in prop::collection::vec("[a-z]{1,6}", 0..4),
            owner in "[a-z]{1,8}",
        ) {
            let Some(at) = DateTime::from_timestamp_millis(millis) else {
                return Err(TestCaseError::reject("timestamp out of range"));
            };
            let value = PropertyBox::builder(typed_set())
                .set("label", label.as_str())
                .set("count", count)
                .set("total", Value::Long(total))
                .set("ratio", Value::Double(ratio))
                .set("flag", flag)
                .set("at", Value::DateTime(at))
                .set("level", Value::Enum(if high { "High" } else { "Low" }.to_string()))
                .set("tags", Value::Array(tags.into_iter().map(Value::String).collect()))
                .set("meta.owner", owner.as_str())
                .build()
                .unwrap();

            for strategy in [EnumCodecStrategy::Name, EnumCodecStrategy::Ordinal] {
                let context = ResolutionContext::builder().enum_codec_strategy(strategy).build();
                let document = context.encode_property_box(&value).unwrap();
                prop_assert_eq!(context.decode_document(&document, &typed_set()).unwrap(), value.clone());
            }
        }
    }
}
