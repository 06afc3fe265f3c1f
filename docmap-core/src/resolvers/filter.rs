//! Query filter translation into MongoDB filter documents.

use bson::{Bson, Document, doc};

use crate::{
    context::ResolutionContext,
    error::{DatastoreError, DatastoreResult},
    expression::{BsonExpression, FieldName, FieldValue},
    path::Path,
    property::Property,
    query::{FieldOp, QueryFilter, QueryVisitor},
    resolver::{BUILTIN_PRIORITY, ExpressionResolver},
    value::{PropertyType, Value},
};

/// Resolves a [`QueryFilter`] into a filter document.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterResolver;

impl ExpressionResolver<QueryFilter, BsonExpression> for FilterResolver {
    fn resolve(
        &self,
        filter: &QueryFilter,
        context: &ResolutionContext,
    ) -> DatastoreResult<Option<BsonExpression>> {
        FilterTranslator { context }
            .visit_filter(filter)
            .map(|document| Some(BsonExpression::from(document)))
    }

    fn priority(&self) -> i32 {
        BUILTIN_PRIORITY
    }
}

struct FilterTranslator<'a> {
    context: &'a ResolutionContext,
}

impl FilterTranslator<'_> {
    fn field_name(&self, path: &Path) -> DatastoreResult<String> {
        self.context
            .resolve_or_fail::<FieldName, _>(path)
            .map(|name| name.0)
    }

    fn property(&self, path: &Path) -> Option<Property> {
        self.context
            .document_context()
            .and_then(|document| document.property(path))
            .cloned()
    }

    /// Scalar operands of an array property are encoded as its elements. Operands not
    /// assignable to either are encoded without type context.
    fn encode(&self, value: &Value, property: Option<Property>) -> DatastoreResult<Bson> {
        let property = property.and_then(|p| {
            if value.is_compatible_with(p.property_type()) {
                return Some(p);
            }
            Self::element_property(Some(&p)).filter(|element| value.is_compatible_with(element.property_type()))
        });
        self.context
            .resolve_or_fail::<BsonExpression, _>(&FieldValue {
                value: value.clone(),
                property,
            })
            .map(BsonExpression::into_value)
    }

    /// Encodes each element of an operand list with the property's own type.
    fn encode_each(&self, values: &Value, property: Option<Property>) -> DatastoreResult<Bson> {
        match values {
            Value::Array(items) => items
                .iter()
                .map(|item| self.encode(item, property.clone()))
                .collect::<DatastoreResult<Vec<_>>>()
                .map(Bson::Array),
            other => Err(DatastoreError::InvalidExpression(format!(
                "Expected an array operand, found {}",
                other.type_name()
            ))),
        }
    }

    fn element_property(property: Option<&Property>) -> Option<Property> {
        property.and_then(|p| match p.property_type() {
            PropertyType::Array(element) => {
                let element = Property::new(p.path().clone(), (**element).clone());
                Some(match p.temporal_type() {
                    Some(temporal) => element.temporal(temporal),
                    None => element,
                })
            }
            _ => None,
        })
    }

    fn contains(&self, path: &Path, value: &Value) -> DatastoreResult<Document> {
        let property = self.property(path);
        if let Some(element) = Self::element_property(property.as_ref()) {
            return Ok(match value {
                Value::Array(_) => doc! { "$all": self.encode_each(value, Some(element))? },
                _ => doc! { "$eq": self.encode(value, Some(element))? },
            });
        }

        match value {
            Value::String(text) => Ok(doc! { "$regex": regex::escape(text) }),
            Value::Array(_) => Ok(doc! { "$all": self.encode_each(value, None)? }),
            _ => Ok(doc! { "$eq": self.encode(value, property)? }),
        }
    }
}

impl QueryVisitor for FilterTranslator<'_> {
    type Output = Document;
    type Error = DatastoreError;

    fn visit_and(&mut self, filters: &[QueryFilter]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$and": filters
                .iter()
                .map(|filter| self.visit_filter(filter))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, filters: &[QueryFilter]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$or": filters
                .iter()
                .map(|filter| self.visit_filter(filter))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_not(&mut self, filter: &QueryFilter) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$nor": [self.visit_filter(filter)?],
        })
    }

    fn visit_exists(&mut self, path: &Path, should_exist: bool) -> Result<Self::Output, Self::Error> {
        let field = self.field_name(path)?;
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_null(&mut self, path: &Path, is_null: bool) -> Result<Self::Output, Self::Error> {
        let field = self.field_name(path)?;
        Ok(doc! {
            field: if is_null { doc! { "$eq": Bson::Null } } else { doc! { "$ne": Bson::Null } },
        })
    }

    fn visit_field(&mut self, path: &Path, op: FieldOp, value: &Value) -> Result<Self::Output, Self::Error> {
        let field = self.field_name(path)?;
        let property = self.property(path);

        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": self.encode(value, property)? },
                FieldOp::Ne => doc! { "$ne": self.encode(value, property)? },
                FieldOp::Gt => doc! { "$gt": self.encode(value, property)? },
                FieldOp::Gte => doc! { "$gte": self.encode(value, property)? },
                FieldOp::Lt => doc! { "$lt": self.encode(value, property)? },
                FieldOp::Lte => doc! { "$lte": self.encode(value, property)? },
                FieldOp::In => doc! { "$in": self.encode_each(value, property)? },
                FieldOp::NotIn => doc! { "$nin": self.encode_each(value, property)? },
                FieldOp::Contains => self.contains(path, value)?,
                FieldOp::NotContains => doc! { "$not": self.contains(path, value)? },
                FieldOp::StartsWith => match value {
                    Value::String(text) => doc! { "$regex": format!("^{}", regex::escape(text)) },
                    _ => return Err(DatastoreError::InvalidExpression(
                        "StartsWith operator requires a string value".to_string(),
                    )),
                },
                FieldOp::EndsWith => match value {
                    Value::String(text) => doc! { "$regex": format!("{}$", regex::escape(text)) },
                    _ => return Err(DatastoreError::InvalidExpression(
                        "EndsWith operator requires a string value".to_string(),
                    )),
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        property::PropertySet,
        query::Filter,
        value::EnumType,
        value::EnumCodecStrategy,
    };
    use bson::oid::ObjectId;

    fn context(strategy: EnumCodecStrategy) -> ResolutionContext {
        let set = PropertySet::new([
            Property::named("code", PropertyType::String).identifier(),
            Property::named("status", PropertyType::Enum(EnumType::new("Status", ["Open", "Closed"]))),
            Property::named("tags", PropertyType::array_of(PropertyType::String)),
            Property::named(
                "levels",
                PropertyType::array_of(PropertyType::Enum(EnumType::new("Level", ["Low", "High"]))),
            ),
        ]);
        ResolutionContext::builder()
            .enum_codec_strategy(strategy)
            .build()
            .for_document(&set)
            .unwrap()
    }

    fn resolve(context: &ResolutionContext, filter: QueryFilter) -> Document {
        context
            .resolve_or_fail::<BsonExpression, _>(&filter)
            .unwrap()
            .into_document()
            .unwrap()
    }

    #[test]
    fn identifier_values_are_object_ids() {
        let id = ObjectId::new();
        let document = resolve(
            &context(EnumCodecStrategy::Name),
            Filter::any_of("code", [id.to_hex()]),
        );

        assert_eq!(document, doc! { "_id": { "$in": [id] } });
    }

    #[test]
    fn enum_operands_follow_strategy() {
        let filter = Filter::eq("status", Value::Enum("Closed".to_string()));

        assert_eq!(
            resolve(&context(EnumCodecStrategy::Ordinal), filter.clone()),
            doc! { "status": { "$eq": 1 } }
        );
        assert_eq!(
            resolve(&context(EnumCodecStrategy::Name), filter),
            doc! { "status": { "$eq": "Closed" } }
        );
    }

    #[test]
    fn array_element_operands_use_the_element_type() {
        let context = context(EnumCodecStrategy::Ordinal);
        let high = Value::Enum("High".to_string());

        assert_eq!(
            resolve(&context, Filter::eq("levels", high.clone())),
            doc! { "levels": { "$eq": 1 } }
        );
        assert_eq!(
            resolve(&context, Filter::any_of("levels", [Value::Enum("Low".to_string()), high.clone()])),
            doc! { "levels": { "$in": [0, 1] } }
        );
        assert_eq!(
            resolve(&context, Filter::eq("levels", Value::Array(vec![high]))),
            doc! { "levels": { "$eq": [1] } }
        );
    }

    #[test]
    fn string_operators_escape_patterns() {
        let context = context(EnumCodecStrategy::Name);

        assert_eq!(
            resolve(&context, Filter::starts_with("name", "a.b")),
            doc! { "name": { "$regex": "^a\\.b" } }
        );
        assert_eq!(
            resolve(&context, Filter::contains("tags", "x")),
            doc! { "tags": { "$eq": "x" } }
        );
    }

    #[test]
    fn negation_and_composition() {
        let context = context(EnumCodecStrategy::Name);
        let filter = Filter::eq("a", 1).or(Filter::is_null("b")).not();

        assert_eq!(
            resolve(&context, filter),
            doc! { "$nor": [ { "$or": [ { "a": { "$eq": 1 } }, { "b": { "$eq": Bson::Null } } ] } ] }
        );
    }
}
