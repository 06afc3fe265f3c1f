//! Update documents.

use bson::{Bson, Document};

use crate::{
    context::ResolutionContext,
    error::{DatastoreError, DatastoreResult},
    expression::{BsonExpression, FieldName, FieldValue},
    path::Path,
    property::Property,
    resolver::{BUILTIN_PRIORITY, ExpressionResolver},
    update::{Update, UpdateOperation},
    value::{PropertyType, Value},
};

/// Resolves an [`Update`] into an update document grouped by operator.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateResolver;

impl UpdateResolver {
    fn field_name(path: &Path, context: &ResolutionContext) -> DatastoreResult<String> {
        context.resolve_or_fail::<FieldName, _>(path).map(|name| name.0)
    }

    fn encode(
        path: &Path,
        value: &Value,
        element: bool,
        context: &ResolutionContext,
    ) -> DatastoreResult<Bson> {
        let property = context
            .document_context()
            .and_then(|document| document.property(path))
            .and_then(|property| match (element, property.property_type()) {
                (false, _) => Some(property.clone()),
                (true, PropertyType::Array(inner)) => {
                    Some(Property::new(property.path().clone(), (**inner).clone()))
                }
                (true, _) => None,
            });

        context
            .resolve_or_fail::<BsonExpression, _>(&FieldValue {
                value: value.clone(),
                property,
            })
            .map(BsonExpression::into_value)
    }
}

impl ExpressionResolver<Update, BsonExpression> for UpdateResolver {
    fn resolve(&self, update: &Update, context: &ResolutionContext) -> DatastoreResult<Option<BsonExpression>> {
        let mut groups: Vec<(&'static str, Document)> = Vec::new();

        for operation in &update.0 {
            let path = operation.path();
            let field = Self::field_name(path, context)?;
            let operand = match operation {
                UpdateOperation::Set(_, value) | UpdateOperation::Increment(_, value) => {
                    Self::encode(path, value, false, context)?
                }
                UpdateOperation::Push(_, value)
                | UpdateOperation::AddToSet(_, value)
                | UpdateOperation::Pull(_, value) => Self::encode(path, value, true, context)?,
                UpdateOperation::Unset(_) => Bson::String(String::new()),
                UpdateOperation::Rename(_, to) => Bson::String(Self::field_name(to, context)?),
                UpdateOperation::CurrentDate(_) => Bson::Boolean(true),
            };

            let operator = operation.operator();
            let index = match groups.iter().position(|(name, _)| *name == operator) {
                Some(index) => index,
                None => {
                    groups.push((operator, Document::new()));
                    groups.len() - 1
                }
            };
            if groups[index].1.insert(field.clone(), operand).is_some() {
                return Err(DatastoreError::InvalidExpression(format!(
                    "Field '{field}' is updated twice by {operator}"
                )));
            }
        }

        let document: Document = groups
            .into_iter()
            .map(|(operator, group)| (operator.to_string(), Bson::Document(group)))
            .collect();

        Ok(Some(BsonExpression::from(document)))
    }

    fn priority(&self) -> i32 {
        BUILTIN_PRIORITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{property::PropertySet, value::EnumCodecStrategy, value::EnumType};
    use bson::doc;

    #[test]
    fn operations_are_grouped_by_operator() {
        let set = PropertySet::new([
            Property::named("id", PropertyType::ObjectId).identifier(),
            Property::named(
                "levels",
                PropertyType::array_of(PropertyType::Enum(EnumType::new("Level", ["Low", "High"]))),
            ),
        ]);
        let context = ResolutionContext::builder()
            .enum_codec_strategy(EnumCodecStrategy::Ordinal)
            .build()
            .for_document(&set)
            .unwrap();

        let update = Update::new()
            .set("name", "x")
            .set("address.city", "Rome")
            .increment("count", 2)
            .push("levels", Value::Enum("High".to_string()))
            .unset("old")
            .rename("legacy", "current");

        let document = context
            .resolve_or_fail::<BsonExpression, _>(&update)
            .unwrap()
            .into_document()
            .unwrap();

        assert_eq!(
            document,
            doc! {
                "$set": { "name": "x", "address.city": "Rome" },
                "$inc": { "count": 2 },
                "$push": { "levels": 1 },
                "$unset": { "old": "" },
                "$rename": { "legacy": "current" },
            }
        );
    }

    #[test]
    fn duplicate_targets_fail() {
        let context = ResolutionContext::default();
        let update = Update::new().set("a", 1).set("a", 2);

        assert!(context.resolve::<BsonExpression, _>(&update).is_err());
    }
}
