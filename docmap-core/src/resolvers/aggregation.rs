//! Aggregation pipeline stages.

use bson::{Bson, doc};

use crate::{
    aggregation::{Aggregation, AggregationStage},
    context::ResolutionContext,
    error::{DatastoreError, DatastoreResult},
    expression::BsonExpression,
    resolver::{BUILTIN_PRIORITY, ExpressionResolver},
};

/// Resolves a single [`AggregationStage`] into a stage document.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregationStageResolver;

impl ExpressionResolver<AggregationStage, BsonExpression> for AggregationStageResolver {
    fn resolve(
        &self,
        stage: &AggregationStage,
        context: &ResolutionContext,
    ) -> DatastoreResult<Option<BsonExpression>> {
        let nested = |expression: BsonExpression| expression.into_value();

        let stage = match stage {
            AggregationStage::Match(filter) => {
                doc! { "$match": nested(context.resolve_or_fail(filter)?) }
            }
            AggregationStage::Sort(sort) => doc! { "$sort": nested(context.resolve_or_fail(sort)?) },
            AggregationStage::Project(projection) => {
                doc! { "$project": nested(context.resolve_or_fail(projection)?) }
            }
            AggregationStage::Skip(skip) => doc! {
                "$skip": i64::try_from(*skip)
                    .map_err(|e| DatastoreError::InvalidExpression(e.to_string()))?,
            },
            AggregationStage::Limit(limit) => doc! { "$limit": *limit },
            AggregationStage::Count(field) => doc! { "$count": field.as_str() },
            AggregationStage::Raw(stage) => stage.clone(),
        };

        Ok(Some(BsonExpression::from(stage)))
    }

    fn priority(&self) -> i32 {
        BUILTIN_PRIORITY
    }
}

/// Resolves an [`Aggregation`] into a BSON array of stage documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregationResolver;

impl ExpressionResolver<Aggregation, BsonExpression> for AggregationResolver {
    fn resolve(
        &self,
        aggregation: &Aggregation,
        context: &ResolutionContext,
    ) -> DatastoreResult<Option<BsonExpression>> {
        let stages = aggregation
            .0
            .iter()
            .map(|stage| {
                context
                    .resolve_or_fail::<BsonExpression, _>(stage)
                    .map(BsonExpression::into_value)
            })
            .collect::<DatastoreResult<Vec<Bson>>>()?;

        Ok(Some(BsonExpression(Bson::Array(stages))))
    }

    fn priority(&self) -> i32 {
        BUILTIN_PRIORITY
    }
}
