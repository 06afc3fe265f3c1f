//! Aggregation pipeline expressions.

use bson::Document;

use crate::{
    error::{DatastoreError, DatastoreResult},
    expression::Expression,
    query::{Projection, QueryFilter, QuerySort},
};

/// A single pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationStage {
    Match(QueryFilter),
    Sort(QuerySort),
    Skip(u64),
    Limit(i64),
    Project(Projection),
    /// Counts the incoming documents into a field with the given name.
    Count(String),
    /// A stage passed to the driver as-is.
    Raw(Document),
}

impl Expression for AggregationStage {
    fn validate(&self) -> DatastoreResult<()> {
        match self {
            AggregationStage::Match(filter) => filter.validate(),
            AggregationStage::Sort(sort) => sort.validate(),
            AggregationStage::Project(projection) => projection.validate(),
            AggregationStage::Limit(limit) if *limit <= 0 => Err(DatastoreError::InvalidExpression(
                format!("Pipeline limit must be positive, got {limit}"),
            )),
            AggregationStage::Count(field) if field.is_empty() || field.starts_with('$') => {
                Err(DatastoreError::InvalidExpression(format!(
                    "Invalid count field name '{field}'"
                )))
            }
            AggregationStage::Raw(stage) if stage.len() != 1 => Err(DatastoreError::InvalidExpression(
                "A raw pipeline stage must contain exactly one operator".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// An ordered aggregation pipeline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Aggregation(pub Vec<AggregationStage>);

impl Aggregation {
    pub fn new() -> Self {
        Aggregation::default()
    }

    pub fn stage(mut self, stage: AggregationStage) -> Self {
        self.0.push(stage);
        self
    }

    pub fn filter(self, filter: QueryFilter) -> Self {
        self.stage(AggregationStage::Match(filter))
    }

    pub fn sort(self, sort: QuerySort) -> Self {
        self.stage(AggregationStage::Sort(sort))
    }

    pub fn skip(self, skip: u64) -> Self {
        self.stage(AggregationStage::Skip(skip))
    }

    pub fn limit(self, limit: i64) -> Self {
        self.stage(AggregationStage::Limit(limit))
    }

    pub fn project(self, projection: Projection) -> Self {
        self.stage(AggregationStage::Project(projection))
    }

    pub fn count(self, field: impl Into<String>) -> Self {
        self.stage(AggregationStage::Count(field.into()))
    }
}

impl Expression for Aggregation {
    fn validate(&self) -> DatastoreResult<()> {
        self.0.iter().try_for_each(Expression::validate)
    }
}
