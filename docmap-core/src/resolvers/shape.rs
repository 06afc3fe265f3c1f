//! Sort and projection documents.

use bson::{Document, doc};

use crate::{
    context::ResolutionContext,
    error::DatastoreResult,
    expression::{BsonExpression, FieldName},
    path::PATH_SEPARATOR,
    query::{Projection, QuerySort, SortDirection},
    resolver::{BUILTIN_PRIORITY, ExpressionResolver},
};

/// Resolves a [`QuerySort`] into a sort document, keeping the sort order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SortResolver;

impl ExpressionResolver<QuerySort, BsonExpression> for SortResolver {
    fn resolve(&self, sort: &QuerySort, context: &ResolutionContext) -> DatastoreResult<Option<BsonExpression>> {
        let mut document = Document::new();
        for sort in &sort.0 {
            let name: FieldName = context.resolve_or_fail(&sort.path)?;
            document.insert(
                name.0,
                match sort.direction {
                    SortDirection::Asc => 1,
                    SortDirection::Desc => -1,
                },
            );
        }

        Ok(Some(BsonExpression::from(document)))
    }

    fn priority(&self) -> i32 {
        BUILTIN_PRIORITY
    }
}

/// Resolves a [`Projection`] into an inclusion projection document.
///
/// Paths nested below an already projected path are skipped, as MongoDB rejects
/// overlapping projections.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectionResolver;

impl ExpressionResolver<Projection, BsonExpression> for ProjectionResolver {
    fn resolve(
        &self,
        projection: &Projection,
        context: &ResolutionContext,
    ) -> DatastoreResult<Option<BsonExpression>> {
        let mut names: Vec<String> = Vec::new();
        for property in projection.0.iter() {
            let name: FieldName = context.resolve_or_fail(property.path())?;
            names.push(name.0);
        }

        let covered = |name: &str, other: &str| {
            name != other
                && name.starts_with(other)
                && name[other.len()..].starts_with(PATH_SEPARATOR)
        };

        let mut document = Document::new();
        for name in &names {
            if !names.iter().any(|other| covered(name, other)) {
                document.insert(name.clone(), 1);
            }
        }

        Ok(Some(BsonExpression::from(document)))
    }

    fn priority(&self) -> i32 {
        BUILTIN_PRIORITY
    }
}
