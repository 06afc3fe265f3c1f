//! The built-in resolvers.
//!
//! Every built-in resolver runs at [`BUILTIN_PRIORITY`](crate::resolver::BUILTIN_PRIORITY)
//! or just below it, so custom resolvers registered with the default priority take
//! precedence. Scalar values have no codec registry: to change how a type is stored,
//! register a `FieldValue -> BsonExpression` resolver (and its `BsonFieldValue ->
//! FieldValue` counterpart) that returns `None` for everything it does not handle.

mod aggregation;
mod collection;
mod document;
mod filter;
mod path;
mod shape;
mod update;
mod value;

pub use aggregation::{AggregationResolver, AggregationStageResolver};
pub use collection::CollectionNameResolver;
pub use document::{DocumentDecoder, PropertyBoxEncoder};
pub use filter::FilterResolver;
pub use path::{FieldNamePathResolver, PathFieldNameResolver};
pub use shape::{ProjectionResolver, SortResolver};
pub use update::UpdateResolver;
pub use value::{DocumentIdDecoder, DocumentIdEncoder, FieldValueDecoder, FieldValueEncoder};

use crate::resolver::Resolver;

/// The built-in resolvers, in registration order.
pub fn default_resolvers() -> Vec<Resolver> {
    vec![
        Resolver::new(PathFieldNameResolver),
        Resolver::new(FieldNamePathResolver),
        Resolver::new(DocumentIdEncoder),
        Resolver::new(FieldValueEncoder),
        Resolver::new(DocumentIdDecoder),
        Resolver::new(FieldValueDecoder),
        Resolver::new(PropertyBoxEncoder),
        Resolver::new(DocumentDecoder),
        Resolver::new(FilterResolver),
        Resolver::new(SortResolver),
        Resolver::new(ProjectionResolver),
        Resolver::new(UpdateResolver),
        Resolver::new(AggregationStageResolver),
        Resolver::new(AggregationResolver),
        Resolver::new(CollectionNameResolver),
    ]
}
