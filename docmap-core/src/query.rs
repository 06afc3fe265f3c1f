//! Query construction: filters, sorts, projections and query shaping options.
//!
//! Queries are expressed against property [`Path`]s and typed [`Value`]s; they are turned
//! into MongoDB filter, sort and projection documents by the resolver chain, which is
//! where property types, enum strategies and identifier mapping are applied.
//!
//! # Query Building
//!
//! ```ignore
//! use docmap::query::{Query, Filter, SortDirection};
//!
//! let query = Query::builder()
//!     .filter(Filter::eq("name", "Alice").and(Filter::gt("age", 18)))
//!     .limit(10)
//!     .offset(0)
//!     .sort("created_at", SortDirection::Desc)
//!     .build();
//! ```

use std::time::Duration;

use bson::Document;

use crate::{
    error::{DatastoreError, DatastoreResult},
    expression::Expression,
    path::Path,
    property::PropertySet,
    value::Value,
};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// Sort specification for a single path.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub path: Path,
    pub direction: SortDirection,
}

impl Sort {
    /// Ascending sort on a (dotted) field name.
    pub fn asc(field: impl AsRef<str>) -> Self {
        Sort {
            path: parsed(field),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl AsRef<str>) -> Self {
        Sort {
            path: parsed(field),
            direction: SortDirection::Desc,
        }
    }
}

/// An ordered list of sorts, resolved into a sort document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuerySort(pub Vec<Sort>);

impl Expression for QuerySort {
    fn validate(&self) -> DatastoreResult<()> {
        for sort in &self.0 {
            sort.path.validate()?;
        }

        Ok(())
    }
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Value is one of the given array elements.
    In,
    /// Value is none of the given array elements.
    NotIn,
    /// String contains the value, or array contains the element.
    Contains,
    /// String does not contain the value, or array does not contain the element.
    NotContains,
    StartsWith,
    EndsWith,
}

/// A filter expression for querying documents.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryFilter {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<QueryFilter>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<QueryFilter>),
    /// Logical NOT of an expression.
    Not(Box<QueryFilter>),
    /// Checks whether a field exists.
    Exists(Path, bool),
    /// Checks whether a field is null (`true`) or not null (`false`).
    Null(Path, bool),
    /// Field comparison expression.
    Field { path: Path, op: FieldOp, value: Value },
}

impl QueryFilter {
    pub fn field(path: Path, op: FieldOp, value: Value) -> Self {
        QueryFilter::Field { path, op, value }
    }

    /// Combines this expression with another using logical AND.
    pub fn and(self, other: QueryFilter) -> Self {
        match self {
            QueryFilter::And(mut list) => {
                list.push(other);
                QueryFilter::And(list)
            }
            _ => QueryFilter::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    pub fn or(self, other: QueryFilter) -> Self {
        match self {
            QueryFilter::Or(mut list) => {
                list.push(other);
                QueryFilter::Or(list)
            }
            _ => QueryFilter::Or(vec![self, other]),
        }
    }

    /// Negates this expression.
    pub fn not(self) -> Self {
        QueryFilter::Not(Box::new(self))
    }
}

impl Expression for QueryFilter {
    fn validate(&self) -> DatastoreResult<()> {
        match self {
            QueryFilter::And(filters) | QueryFilter::Or(filters) => {
                if filters.is_empty() {
                    return Err(DatastoreError::InvalidExpression(
                        "Logical filter requires at least one operand".to_string(),
                    ));
                }
                filters.iter().try_for_each(Expression::validate)
            }
            QueryFilter::Not(filter) => filter.validate(),
            QueryFilter::Exists(path, _) | QueryFilter::Null(path, _) => path.validate(),
            QueryFilter::Field { path, op, value } => {
                path.validate()?;
                match (op, value) {
                    (FieldOp::In | FieldOp::NotIn, Value::Array(_)) => Ok(()),
                    (FieldOp::In | FieldOp::NotIn, _) => Err(DatastoreError::InvalidExpression(
                        format!("{op:?} on '{path}' requires an array value"),
                    )),
                    (FieldOp::StartsWith | FieldOp::EndsWith, Value::String(_)) => Ok(()),
                    (FieldOp::StartsWith | FieldOp::EndsWith, _) => {
                        Err(DatastoreError::InvalidExpression(format!(
                            "{op:?} on '{path}' requires a string value"
                        )))
                    }
                    (_, Value::Null) if *op != FieldOp::Eq && *op != FieldOp::Ne => {
                        Err(DatastoreError::InvalidExpression(format!(
                            "{op:?} on '{path}' requires a non-null value"
                        )))
                    }
                    _ => Ok(()),
                }
            }
        }
    }
}

/// Helper struct for constructing filter expressions.
///
/// Field names are parsed as dotted paths, so `Filter::eq("address.city", "Rome")` targets
/// the `city` field of the embedded `address` document.
pub struct Filter;

pub(crate) fn parsed(name: impl AsRef<str>) -> Path {
    Path::parse(name.as_ref()).unwrap_or_else(|_| Path::new(name.as_ref()))
}

impl Filter {
    /// Matches documents where the field equals the specified value.
    pub fn eq(field: impl AsRef<str>, value: impl Into<Value>) -> QueryFilter {
        QueryFilter::field(parsed(field), FieldOp::Eq, value.into())
    }

    /// Matches documents where the field does not equal the specified value.
    pub fn ne(field: impl AsRef<str>, value: impl Into<Value>) -> QueryFilter {
        QueryFilter::field(parsed(field), FieldOp::Ne, value.into())
    }

    pub fn gt(field: impl AsRef<str>, value: impl Into<Value>) -> QueryFilter {
        QueryFilter::field(parsed(field), FieldOp::Gt, value.into())
    }

    pub fn gte(field: impl AsRef<str>, value: impl Into<Value>) -> QueryFilter {
        QueryFilter::field(parsed(field), FieldOp::Gte, value.into())
    }

    pub fn lt(field: impl AsRef<str>, value: impl Into<Value>) -> QueryFilter {
        QueryFilter::field(parsed(field), FieldOp::Lt, value.into())
    }

    pub fn lte(field: impl AsRef<str>, value: impl Into<Value>) -> QueryFilter {
        QueryFilter::field(parsed(field), FieldOp::Lte, value.into())
    }

    /// Matches documents where the field equals any of the values.
    pub fn any_of<V: Into<Value>>(field: impl AsRef<str>, values: impl IntoIterator<Item = V>) -> QueryFilter {
        QueryFilter::field(
            parsed(field),
            FieldOp::In,
            Value::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Matches documents where the field equals none of the values.
    pub fn none_of<V: Into<Value>>(field: impl AsRef<str>, values: impl IntoIterator<Item = V>) -> QueryFilter {
        QueryFilter::field(
            parsed(field),
            FieldOp::NotIn,
            Value::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn contains(field: impl AsRef<str>, value: impl Into<Value>) -> QueryFilter {
        QueryFilter::field(parsed(field), FieldOp::Contains, value.into())
    }

    pub fn not_contains(field: impl AsRef<str>, value: impl Into<Value>) -> QueryFilter {
        QueryFilter::field(parsed(field), FieldOp::NotContains, value.into())
    }

    pub fn starts_with(field: impl AsRef<str>, value: impl Into<String>) -> QueryFilter {
        QueryFilter::field(parsed(field), FieldOp::StartsWith, Value::String(value.into()))
    }

    pub fn ends_with(field: impl AsRef<str>, value: impl Into<String>) -> QueryFilter {
        QueryFilter::field(parsed(field), FieldOp::EndsWith, Value::String(value.into()))
    }

    pub fn exists(field: impl AsRef<str>) -> QueryFilter {
        QueryFilter::Exists(parsed(field), true)
    }

    pub fn not_exists(field: impl AsRef<str>) -> QueryFilter {
        QueryFilter::Exists(parsed(field), false)
    }

    pub fn is_null(field: impl AsRef<str>) -> QueryFilter {
        QueryFilter::Null(parsed(field), true)
    }

    pub fn is_not_null(field: impl AsRef<str>) -> QueryFilter {
        QueryFilter::Null(parsed(field), false)
    }

    pub fn and(filters: impl IntoIterator<Item = QueryFilter>) -> QueryFilter {
        QueryFilter::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = QueryFilter>) -> QueryFilter {
        QueryFilter::Or(filters.into_iter().collect())
    }
}

/// The set of properties a query should return, resolved into a projection document.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection(pub PropertySet);

impl Expression for Projection {
    fn validate(&self) -> DatastoreResult<()> {
        self.0.validate()
    }
}

/// Index hint for find and aggregate operations.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexHint {
    Name(String),
    Keys(Document),
}

/// Cursor behaviour of a find operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorType {
    NonTailable,
    Tailable,
    TailableAwait,
}

/// Query shaping options forwarded to the driver untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub collation: Option<String>,
    pub hint: Option<IndexHint>,
    pub max_time: Option<Duration>,
    pub batch_size: Option<u32>,
    pub comment: Option<String>,
    pub min: Option<Document>,
    pub max: Option<Document>,
    pub return_key: Option<bool>,
    pub show_record_id: Option<bool>,
    pub cursor_type: Option<CursorType>,
}

/// A structured query for retrieving and filtering documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Optional filter expression to match documents.
    pub filter: Option<QueryFilter>,
    /// Maximum number of documents to return.
    pub limit: Option<i64>,
    /// Number of documents to skip.
    pub offset: Option<u64>,
    /// Sort specifications, applied in order.
    pub sorts: Vec<Sort>,
    /// Driver-level query shaping.
    pub options: QueryOptions,
}

impl Query {
    pub fn new() -> Self {
        Query::default()
    }

    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new() -> Self {
        QueryBuilder {
            query: Query::default(),
        }
    }

    /// Sets the filter; calling it again ANDs the new filter with the previous one.
    pub fn filter(mut self, filter: QueryFilter) -> Self {
        self.query.filter = Some(match self.query.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// Appends a sort on a (dotted) field name.
    pub fn sort(mut self, field: impl AsRef<str>, direction: SortDirection) -> Self {
        self.query.sorts.push(Sort {
            path: parsed(field),
            direction,
        });
        self
    }

    pub fn options(mut self, options: QueryOptions) -> Self {
        self.query.options = options;
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}

/// Walks a [`QueryFilter`] tree.
pub trait QueryVisitor {
    type Output;
    type Error: Into<DatastoreError>;

    fn visit_and(&mut self, filters: &[QueryFilter]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, filters: &[QueryFilter]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, filter: &QueryFilter) -> Result<Self::Output, Self::Error>;
    fn visit_exists(&mut self, path: &Path, should_exist: bool) -> Result<Self::Output, Self::Error>;
    fn visit_null(&mut self, path: &Path, is_null: bool) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        path: &Path,
        op: FieldOp,
        value: &Value,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_filter(&mut self, filter: &QueryFilter) -> Result<Self::Output, Self::Error> {
        match filter {
            QueryFilter::And(filters) => self.visit_and(filters),
            QueryFilter::Or(filters) => self.visit_or(filters),
            QueryFilter::Not(filter) => self.visit_not(filter),
            QueryFilter::Exists(path, should_exist) => self.visit_exists(path, *should_exist),
            QueryFilter::Null(path, is_null) => self.visit_null(path, *is_null),
            QueryFilter::Field { path, op, value } => self.visit_field(path, *op, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_ands_filters() {
        let query = Query::builder()
            .filter(Filter::eq("a", 1))
            .filter(Filter::eq("b", 2))
            .sort("c.d", SortDirection::Desc)
            .limit(5)
            .build();

        assert_eq!(
            query.filter,
            Some(QueryFilter::And(vec![Filter::eq("a", 1), Filter::eq("b", 2)]))
        );
        assert_eq!(query.sorts, vec![Sort::desc("c.d")]);
        assert_eq!(query.limit, Some(5));
    }

    #[test]
    fn validation() {
        assert!(Filter::and([]).validate().is_err());
        assert!(Filter::gt("a", Value::Null).validate().is_err());
        assert!(Filter::eq("a", Value::Null).validate().is_ok());
        assert!(QueryFilter::field(Path::new("a"), FieldOp::In, Value::from(1)).validate().is_err());
        assert!(Filter::any_of("a", [1, 2]).validate().is_ok());
    }
}
