//! Filter evaluation over BSON documents.
//!
//! The datastore resolves every filter into a MongoDB filter document before it reaches a
//! backend, so this module interprets that query language directly: the logical
//! operators `$and`, `$or` and `$nor`, and the field operators `$eq`, `$ne`, `$gt`,
//! `$gte`, `$lt`, `$lte`, `$in`, `$nin`, `$all`, `$exists`, `$regex` and `$not`. Field
//! names may be dotted; a condition on an array field matches if the whole array or any
//! of its elements satisfies it.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, DateTime, Document, oid::ObjectId};
use regex::{Regex, RegexBuilder};

use docmap_core::error::{DatastoreError, DatastoreResult};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to `f64`, so `1_i32`, `1_i64` and `1.0` compare equal
/// as they do on the server.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Binary(&'a [u8]),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(f64::from(*value)),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Binary(value) => Comparable::Binary(&value.bytes),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            _ => Comparable::Null,
        }
    }
}

impl Comparable<'_> {
    /// Rank of the value's type in the server's cross-type sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::Binary(_) => 5,
            Comparable::ObjectId(_) => 6,
            Comparable::Bool(_) => 7,
            Comparable::DateTime(_) => 8,
        }
    }

    /// A total order usable for sorting: values of different types are ordered by type.
    pub(crate) fn total_cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other)
            .unwrap_or_else(|| self.rank().cmp(&other.rank()))
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Binary(a), Comparable::Binary(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            (Comparable::Binary(a), Comparable::Binary(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Whether two BSON values are equal under server comparison rules.
pub(crate) fn bson_eq(left: &Bson, right: &Bson) -> bool {
    Comparable::from(left) == Comparable::from(right)
}

/// Reads a dotted field. Traversing an array of documents collects the nested values
/// into an array.
pub(crate) fn lookup(document: &Document, field: &str) -> Option<Bson> {
    let (head, rest) = match field.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (field, None),
    };
    let value = document.get(head)?;

    match rest {
        None => Some(value.clone()),
        Some(rest) => lookup_value(value, rest),
    }
}

fn lookup_value(value: &Bson, field: &str) -> Option<Bson> {
    match value {
        Bson::Document(document) => lookup(document, field),
        Bson::Array(items) => {
            let values: Vec<Bson> = items.iter().filter_map(|item| lookup_value(item, field)).collect();
            (!values.is_empty()).then_some(Bson::Array(values))
        }
        _ => None,
    }
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Evaluates a filter document; an empty filter matches everything.
    pub fn matches(&self, filter: &Document) -> DatastoreResult<bool> {
        for (key, condition) in filter {
            let matched = match key.as_str() {
                "$and" => self.all(condition)?,
                "$or" => self.any(condition)?,
                "$nor" => !self.any(condition)?,
                operator if operator.starts_with('$') => {
                    return Err(unsupported("top-level operator", operator));
                }
                field => matches_condition(lookup(self.document, field).as_ref(), condition)?,
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Document>,
        filter: Option<&Document>,
    ) -> DatastoreResult<Vec<&'a Document>> {
        let mut matched = Vec::new();
        for document in documents {
            let keep = match filter {
                Some(filter) => DocumentEvaluator::new(document).matches(filter)?,
                None => true,
            };
            if keep {
                matched.push(document);
            }
        }

        Ok(matched)
    }

    fn clauses(condition: &Bson) -> DatastoreResult<&Vec<Bson>> {
        match condition {
            Bson::Array(clauses) if !clauses.is_empty() => Ok(clauses),
            other => Err(DatastoreError::Backend(format!(
                "Logical operators expect a non-empty array of filters, found {other}"
            ))),
        }
    }

    fn clause(clause: &Bson) -> DatastoreResult<&Document> {
        clause
            .as_document()
            .ok_or_else(|| DatastoreError::Backend(format!("Expected a filter document, found {clause}")))
    }

    fn all(&self, condition: &Bson) -> DatastoreResult<bool> {
        for clause in Self::clauses(condition)? {
            if !self.matches(Self::clause(clause)?)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn any(&self, condition: &Bson) -> DatastoreResult<bool> {
        for clause in Self::clauses(condition)? {
            if self.matches(Self::clause(clause)?)? {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

/// Matches a field value against a condition: an operator document or a literal.
pub(crate) fn matches_condition(value: Option<&Bson>, condition: &Bson) -> DatastoreResult<bool> {
    match condition {
        Bson::Document(operators) if operators.keys().next().is_some_and(|key| key.starts_with('$')) => {
            for (operator, operand) in operators {
                if !matches_operator(value, operator, operand, operators)? {
                    return Ok(false);
                }
            }

            Ok(true)
        }
        literal => Ok(equals(value, literal)),
    }
}

fn matches_operator(
    value: Option<&Bson>,
    operator: &str,
    operand: &Bson,
    operators: &Document,
) -> DatastoreResult<bool> {
    Ok(match operator {
        "$eq" => equals(value, operand),
        "$ne" => !equals(value, operand),
        "$gt" => compares(value, operand, |o| o == Ordering::Greater),
        "$gte" => compares(value, operand, |o| o != Ordering::Less),
        "$lt" => compares(value, operand, |o| o == Ordering::Less),
        "$lte" => compares(value, operand, |o| o != Ordering::Greater),
        "$in" => array_operand(operator, operand)?
            .iter()
            .any(|candidate| equals(value, candidate)),
        "$nin" => !array_operand(operator, operand)?
            .iter()
            .any(|candidate| equals(value, candidate)),
        "$all" => match value {
            Some(Bson::Array(items)) => array_operand(operator, operand)?
                .iter()
                .all(|candidate| items.iter().any(|item| bson_eq(item, candidate))),
            _ => false,
        },
        "$exists" => match operand {
            Bson::Boolean(should_exist) => value.is_some() == *should_exist,
            other => return Err(unsupported("$exists operand", &other.to_string())),
        },
        "$regex" => {
            let regex = compile(operand, operators.get_str("$options").ok())?;
            any_element(value, |item| matches!(item, Bson::String(text) if regex.is_match(text)))
        }
        "$options" => true,
        "$not" => !matches_condition(value, operand)?,
        other => return Err(unsupported("operator", other)),
    })
}

fn array_operand<'b>(operator: &str, operand: &'b Bson) -> DatastoreResult<&'b Vec<Bson>> {
    match operand {
        Bson::Array(items) => Ok(items),
        other => Err(DatastoreError::Backend(format!("{operator} expects an array, found {other}"))),
    }
}

fn compile(pattern: &Bson, options: Option<&str>) -> DatastoreResult<Regex> {
    let Bson::String(pattern) = pattern else {
        return Err(unsupported("$regex operand", &pattern.to_string()));
    };

    RegexBuilder::new(pattern)
        .case_insensitive(options.is_some_and(|options| options.contains('i')))
        .multi_line(options.is_some_and(|options| options.contains('m')))
        .build()
        .map_err(|err| DatastoreError::Backend(format!("Invalid regular expression '{pattern}': {err}")))
}

/// Equality, where a missing field equals `null` and an array matches any of its elements.
fn equals(value: Option<&Bson>, operand: &Bson) -> bool {
    match value {
        None => matches!(operand, Bson::Null),
        Some(value) => bson_eq(value, operand) || any_element(Some(value), |item| bson_eq(item, operand)),
    }
}

fn compares(value: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let operand = Comparable::from(operand);
    any_element(value, |item| {
        Comparable::from(item)
            .partial_cmp(&operand)
            .is_some_and(&accept)
    })
}

/// Tests the value itself or, for arrays, each element.
fn any_element(value: Option<&Bson>, test: impl Fn(&Bson) -> bool) -> bool {
    match value {
        None => false,
        Some(Bson::Array(items)) => items.iter().any(&test),
        Some(value) => test(value),
    }
}

fn unsupported(what: &str, name: &str) -> DatastoreError {
    DatastoreError::Backend(format!("Unsupported {what} '{name}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use rstest::rstest;

    fn person() -> Document {
        doc! {
            "name": "Alice",
            "age": 30,
            "tags": ["a", "b"],
            "address": { "city": "Rome", "zip": Bson::Null },
            "scores": [{ "v": 1 }, { "v": 5 }],
        }
    }

    #[rstest]
    #[case(doc! {}, true)]
    #[case(doc! { "name": "Alice" }, true)]
    #[case(doc! { "age": { "$gte": 30, "$lt": 31 } }, true)]
    #[case(doc! { "age": { "$gt": 30_i64 } }, false)]
    #[case(doc! { "age": { "$eq": 30.0 } }, true)]
    #[case(doc! { "tags": "b" }, true)]
    #[case(doc! { "tags": { "$all": ["b", "a"] } }, true)]
    #[case(doc! { "tags": { "$in": ["x", "a"] } }, true)]
    #[case(doc! { "tags": { "$nin": ["a"] } }, false)]
    #[case(doc! { "address.city": "Rome" }, true)]
    #[case(doc! { "address.zip": { "$eq": Bson::Null } }, true)]
    #[case(doc! { "missing": { "$eq": Bson::Null } }, true)]
    #[case(doc! { "missing": { "$ne": Bson::Null } }, false)]
    #[case(doc! { "missing": { "$exists": false } }, true)]
    #[case(doc! { "scores.v": { "$gt": 4 } }, true)]
    #[case(doc! { "name": { "$regex": "^Al" } }, true)]
    #[case(doc! { "name": { "$regex": "^al" } }, false)]
    #[case(doc! { "name": { "$regex": "^al", "$options": "i" } }, true)]
    #[case(doc! { "name": { "$not": { "$regex": "ice$" } } }, false)]
    #[case(doc! { "$or": [{ "age": 1 }, { "name": "Alice" }] }, true)]
    #[case(doc! { "$and": [{ "age": 30 }, { "name": "Bob" }] }, false)]
    #[case(doc! { "$nor": [{ "age": 30 }] }, false)]
    fn evaluates_filters(#[case] filter: Document, #[case] expected: bool) {
        let document = person();
        assert_eq!(DocumentEvaluator::new(&document).matches(&filter).unwrap(), expected);
    }

    #[test]
    fn unknown_operators_are_errors() {
        let document = person();
        assert!(
            DocumentEvaluator::new(&document)
                .matches(&doc! { "age": { "$near": 1 } })
                .is_err()
        );
        assert!(
            DocumentEvaluator::new(&document)
                .matches(&doc! { "$where": "1" })
                .is_err()
        );
    }

    #[test]
    fn cross_type_ordering_follows_type_rank() {
        let null = Bson::Null;
        let number = Bson::Int32(1);
        let text = Bson::String("a".to_string());

        assert_eq!(Comparable::from(&null).total_cmp(&Comparable::from(&number)), Ordering::Less);
        assert_eq!(Comparable::from(&text).total_cmp(&Comparable::from(&number)), Ordering::Greater);
    }
}
