//! Application of MongoDB update documents to stored documents.

use bson::{Bson, DateTime, Document, Timestamp};

use docmap_core::error::{DatastoreError, DatastoreResult};

use crate::evaluator::{bson_eq, matches_condition};

/// Applies an update document in place, returning whether the document changed.
pub(crate) fn apply_update(document: &mut Document, update: &Document) -> DatastoreResult<bool> {
    let before = document.clone();

    for (operator, fields) in update {
        let fields = fields.as_document().ok_or_else(|| {
            DatastoreError::Backend(format!("Update operator {operator} expects a document"))
        })?;

        for (field, operand) in fields {
            if field == "_id" && operator != "$currentDate" {
                return Err(DatastoreError::Backend(
                    "Performing an update on the path '_id' would modify the immutable field '_id'"
                        .to_string(),
                ));
            }

            match operator.as_str() {
                "$set" => set_path(document, field, operand.clone())?,
                "$unset" => {
                    remove_path(document, field);
                }
                "$inc" => increment(document, field, operand)?,
                "$push" => push(document, field, operand, false)?,
                "$addToSet" => push(document, field, operand, true)?,
                "$pull" => pull(document, field, operand)?,
                "$rename" => rename(document, field, operand)?,
                "$currentDate" => current_date(document, field, operand)?,
                other => {
                    return Err(DatastoreError::Backend(format!("Unsupported update operator '{other}'")));
                }
            }
        }
    }

    Ok(*document != before)
}

/// The document an upsert starts from: the equality conditions of the filter.
pub(crate) fn upsert_seed(filter: &Document) -> DatastoreResult<Document> {
    let mut seed = Document::new();

    for (field, condition) in filter {
        if field.starts_with('$') {
            continue;
        }

        match condition {
            Bson::Document(operators) if operators.keys().next().is_some_and(|key| key.starts_with('$')) => {
                if let Some(value) = operators.get("$eq") {
                    set_path(&mut seed, field, value.clone())?;
                }
            }
            literal => set_path(&mut seed, field, literal.clone())?,
        }
    }

    Ok(seed)
}

pub(crate) fn get_path<'d>(document: &'d Document, field: &str) -> Option<&'d Bson> {
    match field.split_once('.') {
        None => document.get(field),
        Some((head, rest)) => get_path(document.get_document(head).ok()?, rest),
    }
}

/// Sets a dotted field, creating intermediate documents as needed.
pub(crate) fn set_path(document: &mut Document, field: &str, value: Bson) -> DatastoreResult<()> {
    match field.split_once('.') {
        None => {
            document.insert(field, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }
            match document.get_mut(head) {
                Some(Bson::Document(nested)) => set_path(nested, rest, value),
                _ => Err(DatastoreError::Backend(format!(
                    "Cannot create field '{rest}' in element '{head}', which is not a document"
                ))),
            }
        }
    }
}

pub(crate) fn remove_path(document: &mut Document, field: &str) -> Option<Bson> {
    match field.split_once('.') {
        None => document.remove(field),
        Some((head, rest)) => match document.get_mut(head) {
            Some(Bson::Document(nested)) => remove_path(nested, rest),
            _ => None,
        },
    }
}

fn increment(document: &mut Document, field: &str, operand: &Bson) -> DatastoreResult<()> {
    let sum = match (get_path(document, field), operand) {
        (None, operand) => operand.clone(),
        (Some(Bson::Int32(a)), Bson::Int32(b)) => a
            .checked_add(*b)
            .map(Bson::Int32)
            .unwrap_or(Bson::Int64(i64::from(*a) + i64::from(*b))),
        (Some(Bson::Int32(a)), Bson::Int64(b)) => Bson::Int64(i64::from(*a) + b),
        (Some(Bson::Int64(a)), Bson::Int32(b)) => Bson::Int64(a + i64::from(*b)),
        (Some(Bson::Int64(a)), Bson::Int64(b)) => Bson::Int64(a + b),
        (Some(Bson::Double(a)), Bson::Double(b)) => Bson::Double(a + b),
        (Some(Bson::Double(a)), Bson::Int32(b)) => Bson::Double(a + f64::from(*b)),
        (Some(Bson::Double(a)), Bson::Int64(b)) => Bson::Double(a + *b as f64),
        (Some(Bson::Int32(a)), Bson::Double(b)) => Bson::Double(f64::from(*a) + b),
        (Some(Bson::Int64(a)), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        (Some(current), operand) => {
            return Err(DatastoreError::Backend(format!(
                "Cannot apply $inc to {current} with {operand}"
            )));
        }
    };

    set_path(document, field, sum)
}

/// Values an array operator adds: the `$each` list or the single operand.
fn each(operand: &Bson) -> Vec<Bson> {
    match operand {
        Bson::Document(modifiers) => match modifiers.get("$each") {
            Some(Bson::Array(items)) => items.clone(),
            _ => vec![operand.clone()],
        },
        other => vec![other.clone()],
    }
}

fn push(document: &mut Document, field: &str, operand: &Bson, unique: bool) -> DatastoreResult<()> {
    let mut items = match get_path(document, field) {
        None => Vec::new(),
        Some(Bson::Array(items)) => items.clone(),
        Some(other) => {
            return Err(DatastoreError::Backend(format!(
                "The field '{field}' must be an array but is {other}"
            )));
        }
    };

    for value in each(operand) {
        if !unique || !items.iter().any(|item| bson_eq(item, &value)) {
            items.push(value);
        }
    }

    set_path(document, field, Bson::Array(items))
}

fn pull(document: &mut Document, field: &str, operand: &Bson) -> DatastoreResult<()> {
    let Some(Bson::Array(items)) = get_path(document, field) else {
        return Ok(());
    };

    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        if !matches_condition(Some(item), operand)? {
            kept.push(item.clone());
        }
    }

    set_path(document, field, Bson::Array(kept))
}

fn rename(document: &mut Document, field: &str, operand: &Bson) -> DatastoreResult<()> {
    let Bson::String(target) = operand else {
        return Err(DatastoreError::Backend(format!("$rename target of '{field}' must be a string")));
    };

    match remove_path(document, field) {
        Some(value) => set_path(document, target, value),
        None => Ok(()),
    }
}

fn current_date(document: &mut Document, field: &str, operand: &Bson) -> DatastoreResult<()> {
    let timestamp = match operand {
        Bson::Document(spec) => spec.get_str("$type").is_ok_and(|kind| kind == "timestamp"),
        _ => false,
    };

    let now = DateTime::now();
    let value = if timestamp {
        Bson::Timestamp(Timestamp {
            time: u32::try_from(now.timestamp_millis() / 1000).unwrap_or(u32::MAX),
            increment: 1,
        })
    } else {
        Bson::DateTime(now)
    };

    set_path(document, field, value)
}
