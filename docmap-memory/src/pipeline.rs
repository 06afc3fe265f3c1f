//! Sorting, projection and aggregation pipelines over in-memory documents.

use std::cmp::Ordering;

use bson::{Bson, Document};

use docmap_core::error::{DatastoreError, DatastoreResult};

use crate::{
    evaluator::{Comparable, DocumentEvaluator, lookup},
    update::{get_path, remove_path, set_path},
};

/// Sorts documents by a sort document, keeping the original order between equal keys.
pub(crate) fn sort_documents(documents: &mut [Document], sort: &Document) -> DatastoreResult<()> {
    let keys = sort
        .iter()
        .map(|(field, direction)| match direction {
            Bson::Int32(1) | Bson::Int64(1) => Ok((field.as_str(), false)),
            Bson::Int32(-1) | Bson::Int64(-1) => Ok((field.as_str(), true)),
            other => Err(DatastoreError::Backend(format!(
                "Invalid sort direction {other} for '{field}'"
            ))),
        })
        .collect::<DatastoreResult<Vec<_>>>()?;

    documents.sort_by(|a, b| {
        for (field, descending) in &keys {
            let left = lookup(a, field).unwrap_or(Bson::Null);
            let right = lookup(b, field).unwrap_or(Bson::Null);
            let ordering = Comparable::from(&left).total_cmp(&Comparable::from(&right));

            let ordering = if *descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    });

    Ok(())
}

/// Applies an inclusion or exclusion projection.
pub(crate) fn project(document: &Document, projection: &Document) -> DatastoreResult<Document> {
    let included = |value: &Bson| match value {
        Bson::Boolean(flag) => Ok(*flag),
        Bson::Int32(flag) => Ok(*flag != 0),
        Bson::Int64(flag) => Ok(*flag != 0),
        other => Err(DatastoreError::Backend(format!("Unsupported projection value {other}"))),
    };

    let mut inclusions = Vec::new();
    let mut exclusions = Vec::new();
    let mut keep_id = true;
    for (field, value) in projection {
        match (field.as_str(), included(value)?) {
            ("_id", include) => keep_id = include,
            (field, true) => inclusions.push(field),
            (field, false) => exclusions.push(field),
        }
    }

    if !inclusions.is_empty() && !exclusions.is_empty() {
        return Err(DatastoreError::Backend(
            "A projection cannot mix inclusions and exclusions".to_string(),
        ));
    }

    let mut projected = if inclusions.is_empty() {
        let mut projected = document.clone();
        for field in exclusions {
            remove_path(&mut projected, field);
        }
        projected
    } else {
        let mut projected = Document::new();
        if let Some(id) = document.get("_id") {
            projected.insert("_id", id.clone());
        }
        for field in inclusions {
            if let Some(value) = get_path(document, field) {
                set_path(&mut projected, field, value.clone())?;
            }
        }
        projected
    };

    if !keep_id {
        projected.remove("_id");
    }

    Ok(projected)
}

/// Clamps skip and limit the way the server does; a negative limit counts like its
/// absolute value and zero means no limit.
pub(crate) fn window(documents: Vec<Document>, skip: Option<u64>, limit: Option<i64>) -> Vec<Document> {
    let skip = skip.map_or(0, |skip| usize::try_from(skip).unwrap_or(usize::MAX));
    let limit = match limit.map(i64::unsigned_abs) {
        None | Some(0) => usize::MAX,
        Some(limit) => usize::try_from(limit).unwrap_or(usize::MAX),
    };

    documents.into_iter().skip(skip).take(limit).collect()
}

/// Runs the pipeline stages `$match`, `$sort`, `$skip`, `$limit`, `$project` and `$count`.
pub(crate) fn run_pipeline(mut documents: Vec<Document>, pipeline: &[Document]) -> DatastoreResult<Vec<Document>> {
    for stage in pipeline {
        let Some((operator, spec)) = stage.iter().next().filter(|_| stage.len() == 1) else {
            return Err(DatastoreError::Backend(format!(
                "A pipeline stage must contain exactly one operator: {stage}"
            )));
        };

        documents = match (operator.as_str(), spec) {
            ("$match", Bson::Document(filter)) => DocumentEvaluator::filter_documents(&documents, Some(filter))?
                .into_iter()
                .cloned()
                .collect(),
            ("$sort", Bson::Document(sort)) => {
                sort_documents(&mut documents, sort)?;
                documents
            }
            ("$skip", count) => window(documents, Some(non_negative(operator, count)?), None),
            ("$limit", count) => {
                let limit = non_negative(operator, count)?;
                if limit == 0 {
                    return Err(DatastoreError::Backend("The limit must be positive".to_string()));
                }
                window(documents, None, Some(i64::try_from(limit).unwrap_or(i64::MAX)))
            }
            ("$project", Bson::Document(projection)) => documents
                .iter()
                .map(|document| project(document, projection))
                .collect::<DatastoreResult<_>>()?,
            ("$count", Bson::String(field)) => match documents.len() {
                0 => Vec::new(),
                count => {
                    let mut counted = Document::new();
                    counted.insert(field.clone(), i32::try_from(count).unwrap_or(i32::MAX));
                    vec![counted]
                }
            },
            (operator, _) => {
                return Err(DatastoreError::Backend(format!("Unsupported pipeline stage '{operator}'")));
            }
        };
    }

    Ok(documents)
}

fn non_negative(operator: &str, value: &Bson) -> DatastoreResult<u64> {
    let count = match value {
        Bson::Int32(count) => i64::from(*count),
        Bson::Int64(count) => *count,
        other => {
            return Err(DatastoreError::Backend(format!("{operator} expects an integer, found {other}")));
        }
    };

    u64::try_from(count).map_err(|_| DatastoreError::Backend(format!("{operator} must not be negative")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn people() -> Vec<Document> {
        vec![
            doc! { "_id": 1, "name": "c", "age": 30, "address": { "city": "Rome", "zip": "1" } },
            doc! { "_id": 2, "name": "a", "age": 20 },
            doc! { "_id": 3, "name": "b", "age": 30 },
        ]
    }

    fn ids(documents: &[Document]) -> Vec<i32> {
        documents
            .iter()
            .map(|document| document.get_i32("_id").unwrap())
            .collect()
    }

    #[test]
    fn sorts_on_several_keys() {
        let mut documents = people();
        sort_documents(&mut documents, &doc! { "age": -1, "name": 1 }).unwrap();
        assert_eq!(ids(&documents), vec![3, 1, 2]);
    }

    #[test]
    fn inclusion_projection_keeps_id_and_nested_fields() {
        let projected = project(&people()[0], &doc! { "name": 1, "address.city": 1 }).unwrap();
        assert_eq!(projected, doc! { "_id": 1, "name": "c", "address": { "city": "Rome" } });

        let without_id = project(&people()[0], &doc! { "_id": 0, "age": 1 }).unwrap();
        assert_eq!(without_id, doc! { "age": 30 });
    }

    #[test]
    fn runs_stages_in_order() {
        let pipeline = [
            doc! { "$match": { "age": { "$gte": 25 } } },
            doc! { "$sort": { "name": 1 } },
            doc! { "$skip": 1_i64 },
            doc! { "$limit": 1_i64 },
        ];
        assert_eq!(ids(&run_pipeline(people(), &pipeline).unwrap()), vec![1]);

        let counted = run_pipeline(people(), &[doc! { "$count": "total" }]).unwrap();
        assert_eq!(counted, vec![doc! { "total": 3 }]);
    }

    #[test]
    fn rejects_unknown_stages() {
        assert!(run_pipeline(people(), &[doc! { "$group": { "_id": "$age" } }]).is_err());
    }
}
