//! Datastore operations ("commodities").
//!
//! Every operation follows the same shape: resolve the data target and expressions in a
//! document context, trace the resolved BSON when tracing is enabled, dispatch to the
//! backend (inside the bound session, if any) and decode the results.

mod bean;
mod bulk;
mod read;
mod write;

use std::fmt::Display;

use bson::{Bson, Document};
use tracing::debug;

use crate::{
    backend::{DatastoreBackend, ReadOptions, WriteOptions},
    config::OperationOptions,
    context::ResolutionContext,
    datastore::Datastore,
    error::{DatastoreError, DatastoreResult},
    expression::{
        BsonExpression, BsonFieldValue, CollectionName, DataTarget, DocumentValue, Expression, FieldValue,
        PropertyBoxValue,
    },
    id::ID_FIELD_NAME,
    path::Path,
    property::{PropertyBox, PropertySet},
    value::Value,
};

/// Target of log events emitted when operation tracing is enabled.
pub const TRACE_TARGET: &str = "docmap::trace";

/// The kind of write an [`OperationResult`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Insert,
    Update,
    Delete,
}

/// Outcome of a write operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub operation_type: OperationType,
    pub affected_count: u64,
    /// Identifier values assigned by the store, keyed by identifier property path.
    pub inserted_keys: Vec<(Path, Value)>,
}

impl OperationResult {
    pub(crate) fn new(operation_type: OperationType, affected_count: u64) -> Self {
        OperationResult {
            operation_type,
            affected_count,
            inserted_keys: Vec::new(),
        }
    }

    /// The first generated key, if any.
    pub fn first_inserted_key(&self) -> Option<&Value> {
        self.inserted_keys.first().map(|(_, value)| value)
    }

    /// The generated key of the given identifier property.
    pub fn inserted_key(&self, path: &Path) -> Option<&Value> {
        self.inserted_keys
            .iter()
            .find(|(key, _)| key == path)
            .map(|(_, value)| value)
    }
}

/// Operations against a datastore, optionally bound to a backend session.
pub struct Operations<'a, B: DatastoreBackend> {
    datastore: &'a Datastore<B>,
    session: Option<&'a mut B::Session>,
    options: OperationOptions,
}

impl<'a, B: DatastoreBackend> Operations<'a, B> {
    pub(crate) fn new(datastore: &'a Datastore<B>, session: Option<&'a mut B::Session>) -> Self {
        Operations {
            datastore,
            session,
            options: OperationOptions::default(),
        }
    }

    /// Overrides the datastore read and write defaults for these operations.
    pub fn with_options(mut self, options: OperationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &OperationOptions {
        &self.options
    }

    /// Whether these operations run inside a session.
    pub fn is_bound(&self) -> bool {
        self.session.is_some()
    }

    fn session(&mut self) -> Option<&mut B::Session> {
        self.session.as_deref_mut()
    }

    fn backend(&self) -> &'a B {
        self.datastore.backend()
    }

    fn read_options(&self) -> ReadOptions {
        let config = self.datastore.config();
        ReadOptions {
            read_preference: self.options.effective_read_preference(config),
            read_concern: self.options.effective_read_concern(config),
        }
    }

    fn write_options(&self) -> WriteOptions {
        WriteOptions {
            write_concern: self.options.effective_write_concern(self.datastore.config()),
        }
    }

    fn document_context(&self, set: &PropertySet) -> DatastoreResult<ResolutionContext> {
        self.datastore.document_context(set)
    }

    fn collection(&self, target: &DataTarget) -> DatastoreResult<String> {
        self.datastore
            .resolve_or_fail::<CollectionName, _>(target)
            .map(|name| name.0)
    }

    fn trace(
        &self,
        operation: &str,
        collection: &str,
        filter: Option<&Document>,
        sort: Option<&Document>,
        projection: Option<&Document>,
    ) {
        if self.datastore.is_trace_enabled() {
            debug!(
                target: TRACE_TARGET,
                operation,
                collection,
                filter = %self::display(filter),
                sort = %self::display(sort),
                projection = %self::display(projection),
                "resolved operation"
            );
        }
    }
}

fn display(document: Option<&Document>) -> String {
    document.map_or_else(|| "-".to_string(), |d| d.to_string())
}

fn resolve_document<E: Expression>(context: &ResolutionContext, expression: &E) -> DatastoreResult<Document> {
    context
        .resolve_or_fail::<BsonExpression, _>(expression)?
        .into_document()
}

fn resolve_optional<E: Expression>(
    context: &ResolutionContext,
    expression: Option<&E>,
) -> DatastoreResult<Option<Document>> {
    expression.map(|e| resolve_document(context, e)).transpose()
}

/// The encoded `_id` filter of a value, failing when it carries no identifier.
fn identifier_filter(context: &ResolutionContext, value: &PropertyBox) -> DatastoreResult<Option<Document>> {
    let Some(property) = context.document_context().and_then(|d| d.id_property()).cloned() else {
        return Err(DatastoreError::InvalidDocumentIdentifier(
            "The property set declares no document identifier".to_string(),
        ));
    };

    match value.value(&property) {
        Some(id) => {
            let encoded = context
                .resolve_or_fail::<BsonExpression, _>(&FieldValue::typed(id.clone(), property))?
                .into_value();
            Ok(Some(bson::doc! { ID_FIELD_NAME: encoded }))
        }
        None => Ok(None),
    }
}

/// Decodes store-assigned `_id` values back into the identifier property type.
fn inserted_keys(context: &ResolutionContext, ids: &[Bson]) -> DatastoreResult<Vec<(Path, Value)>> {
    let Some(property) = context.document_context().and_then(|d| d.id_property()).cloned() else {
        return Ok(Vec::new());
    };

    ids.iter()
        .map(|id| {
            context
                .resolve_or_fail::<FieldValue, _>(&BsonFieldValue::new(id.clone(), property.clone()))
                .map(|field| (property.path().clone(), field.value))
        })
        .collect()
}

pub(crate) fn decode_all(
    context: &ResolutionContext,
    documents: Vec<Document>,
) -> DatastoreResult<Vec<PropertyBox>> {
    documents
        .into_iter()
        .map(|document| decode_one(context, document))
        .collect()
}

pub(crate) fn decode_one(context: &ResolutionContext, document: Document) -> DatastoreResult<PropertyBox> {
    context
        .resolve_or_fail::<PropertyBoxValue, _>(&DocumentValue(document))
        .map(|value| value.0)
}

fn missing_identifier(operation: impl Display) -> DatastoreError {
    DatastoreError::InvalidDocumentIdentifier(format!("{operation} requires a document identifier value"))
}
