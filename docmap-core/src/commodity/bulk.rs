use crate::{
    backend::{DatastoreBackend, DeleteRequest, UpdateRequest},
    error::{DatastoreError, DatastoreResult},
    expression::DataTarget,
    id::ID_FIELD_NAME,
    property::{PropertyBox, PropertySet},
    query::QueryFilter,
    update::Update,
};

use super::{OperationResult, OperationType, Operations, inserted_keys, resolve_document, resolve_optional};

impl<B: DatastoreBackend> Operations<'_, B> {
    /// Inserts several values sharing one property set in a single driver call.
    pub async fn bulk_insert(&mut self, target: &DataTarget, values: &[PropertyBox]) -> DatastoreResult<OperationResult> {
        let Some(first) = values.first() else {
            return Ok(OperationResult::new(OperationType::Insert, 0));
        };
        if values.iter().any(|value| value.property_set() != first.property_set()) {
            return Err(DatastoreError::InvalidExpression(
                "Bulk insert values must share one property set".to_string(),
            ));
        }

        let collection = self.collection(target)?;
        let context = self.document_context(first.property_set())?;
        let documents = values
            .iter()
            .map(|value| context.encode_property_box(value))
            .collect::<DatastoreResult<Vec<_>>>()?;
        let generated: Vec<bool> = documents
            .iter()
            .map(|document| !document.contains_key(ID_FIELD_NAME))
            .collect();

        self.trace("bulk_insert", &collection, None, None, None);
        let write = self.write_options();
        let ids = self
            .backend()
            .insert(&collection, documents, write, self.session())
            .await?;

        let mut result = OperationResult::new(OperationType::Insert, ids.len() as u64);
        let assigned: Vec<_> = ids
            .into_iter()
            .zip(generated)
            .filter_map(|(id, generated)| generated.then_some(id))
            .collect();
        result.inserted_keys = inserted_keys(&context, &assigned)?;

        Ok(result)
    }

    /// Applies an update to every document matching the filter, or to all documents
    /// when no filter is given.
    pub async fn bulk_update(
        &mut self,
        target: &DataTarget,
        set: &PropertySet,
        filter: Option<&QueryFilter>,
        update: &Update,
    ) -> DatastoreResult<OperationResult> {
        let collection = self.collection(target)?;
        let context = self.document_context(set)?;
        let filter = resolve_optional(&context, filter)?.unwrap_or_default();
        let update = resolve_document(&context, update)?;

        self.trace("bulk_update", &collection, Some(&filter), None, None);
        let request = UpdateRequest {
            collection,
            filter,
            update,
            multi: true,
            upsert: false,
            write: self.write_options(),
        };
        let outcome = self.backend().update(request, self.session()).await?;

        Ok(OperationResult::new(OperationType::Update, outcome.modified_count))
    }

    /// Deletes every document matching the filter, or all documents when no filter is
    /// given.
    pub async fn bulk_delete(
        &mut self,
        target: &DataTarget,
        set: &PropertySet,
        filter: Option<&QueryFilter>,
    ) -> DatastoreResult<OperationResult> {
        let collection = self.collection(target)?;
        let context = self.document_context(set)?;
        let filter = resolve_optional(&context, filter)?.unwrap_or_default();

        self.trace("bulk_delete", &collection, Some(&filter), None, None);
        let request = DeleteRequest {
            collection,
            filter,
            multi: true,
            write: self.write_options(),
        };
        let deleted = self.backend().delete(request, self.session()).await?;

        Ok(OperationResult::new(OperationType::Delete, deleted))
    }
}
