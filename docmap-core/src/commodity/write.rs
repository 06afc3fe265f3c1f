use crate::{
    backend::{DatastoreBackend, DeleteRequest, ReplaceRequest},
    error::DatastoreResult,
    expression::DataTarget,
    id::ID_FIELD_NAME,
    property::PropertyBox,
};

use super::{OperationResult, OperationType, Operations, identifier_filter, inserted_keys, missing_identifier};

impl<B: DatastoreBackend> Operations<'_, B> {
    /// Inserts a value. When the identifier is not set the store generates one, reported
    /// through [`OperationResult::inserted_keys`].
    pub async fn insert(&mut self, target: &DataTarget, value: &PropertyBox) -> DatastoreResult<OperationResult> {
        let collection = self.collection(target)?;
        let context = self.document_context(value.property_set())?;
        let document = context.encode_property_box(value)?;
        let generated = !document.contains_key(ID_FIELD_NAME);

        self.trace("insert", &collection, None, None, None);
        let write = self.write_options();
        let ids = self
            .backend()
            .insert(&collection, vec![document], write, self.session())
            .await?;

        let mut result = OperationResult::new(OperationType::Insert, ids.len() as u64);
        if generated {
            result.inserted_keys = inserted_keys(&context, &ids)?;
        }

        Ok(result)
    }

    /// Replaces the stored document having the value's identifier.
    pub async fn update(&mut self, target: &DataTarget, value: &PropertyBox) -> DatastoreResult<OperationResult> {
        let collection = self.collection(target)?;
        let context = self.document_context(value.property_set())?;
        let filter = identifier_filter(&context, value)?.ok_or_else(|| missing_identifier("update"))?;
        let mut replacement = context.encode_property_box(value)?;
        replacement.remove(ID_FIELD_NAME);

        self.trace("update", &collection, Some(&filter), None, None);
        let request = ReplaceRequest {
            collection,
            filter,
            replacement,
            upsert: false,
            write: self.write_options(),
        };
        let outcome = self.backend().replace(request, self.session()).await?;

        Ok(OperationResult::new(OperationType::Update, outcome.matched_count))
    }

    /// Updates the value if its identifier is set and stored, inserts it otherwise.
    pub async fn save(&mut self, target: &DataTarget, value: &PropertyBox) -> DatastoreResult<OperationResult> {
        let context = self.document_context(value.property_set())?;
        let Some(filter) = identifier_filter(&context, value)? else {
            return self.insert(target, value).await;
        };
        let collection = self.collection(target)?;
        let mut replacement = context.encode_property_box(value)?;
        replacement.remove(ID_FIELD_NAME);

        self.trace("save", &collection, Some(&filter), None, None);
        let request = ReplaceRequest {
            collection,
            filter,
            replacement,
            upsert: true,
            write: self.write_options(),
        };
        let outcome = self.backend().replace(request, self.session()).await?;

        Ok(match outcome.upserted_id {
            Some(_) => OperationResult::new(OperationType::Insert, 1),
            None => OperationResult::new(OperationType::Update, outcome.matched_count),
        })
    }

    /// Deletes the stored document having the value's identifier.
    pub async fn delete(&mut self, target: &DataTarget, value: &PropertyBox) -> DatastoreResult<OperationResult> {
        let collection = self.collection(target)?;
        let context = self.document_context(value.property_set())?;
        let filter = identifier_filter(&context, value)?.ok_or_else(|| missing_identifier("delete"))?;

        self.trace("delete", &collection, Some(&filter), None, None);
        let request = DeleteRequest {
            collection,
            filter,
            multi: false,
            write: self.write_options(),
        };
        let deleted = self.backend().delete(request, self.session()).await?;

        Ok(OperationResult::new(OperationType::Delete, deleted))
    }
}
