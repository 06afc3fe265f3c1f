//! In-memory storage implementation of the datastore backend.
//!
//! Collections are kept as ordered lists of BSON documents behind an async-aware
//! read-write lock. Filters, updates and pipelines are interpreted directly from the
//! resolved MongoDB documents, so the same operations the datastore sends to a server
//! can be exercised without one.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;
use tracing::trace;

use docmap_core::{
    backend::{
        AggregateRequest, BackendSession, CountRequest, DatastoreBackend, DatastoreBackendBuilder,
        DeleteRequest, DistinctRequest, FindRequest, ReplaceRequest, TransactionOptions, UpdateOutcome,
        UpdateRequest, WriteOptions,
    },
    error::{DatastoreError, DatastoreResult},
};

use crate::{
    evaluator::{DocumentEvaluator, bson_eq, lookup},
    pipeline::{project, run_pipeline, sort_documents, window},
    update::{apply_update, upsert_seed},
};

type StoreMap = HashMap<String, Vec<Document>>;

/// Thread-safe in-memory document storage backend.
///
/// `MemoryBackend` is cloneable; clones share the same underlying collections, so a
/// backend can be handed to several datastores or tasks at once.
///
/// Queries scan every document of a collection. There are no indexes, and the only
/// unique constraint enforced is the one on `_id`.
///
/// # Example
///
/// ```ignore
/// use docmap::memory::MemoryBackend;
/// use docmap::Datastore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let datastore = Datastore::builder(MemoryBackend::new()).build()?;
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct MemoryBackend {
    /// collection name -> documents in insertion order
    store: Arc<RwLock<StoreMap>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> MemoryBackendBuilder {
        MemoryBackendBuilder::default()
    }

    /// Names of the collections holding at least one document.
    pub async fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .store
            .read()
            .await
            .iter()
            .filter(|(_, documents)| !documents.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Runs a read against the transaction's working copy, or the shared store outside
    /// a transaction.
    async fn read<T>(
        &self,
        session: Option<&mut MemorySession>,
        apply: impl FnOnce(&StoreMap) -> DatastoreResult<T>,
    ) -> DatastoreResult<T> {
        match session.and_then(|session| session.working.as_ref()) {
            Some(working) => apply(working),
            None => apply(&*self.store.read().await),
        }
    }

    async fn write<T>(
        &self,
        session: Option<&mut MemorySession>,
        apply: impl FnOnce(&mut StoreMap) -> DatastoreResult<T>,
    ) -> DatastoreResult<T> {
        match session.and_then(|session| session.working.as_mut()) {
            Some(working) => apply(working),
            None => apply(&mut *self.store.write().await),
        }
    }
}

/// Returns the matching documents of a collection, or none when it does not exist.
fn matching(store: &StoreMap, collection: &str, filter: Option<&Document>) -> DatastoreResult<Vec<Document>> {
    match store.get(collection) {
        Some(documents) => Ok(DocumentEvaluator::filter_documents(documents, filter)?
            .into_iter()
            .cloned()
            .collect()),
        None => Ok(Vec::new()),
    }
}

/// Positions of the documents a filter selects, stopping after the first unless `multi`.
fn positions(documents: &[Document], filter: &Document, multi: bool) -> DatastoreResult<Vec<usize>> {
    let mut found = Vec::new();
    for (index, document) in documents.iter().enumerate() {
        if DocumentEvaluator::new(document).matches(filter)? {
            found.push(index);
            if !multi {
                break;
            }
        }
    }

    Ok(found)
}

/// Puts `_id` first, generating an `ObjectId` when the document has none.
fn with_identifier(document: Document, fallback: Option<&Bson>) -> Document {
    let id = document
        .get("_id")
        .or(fallback)
        .cloned()
        .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));

    let mut identified = Document::new();
    identified.insert("_id", id);
    identified.extend(document.into_iter().filter(|(key, _)| key != "_id"));
    identified
}

fn duplicate_key(collection: &str, id: &Bson) -> DatastoreError {
    DatastoreError::Backend(format!("Duplicate key error in collection '{collection}': _id {id}"))
}

#[async_trait]
impl DatastoreBackend for MemoryBackend {
    type Session = MemorySession;

    async fn start_session(&self) -> DatastoreResult<Self::Session> {
        Ok(MemorySession {
            store: Arc::clone(&self.store),
            working: None,
        })
    }

    async fn find(
        &self,
        request: FindRequest,
        session: Option<&mut Self::Session>,
    ) -> DatastoreResult<Vec<Document>> {
        let mut documents = self
            .read(session, |store| matching(store, &request.collection, request.filter.as_ref()))
            .await?;

        if let Some(sort) = &request.sort {
            sort_documents(&mut documents, sort)?;
        }

        let documents = window(documents, request.skip, request.limit);
        match &request.projection {
            Some(projection) => documents
                .iter()
                .map(|document| project(document, projection))
                .collect(),
            None => Ok(documents),
        }
    }

    async fn aggregate(
        &self,
        request: AggregateRequest,
        session: Option<&mut Self::Session>,
    ) -> DatastoreResult<Vec<Document>> {
        let documents = self
            .read(session, |store| matching(store, &request.collection, None))
            .await?;

        run_pipeline(documents, &request.pipeline)
    }

    async fn distinct(
        &self,
        request: DistinctRequest,
        session: Option<&mut Self::Session>,
    ) -> DatastoreResult<Vec<Bson>> {
        let documents = self
            .read(session, |store| matching(store, &request.collection, request.filter.as_ref()))
            .await?;

        let mut values: Vec<Bson> = Vec::new();
        for value in documents.iter().filter_map(|document| lookup(document, &request.field)) {
            let candidates = match value {
                Bson::Array(items) => items,
                single => vec![single],
            };
            for candidate in candidates {
                if !values.iter().any(|seen| bson_eq(seen, &candidate)) {
                    values.push(candidate);
                }
            }
        }

        Ok(values)
    }

    async fn count(
        &self,
        request: CountRequest,
        session: Option<&mut Self::Session>,
    ) -> DatastoreResult<u64> {
        let documents = self
            .read(session, |store| matching(store, &request.collection, request.filter.as_ref()))
            .await?;

        Ok(window(documents, request.skip, request.limit).len() as u64)
    }

    async fn insert(
        &self,
        collection: &str,
        documents: Vec<Document>,
        _write: WriteOptions,
        session: Option<&mut Self::Session>,
    ) -> DatastoreResult<Vec<Bson>> {
        let documents: Vec<_> = documents
            .into_iter()
            .map(|document| with_identifier(document, None))
            .collect();

        self.write(session, |store| {
            let stored = store.entry(collection.to_string()).or_default();

            let mut ids: Vec<Bson> = Vec::with_capacity(documents.len());
            for document in &documents {
                let id = document.get("_id").cloned().unwrap_or(Bson::Null);
                let taken = stored
                    .iter()
                    .filter_map(|existing| existing.get("_id"))
                    .chain(&ids)
                    .any(|existing| bson_eq(existing, &id));
                if taken {
                    return Err(duplicate_key(collection, &id));
                }
                ids.push(id);
            }

            stored.extend(documents);
            Ok(ids)
        })
        .await
    }

    async fn update(
        &self,
        request: UpdateRequest,
        session: Option<&mut Self::Session>,
    ) -> DatastoreResult<UpdateOutcome> {
        self.write(session, |store| {
            let stored = store.entry(request.collection.clone()).or_default();
            let found = positions(stored, &request.filter, request.multi)?;

            let mut outcome = UpdateOutcome {
                matched_count: found.len() as u64,
                ..UpdateOutcome::default()
            };

            let mut updated = Vec::with_capacity(found.len());
            for index in found {
                let mut document = stored[index].clone();
                if apply_update(&mut document, &request.update)? {
                    updated.push((index, document));
                }
            }
            outcome.modified_count = updated.len() as u64;
            for (index, document) in updated {
                stored[index] = document;
            }

            if outcome.matched_count == 0 && request.upsert {
                let mut seed = upsert_seed(&request.filter)?;
                apply_update(&mut seed, &request.update)?;

                let document = with_identifier(seed, None);
                outcome.upserted_id = document.get("_id").cloned();
                stored.push(document);
            }

            Ok(outcome)
        })
        .await
    }

    async fn replace(
        &self,
        request: ReplaceRequest,
        session: Option<&mut Self::Session>,
    ) -> DatastoreResult<UpdateOutcome> {
        let collection = request.collection.clone();

        self.write(session, |store| {
            let stored = store.entry(request.collection).or_default();
            let found = positions(stored, &request.filter, false)?;

            let Some(&index) = found.first() else {
                if !request.upsert {
                    return Ok(UpdateOutcome::default());
                }

                let seed = upsert_seed(&request.filter)?;
                let document = with_identifier(request.replacement, seed.get("_id"));
                let id = document.get("_id").cloned().unwrap_or(Bson::Null);
                if stored
                    .iter()
                    .filter_map(|existing| existing.get("_id"))
                    .any(|existing| bson_eq(existing, &id))
                {
                    return Err(duplicate_key(&collection, &id));
                }

                stored.push(document);
                return Ok(UpdateOutcome {
                    upserted_id: Some(id),
                    ..UpdateOutcome::default()
                });
            };

            let current_id = stored[index].get("_id").cloned();
            if let (Some(current), Some(requested)) = (&current_id, request.replacement.get("_id"))
                && !bson_eq(current, requested)
            {
                return Err(DatastoreError::Backend(
                    "The replacement would modify the immutable field '_id'".to_string(),
                ));
            }

            let document = with_identifier(request.replacement, current_id.as_ref());
            let modified = document != stored[index];
            stored[index] = document;

            Ok(UpdateOutcome {
                matched_count: 1,
                modified_count: u64::from(modified),
                upserted_id: None,
            })
        })
        .await
    }

    async fn delete(
        &self,
        request: DeleteRequest,
        session: Option<&mut Self::Session>,
    ) -> DatastoreResult<u64> {
        self.write(session, |store| {
            let Some(stored) = store.get_mut(&request.collection) else {
                return Ok(0);
            };

            let found = positions(stored, &request.filter, request.multi)?;
            for &index in found.iter().rev() {
                stored.remove(index);
            }

            Ok(found.len() as u64)
        })
        .await
    }
}

/// Session of a [`MemoryBackend`].
///
/// A transaction works on a private copy of the store taken when it starts. Commit
/// publishes the copy as a whole; concurrent commits are last-writer-wins.
#[derive(Debug)]
pub struct MemorySession {
    store: Arc<RwLock<StoreMap>>,
    working: Option<StoreMap>,
}

#[async_trait]
impl BackendSession for MemorySession {
    async fn start_transaction(&mut self, _options: &TransactionOptions) -> DatastoreResult<()> {
        if self.working.is_some() {
            return Err(DatastoreError::IllegalTransactionStatus(
                "A transaction is already in progress on this session".to_string(),
            ));
        }

        self.working = Some(self.store.read().await.clone());
        trace!("memory transaction started");
        Ok(())
    }

    async fn commit_transaction(&mut self) -> DatastoreResult<()> {
        let working = self.working.take().ok_or_else(|| {
            DatastoreError::IllegalTransactionStatus("No transaction in progress to commit".to_string())
        })?;

        *self.store.write().await = working;
        trace!("memory transaction committed");
        Ok(())
    }

    async fn abort_transaction(&mut self) -> DatastoreResult<()> {
        if self.working.take().is_none() {
            return Err(DatastoreError::IllegalTransactionStatus(
                "No transaction in progress to abort".to_string(),
            ));
        }

        trace!("memory transaction aborted");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.working.is_some()
    }
}

/// Builder for [`MemoryBackend`] instances.
///
/// The builder can seed collections before the backend is handed out, which is mostly
/// useful in tests.
#[derive(Default, Debug)]
pub struct MemoryBackendBuilder {
    seed: StoreMap,
}

impl MemoryBackendBuilder {
    /// Adds documents to a collection of the built backend.
    pub fn with_documents(mut self, collection: impl Into<String>, documents: impl IntoIterator<Item = Document>) -> Self {
        self.seed
            .entry(collection.into())
            .or_default()
            .extend(documents.into_iter().map(|document| with_identifier(document, None)));
        self
    }
}

#[async_trait]
impl DatastoreBackendBuilder for MemoryBackendBuilder {
    type Backend = MemoryBackend;

    async fn build(self) -> DatastoreResult<Self::Backend> {
        Ok(MemoryBackend {
            store: Arc::new(RwLock::new(self.seed)),
        })
    }
}
