use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use futures::TryStreamExt;
use mongodb::{
    Client, ClientSession, Collection as MongoCollection, Database,
    error::Error as MongoError,
    options::{AggregateOptions, ClientOptions},
};
use tracing::debug;

use docmap_core::{
    backend::{
        AggregateRequest, BackendSession, CountRequest, DatastoreBackend, DatastoreBackendBuilder,
        DeleteRequest, DistinctRequest, FindRequest, ReadOptions, ReplaceRequest, TransactionOptions,
        UpdateOutcome, UpdateRequest, WriteOptions,
    },
    error::{DatastoreError, DatastoreResult},
};

use crate::options::{find_options, read_concern, selection_criteria, transaction_options, write_concern};

/// Binds a driver action to the session when one is given.
macro_rules! with_session {
    ($action:expr, $session:expr) => {
        match $session {
            Some(session) => $action.session(&mut session.session),
            None => $action,
        }
    };
}

fn backend_error(err: MongoError) -> DatastoreError {
    DatastoreError::Backend(err.to_string())
}

/// Whether read and write settings must be left to the transaction.
fn in_transaction(session: &Option<&mut MongoSession>) -> bool {
    session.as_ref().is_some_and(|session| session.active)
}

/// MongoDB implementation of [`DatastoreBackend`].
#[derive(Debug, Clone)]
pub struct MongoBackend {
    client: Client,
    database: Database,
}

impl MongoBackend {
    pub fn new(client: Client, database: &str) -> Self {
        Self {
            database: client.database(database),
            client,
        }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoBackendBuilder {
        MongoBackendBuilder::new(dsn, database)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    fn collection(&self, name: &str) -> MongoCollection<Document> {
        self.database.collection(name)
    }
}

/// Puts `_id` first, generating an `ObjectId` when the document has none, so that the
/// inserted keys can be reported in input order.
fn identified(document: Document) -> (Bson, Document) {
    let id = document
        .get("_id")
        .cloned()
        .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));

    let mut identified = Document::new();
    identified.insert("_id", id.clone());
    identified.extend(document.into_iter().filter(|(key, _)| key != "_id"));
    (id, identified)
}

#[async_trait]
impl DatastoreBackend for MongoBackend {
    type Session = MongoSession;

    async fn start_session(&self) -> DatastoreResult<Self::Session> {
        let session = self.client.start_session().await.map_err(backend_error)?;

        Ok(MongoSession { session, active: false })
    }

    async fn find(
        &self,
        request: FindRequest,
        session: Option<&mut Self::Session>,
    ) -> DatastoreResult<Vec<Document>> {
        let mut options = find_options(&request.options, &request.read, in_transaction(&session));
        options.sort = request.sort;
        options.projection = request.projection;
        options.skip = request.skip;
        options.limit = request.limit;

        let collection = self.collection(&request.collection);
        let action = collection
            .find(request.filter.unwrap_or_default())
            .with_options(options);

        match session {
            Some(session) => action
                .session(&mut session.session)
                .await
                .map_err(backend_error)?
                .stream(&mut session.session)
                .try_collect()
                .await
                .map_err(backend_error),
            None => action
                .await
                .map_err(backend_error)?
                .try_collect()
                .await
                .map_err(backend_error),
        }
    }

    async fn aggregate(
        &self,
        request: AggregateRequest,
        session: Option<&mut Self::Session>,
    ) -> DatastoreResult<Vec<Document>> {
        // find options carry the same hints, limits and read settings
        let find = find_options(&request.options, &request.read, in_transaction(&session));

        let mut options = AggregateOptions::default();
        options.collation = find.collation;
        options.hint = find.hint;
        options.max_time = find.max_time;
        options.batch_size = find.batch_size;
        options.comment = find.comment;
        options.selection_criteria = find.selection_criteria;
        options.read_concern = find.read_concern;

        let collection = self.collection(&request.collection);
        let action = collection
            .aggregate(request.pipeline)
            .with_options(options);

        match session {
            Some(session) => action
                .session(&mut session.session)
                .await
                .map_err(backend_error)?
                .stream(&mut session.session)
                .try_collect()
                .await
                .map_err(backend_error),
            None => action
                .await
                .map_err(backend_error)?
                .try_collect()
                .await
                .map_err(backend_error),
        }
    }

    async fn distinct(
        &self,
        request: DistinctRequest,
        session: Option<&mut Self::Session>,
    ) -> DatastoreResult<Vec<Bson>> {
        let ReadOptions {
            read_preference,
            read_concern: concern,
        } = if in_transaction(&session) { ReadOptions::default() } else { request.read };

        let collection = self.collection(&request.collection);
        let mut action = collection.distinct(&request.field, request.filter.unwrap_or_default());
        if let Some(preference) = read_preference {
            action = action.selection_criteria(selection_criteria(preference));
        }
        if let Some(concern) = concern {
            action = action.read_concern(read_concern(concern));
        }

        with_session!(action, session).await.map_err(backend_error)
    }

    async fn count(
        &self,
        request: CountRequest,
        session: Option<&mut Self::Session>,
    ) -> DatastoreResult<u64> {
        let ReadOptions {
            read_preference,
            read_concern: concern,
        } = if in_transaction(&session) { ReadOptions::default() } else { request.read };

        let collection = self.collection(&request.collection);
        let mut action = collection.count_documents(request.filter.unwrap_or_default());
        if let Some(skip) = request.skip {
            action = action.skip(skip);
        }
        if let Some(limit) = request.limit.map(i64::unsigned_abs).filter(|limit| *limit > 0) {
            action = action.limit(limit);
        }
        if let Some(preference) = read_preference {
            action = action.selection_criteria(selection_criteria(preference));
        }
        if let Some(concern) = concern {
            action = action.read_concern(read_concern(concern));
        }

        with_session!(action, session).await.map_err(backend_error)
    }

    async fn insert(
        &self,
        collection: &str,
        documents: Vec<Document>,
        write: WriteOptions,
        session: Option<&mut Self::Session>,
    ) -> DatastoreResult<Vec<Bson>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let (ids, documents): (Vec<_>, Vec<_>) = documents.into_iter().map(identified).unzip();

        let collection = self.collection(collection);
        let mut action = collection.insert_many(documents);
        if let Some(concern) = write.write_concern.filter(|_| !in_transaction(&session)) {
            action = action.write_concern(write_concern(&concern));
        }

        with_session!(action, session).await.map_err(backend_error)?;

        Ok(ids)
    }

    async fn update(
        &self,
        request: UpdateRequest,
        session: Option<&mut Self::Session>,
    ) -> DatastoreResult<UpdateOutcome> {
        let collection = self.collection(&request.collection);
        let mut action = if request.multi {
            collection.update_many(request.filter, request.update)
        } else {
            collection.update_one(request.filter, request.update)
        };
        action = action.upsert(request.upsert);
        if let Some(concern) = request.write.write_concern.filter(|_| !in_transaction(&session)) {
            action = action.write_concern(write_concern(&concern));
        }

        let result = with_session!(action, session).await.map_err(backend_error)?;

        Ok(UpdateOutcome {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn replace(
        &self,
        request: ReplaceRequest,
        session: Option<&mut Self::Session>,
    ) -> DatastoreResult<UpdateOutcome> {
        let collection = self.collection(&request.collection);
        let mut action = collection
            .replace_one(request.filter, request.replacement)
            .upsert(request.upsert);
        if let Some(concern) = request.write.write_concern.filter(|_| !in_transaction(&session)) {
            action = action.write_concern(write_concern(&concern));
        }

        let result = with_session!(action, session).await.map_err(backend_error)?;

        Ok(UpdateOutcome {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn delete(
        &self,
        request: DeleteRequest,
        session: Option<&mut Self::Session>,
    ) -> DatastoreResult<u64> {
        let collection = self.collection(&request.collection);
        let mut action = if request.multi {
            collection.delete_many(request.filter)
        } else {
            collection.delete_one(request.filter)
        };
        if let Some(concern) = request.write.write_concern.filter(|_| !in_transaction(&session)) {
            action = action.write_concern(write_concern(&concern));
        }

        let result = with_session!(action, session).await.map_err(backend_error)?;

        Ok(result.deleted_count)
    }

    async fn shutdown(self) -> DatastoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

/// A driver session carrying at most one transaction.
#[derive(Debug)]
pub struct MongoSession {
    session: ClientSession,
    active: bool,
}

impl MongoSession {
    pub fn client_session(&mut self) -> &mut ClientSession {
        &mut self.session
    }
}

#[async_trait]
impl BackendSession for MongoSession {
    async fn start_transaction(&mut self, options: &TransactionOptions) -> DatastoreResult<()> {
        self.session
            .start_transaction()
            .with_options(transaction_options(options))
            .await
            .map_err(backend_error)?;
        self.active = true;

        Ok(())
    }

    async fn commit_transaction(&mut self) -> DatastoreResult<()> {
        let result = self.session.commit_transaction().await.map_err(backend_error);
        self.active = false;
        result
    }

    async fn abort_transaction(&mut self) -> DatastoreResult<()> {
        let result = self.session.abort_transaction().await.map_err(backend_error);
        self.active = false;
        result
    }

    fn in_transaction(&self) -> bool {
        self.active
    }
}

/// Connects a [`MongoBackend`] from a connection string.
///
/// # Example
///
/// ```ignore
/// use docmap::{backend::DatastoreBackendBuilder, mongodb::MongoBackend};
///
/// let backend = MongoBackend::builder("mongodb://localhost:27017", "app")
///     .build()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct MongoBackendBuilder {
    dsn: String,
    database: String,
}

impl MongoBackendBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl DatastoreBackendBuilder for MongoBackendBuilder {
    type Backend = MongoBackend;

    async fn build(self) -> DatastoreResult<Self::Backend> {
        let options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|err| DatastoreError::Initialization(err.to_string()))?;
        let client = Client::with_options(options)
            .map_err(|err| DatastoreError::Initialization(err.to_string()))?;

        debug!(database = %self.database, "connected mongodb backend");
        Ok(MongoBackend::new(client, &self.database))
    }
}
