//! Driver abstraction the datastore dispatches resolved operations to.
//!
//! The datastore resolves every expression into BSON before it reaches a backend, so a
//! [`DatastoreBackend`] only deals in documents: it never sees property sets, paths or
//! typed values. Each operation can run inside a backend session, which is how
//! multi-document transactions are threaded through explicitly.
//!
//! # Traits
//!
//! - [`DatastoreBackend`]: collection-level operations plus session creation
//! - [`BackendSession`]: the transaction lifecycle of a session
//! - [`DatastoreBackendBuilder`]: factory trait for connecting a backend

use std::fmt::Debug;

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::{
    config::{ReadConcern, ReadPreference, WriteConcern},
    error::DatastoreResult,
    query::QueryOptions,
};

/// Read settings resolved for a single operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOptions {
    pub read_preference: Option<ReadPreference>,
    pub read_concern: Option<ReadConcern>,
}

/// Write settings resolved for a single operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOptions {
    pub write_concern: Option<WriteConcern>,
}

/// A resolved find operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindRequest {
    pub collection: String,
    pub filter: Option<Document>,
    pub sort: Option<Document>,
    pub projection: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
    pub options: QueryOptions,
    pub read: ReadOptions,
}

/// A resolved aggregation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateRequest {
    pub collection: String,
    pub pipeline: Vec<Document>,
    pub options: QueryOptions,
    pub read: ReadOptions,
}

/// A resolved distinct-values lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistinctRequest {
    pub collection: String,
    pub field: String,
    pub filter: Option<Document>,
    pub read: ReadOptions,
}

/// A resolved count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountRequest {
    pub collection: String,
    pub filter: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
    pub read: ReadOptions,
}

/// A resolved update, applied to one or all matching documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateRequest {
    pub collection: String,
    pub filter: Document,
    pub update: Document,
    pub multi: bool,
    pub upsert: bool,
    pub write: WriteOptions,
}

/// A resolved whole-document replacement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaceRequest {
    pub collection: String,
    pub filter: Document,
    pub replacement: Document,
    pub upsert: bool,
    pub write: WriteOptions,
}

/// A resolved deletion of one or all matching documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteRequest {
    pub collection: String,
    pub filter: Document,
    pub multi: bool,
    pub write: WriteOptions,
}

/// Outcome of an update or replacement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_id: Option<Bson>,
}

/// Transaction settings handed to the session when a transaction starts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionOptions {
    pub read_concern: Option<ReadConcern>,
    pub write_concern: Option<WriteConcern>,
    pub read_preference: Option<ReadPreference>,
}

/// A backend session able to run one transaction at a time.
#[async_trait]
pub trait BackendSession: Send {
    async fn start_transaction(&mut self, options: &TransactionOptions) -> DatastoreResult<()>;

    async fn commit_transaction(&mut self) -> DatastoreResult<()>;

    async fn abort_transaction(&mut self) -> DatastoreResult<()>;

    /// Whether a transaction is in progress on this session.
    fn in_transaction(&self) -> bool;

    /// Releases the session and its server-side resources.
    async fn close(self) -> DatastoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Abstract interface for document storage drivers.
///
/// All methods receive fully resolved BSON; `session`, when given, binds the call to an
/// ongoing transaction. Implementations must be safe to share between tasks.
#[async_trait]
pub trait DatastoreBackend: Send + Sync + Debug {
    type Session: BackendSession;

    /// Opens a new session.
    async fn start_session(&self) -> DatastoreResult<Self::Session>;

    /// Returns the documents matching a find request.
    async fn find(
        &self,
        request: FindRequest,
        session: Option<&mut Self::Session>,
    ) -> DatastoreResult<Vec<Document>>;

    /// Runs an aggregation pipeline.
    async fn aggregate(
        &self,
        request: AggregateRequest,
        session: Option<&mut Self::Session>,
    ) -> DatastoreResult<Vec<Document>>;

    /// Returns the distinct values of a field among matching documents.
    async fn distinct(
        &self,
        request: DistinctRequest,
        session: Option<&mut Self::Session>,
    ) -> DatastoreResult<Vec<Bson>>;

    /// Counts matching documents.
    async fn count(
        &self,
        request: CountRequest,
        session: Option<&mut Self::Session>,
    ) -> DatastoreResult<u64>;

    /// Inserts documents, returning their `_id` values in order. Documents without an
    /// `_id` get a generated `ObjectId`.
    async fn insert(
        &self,
        collection: &str,
        documents: Vec<Document>,
        write: WriteOptions,
        session: Option<&mut Self::Session>,
    ) -> DatastoreResult<Vec<Bson>>;

    /// Applies an update document.
    async fn update(
        &self,
        request: UpdateRequest,
        session: Option<&mut Self::Session>,
    ) -> DatastoreResult<UpdateOutcome>;

    /// Replaces a single document.
    async fn replace(
        &self,
        request: ReplaceRequest,
        session: Option<&mut Self::Session>,
    ) -> DatastoreResult<UpdateOutcome>;

    /// Deletes matching documents, returning how many were removed.
    async fn delete(
        &self,
        request: DeleteRequest,
        session: Option<&mut Self::Session>,
    ) -> DatastoreResult<u64>;

    /// Releases the backend's resources.
    async fn shutdown(self) -> DatastoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
pub trait DatastoreBackendBuilder {
    type Backend: DatastoreBackend;

    async fn build(self) -> DatastoreResult<Self::Backend>;
}
