//! A stream flavor of the datastore.
//!
//! Every operation returns a lazy [`Stream`]: nothing is resolved or sent to the backend
//! until the stream is first polled. Query results are decoded one item at a time as the
//! stream is consumed. Single-outcome operations yield exactly one item, lookups at most
//! one.
//!
//! [`StreamDatastore::begin`] yields a datastore bound to a new transaction. Its
//! operations run in the transaction's session until it is committed, rolled back or
//! finished.
//!
//! ```ignore
//! let mut begun = pin!(datastore.begin(TransactionConfiguration::default()));
//! let bound = begun.try_next().await?.expect("begin yields one datastore");
//! bound.insert(target.clone(), value).try_collect::<Vec<_>>().await?;
//! bound.commit().try_collect::<Vec<_>>().await?;
//! ```

use std::{fmt, sync::Arc};

use bson::Document;
use futures::{Stream, StreamExt, TryStreamExt, future, lock::Mutex, stream};
use tracing::warn;

use crate::{
    aggregation::Aggregation,
    backend::DatastoreBackend,
    bean::Bean,
    commodity::{OperationResult, Operations, decode_one},
    datastore::Datastore,
    error::{DatastoreError, DatastoreResult},
    expression::DataTarget,
    property::{Property, PropertyBox, PropertySet},
    query::{Query, QueryFilter},
    transaction::{SessionTransaction, Transaction, TransactionConfiguration},
    unit_of_work::{TransactionScope, finalize, join, release, run_in_new, start},
    update::Update,
    value::Value,
};

type Slot<S> = Arc<Mutex<Option<SessionTransaction<S>>>>;

/// A datastore whose operations return streams.
pub struct StreamDatastore<B: DatastoreBackend> {
    datastore: Datastore<B>,
    transaction: Option<Slot<B::Session>>,
}

impl<B: DatastoreBackend> Clone for StreamDatastore<B> {
    fn clone(&self) -> Self {
        StreamDatastore {
            datastore: self.datastore.clone(),
            transaction: self.transaction.clone(),
        }
    }
}

impl<B: DatastoreBackend> fmt::Debug for StreamDatastore<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamDatastore")
            .field("datastore", &self.datastore)
            .field("bound", &self.is_bound())
            .finish()
    }
}

impl<B: DatastoreBackend> StreamDatastore<B> {
    pub fn new(datastore: Datastore<B>) -> Self {
        StreamDatastore {
            datastore,
            transaction: None,
        }
    }

    pub fn datastore(&self) -> &Datastore<B> {
        &self.datastore
    }

    /// Whether this datastore was returned by [`StreamDatastore::begin`].
    pub fn is_bound(&self) -> bool {
        self.transaction.is_some()
    }

    /// Runs one operation when the stream is first polled, inside the bound transaction if
    /// there is one.
    fn once<T, F>(&self, operation: F) -> impl Stream<Item = DatastoreResult<T>> + use<B, T, F>
    where
        F: AsyncFnOnce(Operations<'_, B>) -> DatastoreResult<T>,
    {
        let datastore = self.datastore.clone();
        let transaction = self.transaction.clone();

        stream::once(async move {
            let Some(slot) = transaction else {
                return operation(datastore.operations()).await;
            };
            let mut guard = slot.lock().await;
            let Some(active) = guard.as_mut().filter(|t| t.is_active()) else {
                return Err(DatastoreError::IllegalTransactionStatus(
                    "The transaction of this stream datastore has already ended".to_string(),
                ));
            };
            operation(Operations::new(&datastore, active.session_mut())).await
        })
    }

    /// Streams the values matching a query, decoding each one as it is pulled.
    pub fn query(
        &self,
        target: DataTarget,
        set: PropertySet,
        query: Query,
    ) -> impl Stream<Item = DatastoreResult<PropertyBox>> + use<B> {
        self.once(async move |mut operations| operations.fetch(&target, &set, &query).await)
            .map_ok(|(context, documents)| stream::iter(documents).map(move |document| decode_one(&context, document)))
            .try_flatten()
    }

    /// Yields the single value matching a query, or nothing.
    pub fn query_one(
        &self,
        target: DataTarget,
        set: PropertySet,
        query: Query,
    ) -> impl Stream<Item = DatastoreResult<PropertyBox>> + use<B> {
        self.once(async move |mut operations| operations.query_one(&target, &set, &query).await)
            .try_filter_map(|value| future::ready(Ok(value)))
    }

    /// Yields the value with the given identifier, or nothing.
    pub fn find_by_id(
        &self,
        target: DataTarget,
        set: PropertySet,
        id: Value,
    ) -> impl Stream<Item = DatastoreResult<PropertyBox>> + use<B> {
        self.once(async move |mut operations| operations.find_by_id(&target, &set, id).await)
            .try_filter_map(|value| future::ready(Ok(value)))
    }

    /// Streams the beans matching a query.
    pub fn query_beans<T: Bean + 'static>(
        &self,
        target: DataTarget,
        query: Query,
    ) -> impl Stream<Item = DatastoreResult<T>> + use<B, T> {
        self.query(target, T::property_set(), query)
            .map(|value| value.and_then(|value| T::from_property_box(&value)))
    }

    /// Yields the bean with the given identifier, or nothing.
    pub fn find_bean_by_id<T: Bean + 'static>(
        &self,
        target: DataTarget,
        id: Value,
    ) -> impl Stream<Item = DatastoreResult<T>> + use<B, T> {
        self.find_by_id(target, T::property_set(), id)
            .map(|value| value.and_then(|value| T::from_property_box(&value)))
    }

    /// Streams the distinct values of a property.
    pub fn distinct(
        &self,
        target: DataTarget,
        set: PropertySet,
        property: Property,
        filter: Option<QueryFilter>,
    ) -> impl Stream<Item = DatastoreResult<Value>> + use<B> {
        self.once(async move |mut operations| {
            operations
                .distinct(&target, &set, &property, filter.as_ref())
                .await
        })
        .map_ok(|values| stream::iter(values).map(Ok::<_, DatastoreError>))
        .try_flatten()
    }

    /// Streams the output of an aggregation pipeline.
    pub fn aggregate(
        &self,
        target: DataTarget,
        set: PropertySet,
        aggregation: Aggregation,
    ) -> impl Stream<Item = DatastoreResult<PropertyBox>> + use<B> {
        self.once(async move |mut operations| operations.pipeline(&target, &set, &aggregation).await)
            .map_ok(|(context, documents)| stream::iter(documents).map(move |document| decode_one(&context, document)))
            .try_flatten()
    }

    /// Streams the raw output documents of an aggregation pipeline.
    pub fn aggregate_documents(
        &self,
        target: DataTarget,
        set: PropertySet,
        aggregation: Aggregation,
    ) -> impl Stream<Item = DatastoreResult<Document>> + use<B> {
        self.once(async move |mut operations| {
            operations
                .aggregate_documents(&target, &set, &aggregation)
                .await
        })
        .map_ok(|documents| stream::iter(documents).map(Ok::<_, DatastoreError>))
        .try_flatten()
    }

    pub fn count(&self, target: DataTarget, set: PropertySet, query: Query) -> impl Stream<Item = DatastoreResult<u64>> + use<B> {
        self.once(async move |mut operations| operations.count(&target, &set, &query).await)
    }

    pub fn insert(&self, target: DataTarget, value: PropertyBox) -> impl Stream<Item = DatastoreResult<OperationResult>> + use<B> {
        self.once(async move |mut operations| operations.insert(&target, &value).await)
    }

    pub fn save(&self, target: DataTarget, value: PropertyBox) -> impl Stream<Item = DatastoreResult<OperationResult>> + use<B> {
        self.once(async move |mut operations| operations.save(&target, &value).await)
    }

    pub fn update(&self, target: DataTarget, value: PropertyBox) -> impl Stream<Item = DatastoreResult<OperationResult>> + use<B> {
        self.once(async move |mut operations| operations.update(&target, &value).await)
    }

    pub fn delete(&self, target: DataTarget, value: PropertyBox) -> impl Stream<Item = DatastoreResult<OperationResult>> + use<B> {
        self.once(async move |mut operations| operations.delete(&target, &value).await)
    }

    pub fn bulk_insert(
        &self,
        target: DataTarget,
        values: Vec<PropertyBox>,
    ) -> impl Stream<Item = DatastoreResult<OperationResult>> + use<B> {
        self.once(async move |mut operations| operations.bulk_insert(&target, &values).await)
    }

    pub fn bulk_update(
        &self,
        target: DataTarget,
        set: PropertySet,
        filter: Option<QueryFilter>,
        update: Update,
    ) -> impl Stream<Item = DatastoreResult<OperationResult>> + use<B> {
        self.once(async move |mut operations| {
            operations
                .bulk_update(&target, &set, filter.as_ref(), &update)
                .await
        })
    }

    pub fn bulk_delete(
        &self,
        target: DataTarget,
        set: PropertySet,
        filter: Option<QueryFilter>,
    ) -> impl Stream<Item = DatastoreResult<OperationResult>> + use<B> {
        self.once(async move |mut operations| operations.bulk_delete(&target, &set, filter.as_ref()).await)
    }

    pub fn insert_bean<T: Bean + 'static>(
        &self,
        target: DataTarget,
        bean: T,
    ) -> impl Stream<Item = DatastoreResult<OperationResult>> + use<B, T> {
        self.once(async move |mut operations| operations.insert_bean(&target, &bean).await)
    }

    pub fn save_bean<T: Bean + 'static>(
        &self,
        target: DataTarget,
        bean: T,
    ) -> impl Stream<Item = DatastoreResult<OperationResult>> + use<B, T> {
        self.once(async move |mut operations| operations.save_bean(&target, &bean).await)
    }

    /// Yields a datastore bound to a new transaction.
    ///
    /// When called on a bound datastore whose transaction has not been finalized yet, that
    /// transaction is finalized first.
    pub fn begin(
        &self,
        configuration: TransactionConfiguration,
    ) -> impl Stream<Item = DatastoreResult<StreamDatastore<B>>> + use<B> {
        let datastore = self.datastore.clone();
        let bound = self.transaction.clone();

        stream::once(async move {
            if let Some(slot) = bound
                && let Some(mut dangling) = slot.lock().await.take()
            {
                warn!(
                    status = ?dangling.status(),
                    "a transaction is still bound to the stream datastore, finalizing it"
                );
                finalize(&mut dangling).await?;
            }

            let transaction = start(&datastore, configuration).await?;
            Ok(StreamDatastore {
                datastore,
                transaction: Some(Arc::new(Mutex::new(Some(transaction)))),
            })
        })
    }

    /// Commits the bound transaction and releases its session.
    ///
    /// Yields `false` when the transaction was rollback-only and got rolled back.
    pub fn commit(&self) -> impl Stream<Item = DatastoreResult<bool>> + use<B> {
        let slot = self.transaction.clone();

        stream::once(async move {
            let mut transaction = take(slot, "commit").await?;
            let committed = transaction.commit().await;
            release(transaction, committed).await
        })
    }

    /// Rolls the bound transaction back and releases its session.
    pub fn rollback(&self) -> impl Stream<Item = DatastoreResult<()>> + use<B> {
        let slot = self.transaction.clone();

        stream::once(async move {
            let mut transaction = take(slot, "rollback").await?;
            let rolled_back = transaction.rollback().await;
            release(transaction, rolled_back).await
        })
    }

    /// Ends the bound transaction, if any, according to its configuration and releases its
    /// session.
    pub fn finish(&self) -> impl Stream<Item = DatastoreResult<()>> + use<B> {
        let slot = self.transaction.clone();

        stream::once(async move {
            let taken = match slot {
                Some(slot) => slot.lock().await.take(),
                None => None,
            };
            match taken {
                Some(mut transaction) => finalize(&mut transaction).await,
                None => Ok(()),
            }
        })
    }

    /// Runs `work` inside a transaction, yielding its result.
    ///
    /// On a bound datastore with an active transaction `work` joins it, otherwise a new
    /// transaction is started and finalized the way [`UnitOfWork::with_transaction`] does.
    ///
    /// [`UnitOfWork::with_transaction`]: crate::unit_of_work::UnitOfWork::with_transaction
    pub fn with_transaction<T, F>(
        &self,
        configuration: TransactionConfiguration,
        work: F,
    ) -> impl Stream<Item = DatastoreResult<T>> + use<B, T, F>
    where
        F: AsyncFnOnce(&mut TransactionScope<'_, B>) -> DatastoreResult<T>,
    {
        let datastore = self.datastore.clone();
        let bound = self.transaction.clone();

        stream::once(async move {
            if let Some(slot) = bound {
                let mut guard = slot.lock().await;
                if let Some(active) = guard.as_mut().filter(|t| t.is_active()) {
                    return join(&datastore, active, work).await;
                }
            }
            run_in_new(&datastore, configuration, work).await
        })
    }
}

async fn take<S>(slot: Option<Slot<S>>, action: &str) -> DatastoreResult<SessionTransaction<S>> {
    let taken = match slot {
        Some(slot) => slot.lock().await.take(),
        None => None,
    };
    taken.ok_or_else(|| {
        DatastoreError::IllegalTransactionStatus(format!(
            "Cannot {action}: the stream datastore is not bound to a transaction"
        ))
    })
}
