//! A blocking flavor of the datastore.
//!
//! [`BlockingDatastore`] owns a current-thread tokio runtime and drives the async
//! operations to completion on it. It must not be used from within an async context.

use std::future::Future;

use bson::Document;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, warn};

use crate::{
    aggregation::Aggregation,
    backend::DatastoreBackend,
    bean::Bean,
    commodity::{OperationResult, Operations},
    datastore::Datastore,
    error::{DatastoreError, DatastoreResult},
    expression::DataTarget,
    property::{Property, PropertyBox, PropertySet},
    query::{Query, QueryFilter},
    transaction::{Transaction, TransactionConfiguration},
    unit_of_work::UnitOfWork,
    update::Update,
    value::Value,
};

/// A datastore whose operations block the calling thread.
#[derive(Debug)]
pub struct BlockingDatastore<B: DatastoreBackend> {
    datastore: Datastore<B>,
    runtime: Runtime,
}

impl<B: DatastoreBackend> BlockingDatastore<B> {
    pub fn new(datastore: Datastore<B>) -> DatastoreResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| DatastoreError::Initialization(format!("Failed to create runtime: {err}")))?;
        debug!("blocking datastore runtime started");

        Ok(BlockingDatastore { datastore, runtime })
    }

    pub fn datastore(&self) -> &Datastore<B> {
        &self.datastore
    }

    /// Runs a future to completion on the owned runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Operations running outside any transaction.
    pub fn operations(&self) -> BlockingOperations<'_, B> {
        BlockingOperations {
            runtime: &self.runtime,
            operations: self.datastore.operations(),
        }
    }

    /// Starts a transaction; it is finalized by [`BlockingTransaction::commit`],
    /// [`BlockingTransaction::rollback`] or [`BlockingTransaction::finish`].
    pub fn begin(&self, configuration: TransactionConfiguration) -> DatastoreResult<BlockingTransaction<'_, B>> {
        let mut work = self.datastore.unit_of_work();
        self.runtime.block_on(work.begin(configuration))?;

        Ok(BlockingTransaction {
            runtime: &self.runtime,
            work,
        })
    }

    /// Runs `work` in a new transaction, ending it when `work` returns and rolling back on
    /// error when the configuration asks for it. The session is always released.
    pub fn with_transaction<T>(
        &self,
        configuration: TransactionConfiguration,
        work: impl FnOnce(&mut BlockingTransaction<'_, B>) -> DatastoreResult<T>,
    ) -> DatastoreResult<T> {
        let rollback_on_error = configuration.rollback_on_error;
        let mut transaction = self.begin(configuration)?;

        match work(&mut transaction) {
            Ok(value) => transaction.finish().map(|_| value),
            Err(err) => {
                let cleanup = if rollback_on_error && transaction.is_active() {
                    transaction.rollback()
                } else {
                    transaction.finish()
                };
                if let Err(cleanup_err) = cleanup {
                    warn!(error = %cleanup_err, "failed to finalize a transaction after an error");
                }
                Err(err)
            }
        }
    }
}

/// A transaction of a [`BlockingDatastore`].
pub struct BlockingTransaction<'a, B: DatastoreBackend> {
    runtime: &'a Runtime,
    work: UnitOfWork<'a, B>,
}

impl<B: DatastoreBackend> BlockingTransaction<'_, B> {
    /// Operations running inside the transaction.
    pub fn operations(&mut self) -> BlockingOperations<'_, B> {
        BlockingOperations {
            runtime: self.runtime,
            operations: self.work.operations(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.work.in_transaction()
    }

    /// Marks the transaction so that it can only roll back.
    pub fn set_rollback_only(&mut self) {
        if let Some(transaction) = self.work.transaction() {
            transaction.set_rollback_only();
        }
    }

    pub fn commit(&mut self) -> DatastoreResult<bool> {
        self.runtime.block_on(self.work.commit())
    }

    pub fn rollback(&mut self) -> DatastoreResult<()> {
        self.runtime.block_on(self.work.rollback())
    }

    /// Ends the transaction according to its configuration.
    pub fn finish(&mut self) -> DatastoreResult<()> {
        self.runtime.block_on(self.work.finish())
    }
}

/// Blocking counterparts of [`Operations`].
pub struct BlockingOperations<'a, B: DatastoreBackend> {
    runtime: &'a Runtime,
    operations: Operations<'a, B>,
}

impl<B: DatastoreBackend> BlockingOperations<'_, B> {
    pub fn insert(&mut self, target: &DataTarget, value: &PropertyBox) -> DatastoreResult<OperationResult> {
        self.runtime.block_on(self.operations.insert(target, value))
    }

    pub fn update(&mut self, target: &DataTarget, value: &PropertyBox) -> DatastoreResult<OperationResult> {
        self.runtime.block_on(self.operations.update(target, value))
    }

    pub fn save(&mut self, target: &DataTarget, value: &PropertyBox) -> DatastoreResult<OperationResult> {
        self.runtime.block_on(self.operations.save(target, value))
    }

    pub fn delete(&mut self, target: &DataTarget, value: &PropertyBox) -> DatastoreResult<OperationResult> {
        self.runtime.block_on(self.operations.delete(target, value))
    }

    pub fn bulk_insert(&mut self, target: &DataTarget, values: &[PropertyBox]) -> DatastoreResult<OperationResult> {
        self.runtime.block_on(self.operations.bulk_insert(target, values))
    }

    pub fn bulk_update(
        &mut self,
        target: &DataTarget,
        set: &PropertySet,
        filter: Option<&QueryFilter>,
        update: &Update,
    ) -> DatastoreResult<OperationResult> {
        self.runtime
            .block_on(self.operations.bulk_update(target, set, filter, update))
    }

    pub fn bulk_delete(
        &mut self,
        target: &DataTarget,
        set: &PropertySet,
        filter: Option<&QueryFilter>,
    ) -> DatastoreResult<OperationResult> {
        self.runtime.block_on(self.operations.bulk_delete(target, set, filter))
    }

    pub fn query(&mut self, target: &DataTarget, set: &PropertySet, query: &Query) -> DatastoreResult<Vec<PropertyBox>> {
        self.runtime.block_on(self.operations.query(target, set, query))
    }

    pub fn query_one(
        &mut self,
        target: &DataTarget,
        set: &PropertySet,
        query: &Query,
    ) -> DatastoreResult<Option<PropertyBox>> {
        self.runtime.block_on(self.operations.query_one(target, set, query))
    }

    pub fn find_by_id(
        &mut self,
        target: &DataTarget,
        set: &PropertySet,
        id: impl Into<Value>,
    ) -> DatastoreResult<Option<PropertyBox>> {
        self.runtime.block_on(self.operations.find_by_id(target, set, id))
    }

    pub fn count(&mut self, target: &DataTarget, set: &PropertySet, query: &Query) -> DatastoreResult<u64> {
        self.runtime.block_on(self.operations.count(target, set, query))
    }

    pub fn distinct(
        &mut self,
        target: &DataTarget,
        set: &PropertySet,
        property: &Property,
        filter: Option<&QueryFilter>,
    ) -> DatastoreResult<Vec<Value>> {
        self.runtime
            .block_on(self.operations.distinct(target, set, property, filter))
    }

    pub fn aggregate(
        &mut self,
        target: &DataTarget,
        set: &PropertySet,
        aggregation: &Aggregation,
    ) -> DatastoreResult<Vec<PropertyBox>> {
        self.runtime
            .block_on(self.operations.aggregate(target, set, aggregation))
    }

    pub fn aggregate_documents(
        &mut self,
        target: &DataTarget,
        set: &PropertySet,
        aggregation: &Aggregation,
    ) -> DatastoreResult<Vec<Document>> {
        self.runtime
            .block_on(self.operations.aggregate_documents(target, set, aggregation))
    }

    pub fn insert_bean<T: Bean>(&mut self, target: &DataTarget, bean: &T) -> DatastoreResult<OperationResult> {
        self.runtime.block_on(self.operations.insert_bean(target, bean))
    }

    pub fn save_bean<T: Bean>(&mut self, target: &DataTarget, bean: &T) -> DatastoreResult<OperationResult> {
        self.runtime.block_on(self.operations.save_bean(target, bean))
    }

    pub fn query_beans<T: Bean>(&mut self, target: &DataTarget, query: &Query) -> DatastoreResult<Vec<T>> {
        self.runtime.block_on(self.operations.query_beans(target, query))
    }

    pub fn find_bean_by_id<T: Bean>(&mut self, target: &DataTarget, id: impl Into<Value>) -> DatastoreResult<Option<T>> {
        self.runtime.block_on(self.operations.find_bean_by_id(target, id))
    }
}
