//! Explicit transaction scoping.
//!
//! A [`UnitOfWork`] is the context a caller threads through a logical flow. It carries at
//! most one transaction; operations obtained from it run inside that transaction's
//! session while it is active.
//!
//! ```ignore
//! let mut work = datastore.unit_of_work();
//! let result = work
//!     .with_transaction(TransactionConfiguration::auto_commit(), async |scope| {
//!         scope.operations().insert(&target, &value).await
//!     })
//!     .await?;
//! ```

use tracing::{debug, warn};

use crate::{
    backend::{BackendSession, DatastoreBackend},
    commodity::Operations,
    datastore::Datastore,
    error::{DatastoreError, DatastoreResult},
    transaction::{DelegatedTransaction, SessionTransaction, Transaction, TransactionConfiguration},
};

/// A per-flow context carrying at most one transaction.
pub struct UnitOfWork<'a, B: DatastoreBackend> {
    datastore: &'a Datastore<B>,
    transaction: Option<SessionTransaction<B::Session>>,
}

impl<'a, B: DatastoreBackend> UnitOfWork<'a, B> {
    pub(crate) fn new(datastore: &'a Datastore<B>) -> Self {
        UnitOfWork {
            datastore,
            transaction: None,
        }
    }

    pub fn datastore(&self) -> &'a Datastore<B> {
        self.datastore
    }

    /// The transaction bound to this unit of work, if any.
    pub fn transaction(&mut self) -> Option<&mut SessionTransaction<B::Session>> {
        self.transaction.as_mut()
    }

    /// Whether an active transaction is bound.
    pub fn in_transaction(&self) -> bool {
        self.transaction.as_ref().is_some_and(|t| t.is_active())
    }

    /// Operations running in the bound transaction, or outside any transaction when none
    /// is active.
    pub fn operations(&mut self) -> Operations<'_, B> {
        let session = self.transaction.as_mut().and_then(|t| t.session_mut());
        Operations::new(self.datastore, session)
    }

    /// Opens a session and starts a transaction on it.
    ///
    /// A transaction still bound from an earlier `begin` is finalized first.
    pub async fn begin(&mut self, configuration: TransactionConfiguration) -> DatastoreResult<()> {
        if let Some(mut dangling) = self.transaction.take() {
            warn!(
                status = ?dangling.status(),
                "a transaction is still bound to the unit of work, finalizing it"
            );
            finalize(&mut dangling).await?;
        }

        self.transaction = Some(start(self.datastore, configuration).await?);

        Ok(())
    }

    /// Commits the bound transaction and releases its session.
    ///
    /// Returns `false` when the transaction was rollback-only and got rolled back.
    pub async fn commit(&mut self) -> DatastoreResult<bool> {
        let mut transaction = self.take_transaction("commit")?;
        let committed = transaction.commit().await;
        release(transaction, committed).await
    }

    /// Rolls the bound transaction back and releases its session.
    pub async fn rollback(&mut self) -> DatastoreResult<()> {
        let mut transaction = self.take_transaction("rollback")?;
        let rolled_back = transaction.rollback().await;
        release(transaction, rolled_back).await
    }

    /// Ends the bound transaction, if any, according to its configuration and releases its
    /// session.
    pub async fn finish(&mut self) -> DatastoreResult<()> {
        match self.transaction.take() {
            Some(mut transaction) => finalize(&mut transaction).await,
            None => Ok(()),
        }
    }

    /// Runs `work` inside a transaction.
    ///
    /// When this unit of work already has an active transaction, `work` joins it through
    /// a [`DelegatedTransaction`] and the outer owner keeps control of its outcome; a
    /// failure marks the joined transaction rollback-only if the outer configuration asks
    /// for it. Otherwise a new transaction is started, ended once `work` returns (rolled
    /// back on error when so configured) and its session released before the result is
    /// returned.
    pub async fn with_transaction<T, F>(&mut self, configuration: TransactionConfiguration, work: F) -> DatastoreResult<T>
    where
        F: AsyncFnOnce(&mut TransactionScope<'_, B>) -> DatastoreResult<T>,
    {
        match self.transaction.as_mut().filter(|t| t.is_active()) {
            Some(active) => join(self.datastore, active, work).await,
            None => run_in_new(self.datastore, configuration, work).await,
        }
    }

    fn take_transaction(&mut self, action: &str) -> DatastoreResult<SessionTransaction<B::Session>> {
        self.transaction.take().ok_or_else(|| {
            DatastoreError::IllegalTransactionStatus(format!(
                "Cannot {action}: no transaction is bound to the unit of work"
            ))
        })
    }
}

impl<B: DatastoreBackend> Drop for UnitOfWork<'_, B> {
    fn drop(&mut self) {
        if self.in_transaction() {
            warn!("unit of work dropped with an active transaction");
        }
    }
}

/// How a [`TransactionScope`] is bound to its transaction.
enum Binding<'s, S> {
    Owned(&'s mut SessionTransaction<S>),
    Joined(DelegatedTransaction<'s, S>),
}

/// The view of a transaction handed to [`UnitOfWork::with_transaction`] bodies.
pub struct TransactionScope<'s, B: DatastoreBackend> {
    datastore: &'s Datastore<B>,
    binding: Binding<'s, B::Session>,
}

impl<B: DatastoreBackend> TransactionScope<'_, B> {
    /// Operations running inside the transaction.
    pub fn operations(&mut self) -> Operations<'_, B> {
        let session = match &mut self.binding {
            Binding::Owned(transaction) => transaction.session_mut(),
            Binding::Joined(transaction) => transaction.session_mut(),
        };
        Operations::new(self.datastore, session)
    }

    /// The transaction itself, for explicit commit, rollback or rollback-only marking.
    pub fn transaction(&mut self) -> &mut dyn Transaction {
        match &mut self.binding {
            Binding::Owned(transaction) => &mut **transaction,
            Binding::Joined(transaction) => transaction,
        }
    }

    /// Whether the scope joined a transaction owned by an outer flow.
    pub fn is_joined(&self) -> bool {
        matches!(self.binding, Binding::Joined(_))
    }
}

/// Runs `work` in an active transaction owned by an outer flow, marking it rollback-only
/// on failure if its configuration asks for it.
pub(crate) async fn join<B, T, F>(
    datastore: &Datastore<B>,
    active: &mut SessionTransaction<B::Session>,
    work: F,
) -> DatastoreResult<T>
where
    B: DatastoreBackend,
    F: AsyncFnOnce(&mut TransactionScope<'_, B>) -> DatastoreResult<T>,
{
    debug!("joining the active transaction");
    let rollback_on_error = active.configuration().rollback_on_error;

    let result = {
        let mut scope = TransactionScope {
            datastore,
            binding: Binding::Joined(DelegatedTransaction::new(&mut *active)),
        };
        work(&mut scope).await
    };

    if result.is_err() && rollback_on_error && active.is_active() {
        active.set_rollback_only();
    }

    result
}

/// Runs `work` in a transaction of its own, ending it once `work` returns and releasing
/// its session.
pub(crate) async fn run_in_new<B, T, F>(
    datastore: &Datastore<B>,
    configuration: TransactionConfiguration,
    work: F,
) -> DatastoreResult<T>
where
    B: DatastoreBackend,
    F: AsyncFnOnce(&mut TransactionScope<'_, B>) -> DatastoreResult<T>,
{
    let mut transaction = start(datastore, configuration).await?;
    let result = {
        let mut scope = TransactionScope {
            datastore,
            binding: Binding::Owned(&mut transaction),
        };
        work(&mut scope).await
    };

    let outcome = match result {
        Ok(value) => finalize(&mut transaction).await.map(|_| value),
        Err(err) => {
            if transaction.is_active() && transaction.configuration().rollback_on_error {
                if let Err(rollback_err) = transaction.rollback().await {
                    warn!(error = %rollback_err, "rollback after a failed transaction body failed");
                }
            }
            Err(err)
        }
    };

    release(transaction, outcome).await
}

pub(crate) async fn start<B: DatastoreBackend>(
    datastore: &Datastore<B>,
    configuration: TransactionConfiguration,
) -> DatastoreResult<SessionTransaction<B::Session>> {
    let session = datastore.backend().start_session().await?;
    let mut transaction = SessionTransaction::new(session, configuration);

    if let Err(err) = transaction.start().await {
        if let Err(close_err) = transaction.close().await {
            warn!(error = %close_err, "failed to release the session of a transaction that did not start");
        }
        return Err(err);
    }

    Ok(transaction)
}

/// Ends a transaction, rolling back anything its configuration left uncommitted, and
/// releases its session.
pub(crate) async fn finalize<S: BackendSession>(transaction: &mut SessionTransaction<S>) -> DatastoreResult<()> {
    let mut ended = transaction.end().await;
    if ended.is_ok() && transaction.is_active() {
        debug!("rolling back a transaction that was neither committed nor rolled back");
        ended = transaction.rollback().await;
    }

    let closed = transaction.close().await;
    ended.and(closed)
}

/// Releases the transaction session, reporting the first failure.
pub(crate) async fn release<S: BackendSession, T>(
    mut transaction: SessionTransaction<S>,
    outcome: DatastoreResult<T>,
) -> DatastoreResult<T> {
    let closed = transaction.close().await;
    let value = outcome?;
    closed.map(|_| value)
}
