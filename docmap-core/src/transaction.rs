//! Transactions bound to a backend session.
//!
//! A transaction moves through `Created -> Active -> {Committed | RolledBack}`.
//! [`Transaction::end`] is the finalizer run at the boundary of a unit of work: it is a
//! no-op on a completed transaction, rolls back a rollback-only one, and commits when
//! auto-commit is configured.
//!
//! A [`DelegatedTransaction`] is handed to nested units of work joining an outer
//! transaction. It forwards commit and rollback, while start and end fail immediately:
//! only the owner of a transaction finalizes it.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    backend::{BackendSession, TransactionOptions},
    config::{ReadConcern, ReadPreference, WriteConcern},
    error::{DatastoreError, DatastoreResult},
};

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Created,
    Active,
    Committed,
    RolledBack,
}

impl TransactionStatus {
    pub fn is_completed(self) -> bool {
        matches!(self, TransactionStatus::Committed | TransactionStatus::RolledBack)
    }
}

/// How a transaction is finalized and which settings it runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionConfiguration {
    /// Commit on [`Transaction::end`] if nothing else completed the transaction.
    pub auto_commit: bool,
    /// Mark the transaction rollback-only when the work run inside it fails.
    pub rollback_on_error: bool,
    pub read_concern: Option<ReadConcern>,
    pub write_concern: Option<WriteConcern>,
    pub read_preference: Option<ReadPreference>,
}

impl Default for TransactionConfiguration {
    fn default() -> Self {
        TransactionConfiguration {
            auto_commit: false,
            rollback_on_error: true,
            read_concern: None,
            write_concern: None,
            read_preference: None,
        }
    }
}

impl TransactionConfiguration {
    /// A configuration committing on end.
    pub fn auto_commit() -> Self {
        TransactionConfiguration {
            auto_commit: true,
            ..TransactionConfiguration::default()
        }
    }

    pub fn rollback_on_error(mut self, rollback_on_error: bool) -> Self {
        self.rollback_on_error = rollback_on_error;
        self
    }

    pub fn read_concern(mut self, concern: ReadConcern) -> Self {
        self.read_concern = Some(concern);
        self
    }

    pub fn write_concern(mut self, concern: WriteConcern) -> Self {
        self.write_concern = Some(concern);
        self
    }

    pub fn read_preference(mut self, preference: ReadPreference) -> Self {
        self.read_preference = Some(preference);
        self
    }

    fn options(&self) -> TransactionOptions {
        TransactionOptions {
            read_concern: self.read_concern,
            write_concern: self.write_concern.clone(),
            read_preference: self.read_preference,
        }
    }
}

/// The transaction lifecycle.
#[async_trait]
pub trait Transaction: Send {
    fn status(&self) -> TransactionStatus;

    fn is_active(&self) -> bool {
        self.status() == TransactionStatus::Active
    }

    fn is_completed(&self) -> bool {
        self.status().is_completed()
    }

    /// Marks the transaction so that the only possible outcome is a rollback.
    fn set_rollback_only(&mut self);

    fn is_rollback_only(&self) -> bool;

    /// `Created -> Active`.
    async fn start(&mut self) -> DatastoreResult<()>;

    /// `Active -> Committed`. Returns `false` when a rollback-only transaction was rolled
    /// back instead.
    async fn commit(&mut self) -> DatastoreResult<bool>;

    /// `Active -> RolledBack`.
    async fn rollback(&mut self) -> DatastoreResult<()>;

    /// Finalizes the transaction; idempotent once completed.
    async fn end(&mut self) -> DatastoreResult<()>;
}

/// A transaction running on a backend session it owns.
#[derive(Debug)]
pub struct SessionTransaction<S> {
    session: Option<S>,
    status: TransactionStatus,
    configuration: TransactionConfiguration,
    rollback_only: bool,
}

impl<S: BackendSession> SessionTransaction<S> {
    pub fn new(session: S, configuration: TransactionConfiguration) -> Self {
        SessionTransaction {
            session: Some(session),
            status: TransactionStatus::Created,
            configuration,
            rollback_only: false,
        }
    }

    pub fn configuration(&self) -> &TransactionConfiguration {
        &self.configuration
    }

    /// The session operations must run in while the transaction is active.
    pub fn session_mut(&mut self) -> Option<&mut S> {
        if self.status == TransactionStatus::Active {
            self.session.as_mut()
        } else {
            None
        }
    }

    fn ensure_active(&self, action: &str) -> DatastoreResult<()> {
        if self.status != TransactionStatus::Active {
            return Err(DatastoreError::IllegalTransactionStatus(format!(
                "Cannot {action} a transaction in status {:?}",
                self.status
            )));
        }

        Ok(())
    }

    fn session(&mut self) -> DatastoreResult<&mut S> {
        self.session.as_mut().ok_or_else(|| {
            DatastoreError::IllegalTransactionStatus("The transaction session was released".to_string())
        })
    }

    /// Releases the session; runs at most once.
    pub async fn close(&mut self) -> DatastoreResult<()> {
        match self.session.take() {
            Some(session) => session.close().await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<S: BackendSession> Transaction for SessionTransaction<S> {
    fn status(&self) -> TransactionStatus {
        self.status
    }

    fn set_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    async fn start(&mut self) -> DatastoreResult<()> {
        if self.status != TransactionStatus::Created {
            return Err(DatastoreError::IllegalTransactionStatus(format!(
                "Cannot start a transaction in status {:?}",
                self.status
            )));
        }

        let options = self.configuration.options();
        self.session()?.start_transaction(&options).await?;
        self.status = TransactionStatus::Active;
        debug!("transaction started");

        Ok(())
    }

    async fn commit(&mut self) -> DatastoreResult<bool> {
        self.ensure_active("commit")?;

        if self.rollback_only {
            debug!("transaction is rollback-only, rolling back instead of committing");
            self.rollback().await?;
            return Ok(false);
        }

        self.session()?.commit_transaction().await?;
        self.status = TransactionStatus::Committed;
        debug!("transaction committed");

        Ok(true)
    }

    async fn rollback(&mut self) -> DatastoreResult<()> {
        self.ensure_active("rollback")?;

        self.session()?.abort_transaction().await?;
        self.status = TransactionStatus::RolledBack;
        debug!("transaction rolled back");

        Ok(())
    }

    async fn end(&mut self) -> DatastoreResult<()> {
        if self.status.is_completed() {
            return Ok(());
        }

        if self.status == TransactionStatus::Active {
            if self.rollback_only {
                self.rollback().await?;
            } else if self.configuration.auto_commit {
                self.commit().await?;
            } else {
                debug!("transaction ended without being committed");
            }
        }

        Ok(())
    }
}

impl<S> Drop for SessionTransaction<S> {
    fn drop(&mut self) {
        if self.session.is_some() && self.status == TransactionStatus::Active {
            warn!("transaction dropped while active, its session is released without commit");
        }
    }
}

/// A nested participant in a transaction owned by an outer unit of work.
#[derive(Debug)]
pub struct DelegatedTransaction<'a, S> {
    delegate: &'a mut SessionTransaction<S>,
}

impl<'a, S: BackendSession> DelegatedTransaction<'a, S> {
    pub fn new(delegate: &'a mut SessionTransaction<S>) -> Self {
        DelegatedTransaction { delegate }
    }

    pub fn session_mut(&mut self) -> Option<&mut S> {
        self.delegate.session_mut()
    }
}

#[async_trait]
impl<S: BackendSession> Transaction for DelegatedTransaction<'_, S> {
    fn status(&self) -> TransactionStatus {
        self.delegate.status()
    }

    fn set_rollback_only(&mut self) {
        self.delegate.set_rollback_only();
    }

    fn is_rollback_only(&self) -> bool {
        self.delegate.is_rollback_only()
    }

    async fn start(&mut self) -> DatastoreResult<()> {
        Err(DatastoreError::IllegalTransactionStatus(
            "A delegated transaction cannot be started".to_string(),
        ))
    }

    async fn commit(&mut self) -> DatastoreResult<bool> {
        self.delegate.commit().await
    }

    async fn rollback(&mut self) -> DatastoreResult<()> {
        self.delegate.rollback().await
    }

    async fn end(&mut self) -> DatastoreResult<()> {
        Err(DatastoreError::IllegalTransactionStatus(
            "A delegated transaction cannot be ended".to_string(),
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records the calls it receives.
    #[derive(Debug, Default, Clone)]
    pub(crate) struct RecordingSession {
        pub calls: Arc<Mutex<Vec<&'static str>>>,
        active: bool,
    }

    impl RecordingSession {
        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl BackendSession for RecordingSession {
        async fn start_transaction(&mut self, _: &TransactionOptions) -> DatastoreResult<()> {
            self.active = true;
            self.record("start");
            Ok(())
        }

        async fn commit_transaction(&mut self) -> DatastoreResult<()> {
            self.active = false;
            self.record("commit");
            Ok(())
        }

        async fn abort_transaction(&mut self) -> DatastoreResult<()> {
            self.active = false;
            self.record("abort");
            Ok(())
        }

        fn in_transaction(&self) -> bool {
            self.active
        }

        async fn close(self) -> DatastoreResult<()> {
            self.record("close");
            Ok(())
        }
    }

    fn transaction(configuration: TransactionConfiguration) -> (SessionTransaction<RecordingSession>, Arc<Mutex<Vec<&'static str>>>) {
        let session = RecordingSession::default();
        let calls = session.calls.clone();
        (SessionTransaction::new(session, configuration), calls)
    }

    #[tokio::test]
    async fn commit_and_rollback_require_active() {
        let (mut tx, _) = transaction(TransactionConfiguration::default());

        assert!(matches!(tx.commit().await, Err(DatastoreError::IllegalTransactionStatus(_))));
        assert!(matches!(tx.rollback().await, Err(DatastoreError::IllegalTransactionStatus(_))));

        tx.start().await.unwrap();
        assert!(tx.start().await.is_err());
        assert!(tx.commit().await.unwrap());
        assert_eq!(tx.status(), TransactionStatus::Committed);

        assert!(tx.commit().await.is_err());
        assert!(tx.rollback().await.is_err());
    }

    #[tokio::test]
    async fn rollback_only_commit_rolls_back() {
        let (mut tx, calls) = transaction(TransactionConfiguration::default());
        tx.start().await.unwrap();
        tx.set_rollback_only();

        assert!(!tx.commit().await.unwrap());
        assert_eq!(tx.status(), TransactionStatus::RolledBack);
        assert_eq!(*calls.lock().unwrap(), vec!["start", "abort"]);
    }

    #[tokio::test]
    async fn end_is_idempotent_and_honours_auto_commit() {
        let (mut tx, calls) = transaction(TransactionConfiguration::auto_commit());
        tx.start().await.unwrap();

        tx.end().await.unwrap();
        tx.end().await.unwrap();
        tx.close().await.unwrap();
        tx.close().await.unwrap();

        assert_eq!(tx.status(), TransactionStatus::Committed);
        assert_eq!(*calls.lock().unwrap(), vec!["start", "commit", "close"]);
    }

    #[tokio::test]
    async fn end_rolls_back_rollback_only() {
        let (mut tx, _) = transaction(TransactionConfiguration::auto_commit());
        tx.start().await.unwrap();
        tx.set_rollback_only();

        tx.end().await.unwrap();

        assert_eq!(tx.status(), TransactionStatus::RolledBack);
    }

    #[tokio::test]
    async fn delegated_forwards_but_cannot_finalize() {
        let (mut tx, _) = transaction(TransactionConfiguration::default());
        tx.start().await.unwrap();

        {
            let mut delegated = DelegatedTransaction::new(&mut tx);
            assert!(delegated.session_mut().is_some());
            assert!(delegated.start().await.is_err());
            assert!(delegated.end().await.is_err());
            assert!(delegated.is_active());
            delegated.rollback().await.unwrap();
        }

        assert_eq!(tx.status(), TransactionStatus::RolledBack);
    }
}
