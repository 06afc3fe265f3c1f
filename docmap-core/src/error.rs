//! Error types and result types for datastore operations.
//!
//! Every fallible operation in this crate returns [`DatastoreResult<T>`]. Errors raised by
//! resolvers propagate unchanged; errors coming from foreign sources (the driver, BSON
//! serialization) are folded into [`DatastoreError`] exactly once.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when mapping, resolving or executing
/// datastore operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatastoreError {
    /// A malformed expression was detected before resolution.
    #[error("Invalid expression: {0}")]
    InvalidExpression(String),
    /// No resolver produced a result for a required expression/target pair.
    #[error("Failed to resolve expression {expression} into {target}")]
    Resolution {
        /// Debug rendering of the unresolved expression.
        expression: String,
        /// Name of the requested result type.
        target: &'static str,
    },
    /// A resolver with the same input type, output type and priority is already registered.
    #[error("Ambiguous resolver registration: {0}")]
    AmbiguousResolver(String),
    /// The document identifier is ambiguous or of a type that cannot be stored as `_id`.
    #[error("Invalid document identifier: {0}")]
    InvalidDocumentIdentifier(String),
    /// A decoded value does not match the declared type of its property.
    #[error("Type mismatch for {path}: expected {expected}, found {actual}")]
    TypeMismatch {
        /// Full name of the property being decoded.
        path: String,
        /// Declared property type.
        expected: String,
        /// Runtime type of the decoded value.
        actual: String,
    },
    /// A transaction method was invoked in a state that forbids it.
    #[error("Illegal transaction status: {0}")]
    IllegalTransactionStatus(String),
    /// Generic data access failure.
    #[error("Data access error: {0}")]
    DataAccess(String),
    /// An error reported by the underlying driver.
    #[error("Backend error: {0}")]
    Backend(String),
    /// Serialization/deserialization error when converting between document formats.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during datastore initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
}

impl DatastoreError {
    /// Wraps an arbitrary error into a [`DatastoreError::DataAccess`].
    ///
    /// Errors that already are a [`DatastoreError`] are returned unchanged.
    pub fn data_access<E>(err: E) -> Self
    where
        E: std::error::Error + 'static,
    {
        match (&err as &(dyn std::error::Error + 'static)).downcast_ref::<DatastoreError>() {
            Some(existing) => existing.clone(),
            None => DatastoreError::DataAccess(err.to_string()),
        }
    }

    /// Builds a [`DatastoreError::Resolution`] for the given expression and target type.
    pub fn resolution<E: std::fmt::Debug>(expression: &E, target: &'static str) -> Self {
        DatastoreError::Resolution {
            expression: format!("{expression:?}"),
            target,
        }
    }
}

/// A specialized `Result` type for datastore operations.
pub type DatastoreResult<T> = Result<T, DatastoreError>;

impl From<BsonError> for DatastoreError {
    fn from(err: BsonError) -> Self {
        DatastoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DatastoreError {
    fn from(err: SerdeJsonError) -> Self {
        DatastoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_access_does_not_double_wrap() {
        let original = DatastoreError::InvalidDocumentIdentifier("two candidates".into());
        assert_eq!(DatastoreError::data_access(original.clone()), original);
    }

    #[test]
    fn data_access_wraps_foreign_errors() {
        let err = std::io::Error::other("socket closed");
        assert_eq!(
            DatastoreError::data_access(err),
            DatastoreError::DataAccess("socket closed".into())
        );
    }
}
