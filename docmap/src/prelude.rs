//! Convenient re-exports of commonly used types from docmap.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docmap::prelude::*;
//! ```
//!
//! This provides access to:
//! - The datastore, its flavors and the operation results
//! - Property sets, property boxes, values and beans
//! - Query, update and aggregation construction
//! - Transactions and units of work
//! - Backend traits and error types

pub use docmap_core::{
    aggregation::{Aggregation, AggregationStage},
    backend::{BackendSession, DatastoreBackend, DatastoreBackendBuilder},
    bean::{Bean, BeanValue},
    blocking::BlockingDatastore,
    commodity::{OperationResult, OperationType, Operations},
    config::{DatastoreConfig, OperationOptions, ReadConcern, ReadPreference, WriteConcern},
    datastore::{Datastore, DatastoreBuilder},
    error::{DatastoreError, DatastoreResult},
    expression::DataTarget,
    path::Path,
    property::{Property, PropertyBox, PropertySet},
    query::{Filter, Projection, Query, QueryBuilder, QueryFilter, QuerySort, Sort, SortDirection},
    stream::StreamDatastore,
    transaction::{Transaction, TransactionConfiguration, TransactionStatus},
    unit_of_work::{TransactionScope, UnitOfWork},
    update::Update,
    value::{EnumCodecStrategy, EnumType, PropertyType, TemporalType, Value},
};
pub use docmap_macros::{Bean, BeanEnum};
