//! Main docmap crate providing an expression-driven mapping layer for MongoDB documents.
//!
//! This crate is the primary entry point for users of the docmap framework. It re-exports
//! the core types from the sub-crates and provides access to the storage backends.
//!
//! # Features
//!
//! - **Typed records** - Describe document shapes with a `PropertySet` and handle values as
//!   `PropertyBox`es, or derive `Bean` on plain structs
//! - **Pluggable resolution** - Every filter, sort, update and value conversion goes through
//!   a priority-ordered resolver chain that can be extended at build time
//! - **Multiple backends** - In-memory and MongoDB backends behind one trait
//! - **Transactions** - Explicit units of work, with nested flows joining the active transaction
//! - **Three flavors** - Async, blocking and stream-based operations over the same core
//!
//! # Quick Start
//!
//! ```ignore
//! use docmap::{prelude::*, memory::MemoryBackend};
//! use docmap::bson::oid::ObjectId;
//!
//! #[derive(Debug, Clone, Bean)]
//! pub struct User {
//!     #[bean(id)]
//!     pub id: Option<ObjectId>,
//!     pub name: String,
//!     #[bean(path = "profile.city")]
//!     pub city: Option<String>,
//! }
//!
//! #[tokio::main]
//! async fn main() -> DatastoreResult<()> {
//!     let datastore = Datastore::builder(MemoryBackend::new()).build()?;
//!     let users = DataTarget::named("users");
//!
//!     let user = User { id: None, name: "Alice".to_string(), city: Some("Rome".to_string()) };
//!     let result = datastore.operations().insert_bean(&users, &user).await?;
//!     println!("generated id: {:?}", result.first_inserted_key());
//!
//!     let romans: Vec<User> = datastore
//!         .operations()
//!         .query_beans(&users, &Query::builder().filter(Filter::eq("profile.city", "Rome")).build())
//!         .await?;
//!     println!("{romans:?}");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Transactions
//!
//! ```ignore
//! use docmap::{prelude::*, memory::MemoryBackend};
//!
//! let mut unit = datastore.unit_of_work();
//! unit.with_transaction(TransactionConfiguration::default(), async |scope| {
//!     scope.operations().insert_bean(&users, &alice).await?;
//!     scope.operations().insert_bean(&users, &bob).await?;
//!     Ok(())
//! })
//! .await?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - `mongodb` - MongoDB backend (requires the `mongodb` feature)

pub mod prelude;

pub use docmap_core::{
    aggregation, backend, bean, blocking, commodity, config, context, datastore, error, expression, id, path,
    property, query, resolver, resolvers, stream, transaction, unit_of_work, update, value,
};

pub use docmap_core::datastore::{Datastore, DatastoreBuilder};
pub use docmap_macros::{Bean, BeanEnum};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend.
pub mod memory {
    pub use docmap_memory::{MemoryBackend, MemoryBackendBuilder, MemorySession};
}

/// MongoDB storage backend.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmap_mongodb::{MongoBackend, MongoBackendBuilder, MongoSession};
}
