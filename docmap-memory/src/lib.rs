//! In-memory datastore backend for docmap.
//!
//! This crate provides a thread-safe, in-memory implementation of the `DatastoreBackend`
//! trait. It interprets the resolved MongoDB filters, update documents and aggregation
//! pipelines itself, which makes it a good fit for development and tests.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Query operators** - Comparison, set, regex and logical filter operators
//! - **Update operators** - `$set`, `$unset`, `$inc`, `$push`, `$addToSet`, `$pull`,
//!   `$rename` and `$currentDate`
//! - **Transactions** - Snapshot-based sessions that publish their changes on commit
//!
//! # Quick Start
//!
//! ```ignore
//! use docmap::{bson::oid::ObjectId, memory::MemoryBackend, prelude::*};
//!
//! #[derive(Debug, Clone, Bean)]
//! pub struct User {
//!     #[bean(id)]
//!     pub id: Option<ObjectId>,
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let datastore = Datastore::builder(MemoryBackend::new()).build()?;
//!     let users = DataTarget::named("users");
//!
//!     let user = User { id: None, name: "Alice".to_string() };
//!     datastore.operations().insert_bean(&users, &user).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap_memory;

mod evaluator;
mod pipeline;
pub mod store;
mod update;

pub use store::{MemoryBackend, MemoryBackendBuilder, MemorySession};
