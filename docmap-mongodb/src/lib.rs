//! MongoDB backend implementation for docmap.
//!
//! This crate provides a MongoDB-based implementation of the `DatastoreBackend` trait.
//! Resolved filters, updates and pipelines are handed to the official async driver as
//! they are, and datastore transactions map onto driver sessions.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docmap = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Persistent storage** - Data is persisted to MongoDB Atlas or self-hosted MongoDB
//! - **Transactions** - Multi-document transactions through explicit client sessions
//! - **Consistency settings** - Read preference, read concern and write concern per operation
//! - **Query options** - Collation, index hints, batch sizes and cursor types are forwarded
//!
//! # Example
//!
//! ```ignore
//! use docmap::{Datastore, backend::DatastoreBackendBuilder, mongodb::MongoBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = MongoBackend::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!     let datastore = Datastore::builder(backend).build()?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap_mongodb;

mod options;
pub mod store;

pub use store::{MongoBackend, MongoBackendBuilder, MongoSession};
