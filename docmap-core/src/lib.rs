//! An expression-driven mapping layer between typed property values and MongoDB documents.
//!
//! This crate is the core of the docmap project and provides:
//!
//! - **Expressions** ([`expression`], [`path`], [`query`], [`update`], [`aggregation`]) -
//!   the immutable vocabulary every operation is described in
//! - **Properties and values** ([`property`], [`value`], [`bean`]) - typed records and the
//!   schemas that shape them
//! - **Resolution** ([`resolver`], [`context`], [`resolvers`]) - the priority-ordered
//!   resolver chain translating expressions into BSON and back
//! - **Document identifiers** ([`id`]) - mapping of the identifier property onto `_id`
//! - **Backends** ([`backend`]) - the driver capability operations are dispatched to
//! - **Transactions** ([`transaction`], [`unit_of_work`]) - the transaction state machine
//!   and explicit transaction scoping
//! - **Datastore** ([`datastore`], [`commodity`], [`blocking`], [`stream`]) - the
//!   operations façade in its async, blocking and stream flavors
//! - **Configuration** ([`config`]) and **errors** ([`error`])
//!
//! # Example
//!
//! ```ignore
//! use docmap::{Datastore, expression::DataTarget, property::{Property, PropertyBox, PropertySet}};
//! use docmap::value::PropertyType;
//!
//! let set = PropertySet::new([
//!     Property::named("id", PropertyType::ObjectId).identifier(),
//!     Property::named("name", PropertyType::String),
//! ]);
//!
//! let datastore = Datastore::new(backend)?;
//! let value = PropertyBox::builder(set).set("name", "Alice").build()?;
//! let result = datastore.operations().insert(&DataTarget::named("people"), &value).await?;
//! let id = result.first_inserted_key();
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap_core;

pub mod aggregation;
pub mod backend;
pub mod bean;
pub mod blocking;
pub mod commodity;
pub mod config;
pub mod context;
pub mod datastore;
pub mod error;
pub mod expression;
pub mod id;
pub mod path;
pub mod property;
pub mod query;
pub mod resolver;
pub mod resolvers;
pub mod stream;
pub mod transaction;
pub mod unit_of_work;
pub mod update;
pub mod value;
