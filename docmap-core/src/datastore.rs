//! The datastore: a backend, its configuration and the resolution context.
//!
//! ```ignore
//! use docmap::{Datastore, config::DatastoreConfig};
//! use docmap_memory::MemoryBackend;
//!
//! let datastore = Datastore::builder(MemoryBackend::new())
//!     .config(DatastoreConfig { trace: true, ..Default::default() })
//!     .resolver(my_resolver)
//!     .build()?;
//!
//! let key = datastore.operations().insert(&DataTarget::named("people"), &person).await?;
//! ```

use std::sync::Arc;

use bson::Document;
use tracing::info;

use crate::{
    backend::DatastoreBackend,
    bean::Bean,
    blocking::BlockingDatastore,
    commodity::Operations,
    config::{DatastoreConfig, ReadConcern, ReadPreference, WriteConcern},
    context::ResolutionContext,
    error::DatastoreResult,
    expression::Expression,
    id::DocumentIdResolver,
    property::{PropertyBox, PropertySet},
    resolver::{Resolver, ResolverRegistry},
    stream::StreamDatastore,
    unit_of_work::UnitOfWork,
    value::EnumCodecStrategy,
};

/// A configured datastore bound to a backend.
///
/// Cloning is cheap; clones share the backend and the resolver registry.
#[derive(Debug)]
pub struct Datastore<B: DatastoreBackend> {
    backend: Arc<B>,
    config: Arc<DatastoreConfig>,
    context: ResolutionContext,
}

impl<B: DatastoreBackend> Clone for Datastore<B> {
    fn clone(&self) -> Self {
        Datastore {
            backend: self.backend.clone(),
            config: self.config.clone(),
            context: self.context.clone(),
        }
    }
}

impl<B: DatastoreBackend> Datastore<B> {
    pub fn builder(backend: B) -> DatastoreBuilder<B> {
        DatastoreBuilder::new(backend)
    }

    /// A datastore with the default configuration and the built-in resolvers only.
    pub fn new(backend: B) -> DatastoreResult<Self> {
        DatastoreBuilder::new(backend).build()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &DatastoreConfig {
        &self.config
    }

    /// The root resolution context.
    pub fn context(&self) -> &ResolutionContext {
        &self.context
    }

    pub fn default_read_preference(&self) -> Option<ReadPreference> {
        self.config.read_preference
    }

    pub fn default_read_concern(&self) -> Option<ReadConcern> {
        self.config.read_concern
    }

    pub fn default_write_concern(&self) -> Option<&WriteConcern> {
        self.config.write_concern.as_ref()
    }

    pub fn enum_codec_strategy(&self) -> EnumCodecStrategy {
        self.config.enum_codec_strategy
    }

    pub fn is_trace_enabled(&self) -> bool {
        self.config.trace
    }

    /// Resolves an expression in the root context.
    pub fn resolve<R: Expression, E: Expression>(&self, expression: &E) -> DatastoreResult<Option<R>> {
        self.context.resolve(expression)
    }

    pub fn resolve_or_fail<R: Expression, E: Expression>(&self, expression: &E) -> DatastoreResult<R> {
        self.context.resolve_or_fail(expression)
    }

    /// Derives a resolution context scoped to the given property set.
    pub fn document_context(&self, set: &PropertySet) -> DatastoreResult<ResolutionContext> {
        self.context.for_document(set)
    }

    pub fn encode(&self, value: &PropertyBox) -> DatastoreResult<Document> {
        self.context.encode_property_box(value)
    }

    pub fn decode(&self, document: &Document, set: &PropertySet) -> DatastoreResult<PropertyBox> {
        self.context.decode_document(document, set)
    }

    pub fn encode_bean<T: Bean>(&self, bean: &T) -> DatastoreResult<Document> {
        self.encode(&bean.to_property_box()?)
    }

    pub fn decode_bean<T: Bean>(&self, document: &Document) -> DatastoreResult<T> {
        T::from_property_box(&self.decode(document, &T::property_set())?)
    }

    /// Operations running outside any transaction.
    pub fn operations(&self) -> Operations<'_, B> {
        Operations::new(self, None)
    }

    /// Operations bound to the given session.
    pub fn operations_in<'a>(&'a self, session: Option<&'a mut B::Session>) -> Operations<'a, B> {
        Operations::new(self, session)
    }

    /// Starts a unit of work, the scope transactions are tracked in.
    pub fn unit_of_work(&self) -> UnitOfWork<'_, B> {
        UnitOfWork::new(self)
    }
}

/// Assembles a [`Datastore`] from a backend, a configuration and extra resolvers.
#[derive(Debug)]
pub struct DatastoreBuilder<B> {
    backend: B,
    config: DatastoreConfig,
    resolvers: Vec<Resolver>,
    id_resolver: Option<Arc<dyn DocumentIdResolver>>,
}

impl<B: DatastoreBackend> DatastoreBuilder<B> {
    pub fn new(backend: B) -> Self {
        DatastoreBuilder {
            backend,
            config: DatastoreConfig::default(),
            resolvers: Vec::new(),
            id_resolver: None,
        }
    }

    pub fn config(mut self, config: DatastoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn read_preference(mut self, preference: ReadPreference) -> Self {
        self.config.read_preference = Some(preference);
        self
    }

    pub fn read_concern(mut self, concern: ReadConcern) -> Self {
        self.config.read_concern = Some(concern);
        self
    }

    pub fn write_concern(mut self, concern: WriteConcern) -> Self {
        self.config.write_concern = Some(concern);
        self
    }

    pub fn enum_codec_strategy(mut self, strategy: EnumCodecStrategy) -> Self {
        self.config.enum_codec_strategy = strategy;
        self
    }

    pub fn trace(mut self, trace: bool) -> Self {
        self.config.trace = trace;
        self
    }

    /// Registers an additional resolver.
    pub fn resolver(mut self, resolver: Resolver) -> Self {
        self.resolvers.push(resolver);
        self
    }

    pub fn resolvers(mut self, resolvers: impl IntoIterator<Item = Resolver>) -> Self {
        self.resolvers.extend(resolvers);
        self
    }

    /// Replaces the strategy choosing the identifier property of a property set.
    pub fn document_id_resolver(mut self, resolver: Arc<dyn DocumentIdResolver>) -> Self {
        self.id_resolver = Some(resolver);
        self
    }

    /// Builds the datastore.
    ///
    /// # Errors
    ///
    /// Fails with [`DatastoreError::AmbiguousResolver`](crate::error::DatastoreError::AmbiguousResolver)
    /// if two resolvers share input type, output type and priority.
    pub fn build(self) -> DatastoreResult<Datastore<B>> {
        let mut registry = ResolverRegistry::with_defaults();
        for resolver in self.resolvers {
            registry.register(resolver)?;
        }

        let mut context = ResolutionContext::builder()
            .enum_codec_strategy(self.config.enum_codec_strategy);
        if let Some(id_resolver) = self.id_resolver {
            context = context.document_id_resolver(id_resolver);
        }
        let context = context.registry(registry).build();

        info!(
            resolvers = context.registry().len(),
            enum_codec_strategy = ?self.config.enum_codec_strategy,
            trace = self.config.trace,
            "datastore initialized"
        );

        Ok(Datastore {
            backend: Arc::new(self.backend),
            config: Arc::new(self.config),
            context,
        })
    }

    /// Builds a [`BlockingDatastore`] owning its own runtime.
    pub fn build_blocking(self) -> DatastoreResult<BlockingDatastore<B>> {
        BlockingDatastore::new(self.build()?)
    }

    /// Builds a [`StreamDatastore`].
    pub fn build_stream(self) -> DatastoreResult<StreamDatastore<B>> {
        self.build().map(StreamDatastore::new)
    }
}
