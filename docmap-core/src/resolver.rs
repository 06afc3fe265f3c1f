//! Pluggable, priority-ordered expression resolvers.
//!
//! A resolver translates one [`Expression`] type into another. Resolvers are held by a
//! [`ResolverRegistry`] ordered by ascending priority (lower values are tried first;
//! equal priorities keep registration order). Resolution asks every resolver whose
//! input and output types match, in order, and the first one returning a value wins.
//!
//! # Example
//!
//! ```ignore
//! use docmap::resolver::{Resolver, ResolverRegistry};
//! use docmap::expression::{DataTarget, CollectionName};
//!
//! let prefixed = Resolver::from_fn("tenant-prefix", 10, |target: &DataTarget, _ctx| {
//!     Ok(Some(CollectionName(format!("tenant_{}", target.name()))))
//! });
//!
//! let mut registry = ResolverRegistry::with_defaults();
//! registry.register(prefixed)?;
//! ```

use std::{
    any::{Any, TypeId, type_name},
    fmt,
    marker::PhantomData,
    sync::Arc,
};

use tracing::debug;

use crate::{
    context::ResolutionContext,
    error::{DatastoreError, DatastoreResult},
    expression::Expression,
};

/// Priority assigned to resolvers that do not declare one.
pub const DEFAULT_PRIORITY: i32 = 100;

/// Priority of the built-in resolvers; anything registered at a lower value overrides them.
pub const BUILTIN_PRIORITY: i32 = 1000;

/// Translates expressions of type `E` into expressions of type `R`.
pub trait ExpressionResolver<E: Expression, R: Expression>: Send + Sync + 'static {
    /// Resolves the expression, returning `None` to let the next resolver try.
    fn resolve(&self, expression: &E, context: &ResolutionContext) -> DatastoreResult<Option<R>>;

    /// Lower values are tried first.
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    fn name(&self) -> &'static str {
        type_name::<Self>()
    }
}

trait ErasedResolver: Send + Sync {
    fn resolve_erased(
        &self,
        expression: &dyn Any,
        context: &ResolutionContext,
    ) -> DatastoreResult<Option<Box<dyn Any + Send>>>;
    fn priority(&self) -> i32;
    fn name(&self) -> &'static str;
}

struct Typed<E, R, T> {
    resolver: T,
    _marker: PhantomData<fn(&E) -> R>,
}

impl<E, R, T> ErasedResolver for Typed<E, R, T>
where
    E: Expression,
    R: Expression,
    T: ExpressionResolver<E, R>,
{
    fn resolve_erased(
        &self,
        expression: &dyn Any,
        context: &ResolutionContext,
    ) -> DatastoreResult<Option<Box<dyn Any + Send>>> {
        match expression.downcast_ref::<E>() {
            Some(expression) => Ok(self
                .resolver
                .resolve(expression, context)?
                .map(|resolved| Box::new(resolved) as Box<dyn Any + Send>)),
            None => Ok(None),
        }
    }

    fn priority(&self) -> i32 {
        self.resolver.priority()
    }

    fn name(&self) -> &'static str {
        self.resolver.name()
    }
}

/// A type-erased, shareable resolver together with its type signature.
#[derive(Clone)]
pub struct Resolver {
    input: TypeId,
    output: TypeId,
    input_name: &'static str,
    output_name: &'static str,
    inner: Arc<dyn ErasedResolver>,
}

impl Resolver {
    /// Wraps a typed resolver.
    pub fn new<E, R, T>(resolver: T) -> Self
    where
        E: Expression,
        R: Expression,
        T: ExpressionResolver<E, R>,
    {
        Resolver {
            input: TypeId::of::<E>(),
            output: TypeId::of::<R>(),
            input_name: type_name::<E>(),
            output_name: type_name::<R>(),
            inner: Arc::new(Typed {
                resolver,
                _marker: PhantomData,
            }),
        }
    }

    /// Builds a resolver from a closure.
    pub fn from_fn<E, R, F>(name: &'static str, priority: i32, resolve: F) -> Self
    where
        E: Expression,
        R: Expression,
        F: Fn(&E, &ResolutionContext) -> DatastoreResult<Option<R>> + Send + Sync + 'static,
    {
        Resolver::new(FnResolver {
            name,
            priority,
            resolve,
            _marker: PhantomData,
        })
    }

    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    pub fn priority(&self) -> i32 {
        self.inner.priority()
    }

    pub fn input_type_name(&self) -> &'static str {
        self.input_name
    }

    pub fn output_type_name(&self) -> &'static str {
        self.output_name
    }

    fn matches(&self, input: TypeId, output: TypeId) -> bool {
        self.input == input && self.output == output
    }

    pub(crate) fn resolve_erased(
        &self,
        expression: &dyn Any,
        context: &ResolutionContext,
    ) -> DatastoreResult<Option<Box<dyn Any + Send>>> {
        self.inner.resolve_erased(expression, context)
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("name", &self.name())
            .field("priority", &self.priority())
            .field("input", &self.input_name)
            .field("output", &self.output_name)
            .finish()
    }
}

struct FnResolver<E, R, F> {
    name: &'static str,
    priority: i32,
    resolve: F,
    _marker: PhantomData<fn(&E) -> R>,
}

impl<E, R, F> ExpressionResolver<E, R> for FnResolver<E, R, F>
where
    E: Expression,
    R: Expression,
    F: Fn(&E, &ResolutionContext) -> DatastoreResult<Option<R>> + Send + Sync + 'static,
{
    fn resolve(&self, expression: &E, context: &ResolutionContext) -> DatastoreResult<Option<R>> {
        (self.resolve)(expression, context)
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Ordered collection of resolvers.
#[derive(Debug, Clone, Default)]
pub struct ResolverRegistry {
    resolvers: Vec<Resolver>,
}

impl ResolverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        ResolverRegistry::default()
    }

    /// A registry holding the built-in resolvers.
    pub fn with_defaults() -> Self {
        let mut registry = ResolverRegistry::new();
        for resolver in crate::resolvers::default_resolvers() {
            registry.push(resolver);
        }
        registry
    }

    /// Registers a resolver, keeping the registry ordered by priority.
    ///
    /// # Errors
    ///
    /// Fails with [`DatastoreError::AmbiguousResolver`] if a resolver with the same input
    /// type, output type and priority is already registered.
    pub fn register(&mut self, resolver: Resolver) -> DatastoreResult<()> {
        if let Some(existing) = self.resolvers.iter().find(|r| {
            r.matches(resolver.input, resolver.output) && r.priority() == resolver.priority()
        }) {
            return Err(DatastoreError::AmbiguousResolver(format!(
                "{} and {} both resolve {} into {} at priority {}",
                existing.name(),
                resolver.name(),
                resolver.input_name,
                resolver.output_name,
                resolver.priority()
            )));
        }

        debug!(
            resolver = resolver.name(),
            priority = resolver.priority(),
            input = resolver.input_name,
            output = resolver.output_name,
            "registering expression resolver"
        );
        self.push(resolver);

        Ok(())
    }

    fn push(&mut self, resolver: Resolver) {
        let index = self
            .resolvers
            .partition_point(|r| r.priority() <= resolver.priority());
        self.resolvers.insert(index, resolver);
    }

    /// Resolvers accepting `E` and producing `R`, in resolution order.
    pub fn candidates<E: Expression, R: Expression>(&self) -> impl Iterator<Item = &Resolver> {
        let (input, output) = (TypeId::of::<E>(), TypeId::of::<R>());
        self.resolvers.iter().filter(move |r| r.matches(input, output))
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resolver> {
        self.resolvers.iter()
    }
}
