//! The context expressions are resolved in.
//!
//! A [`ResolutionContext`] carries the resolver registry, the identifier handler and the
//! enum encoding strategy. When resolving expressions that belong to a specific document
//! shape, [`ResolutionContext::for_document`] derives a child context that also knows the
//! [`PropertySet`] in scope and which of its properties maps to `_id`.

use std::{any::type_name, sync::Arc};

use bson::Document;
use tracing::trace;

use crate::{
    error::{DatastoreError, DatastoreResult},
    expression::{DocumentValue, Expression, PropertyBoxValue},
    id::{DefaultDocumentIdResolver, DocumentIdHandler, DocumentIdResolver},
    path::Path,
    property::{Property, PropertyBox, PropertySet},
    resolver::{Resolver, ResolverRegistry},
    value::EnumCodecStrategy,
};

/// The document shape in scope for a resolution.
#[derive(Debug, Clone)]
pub struct DocumentContext {
    property_set: PropertySet,
    id_property: Option<Property>,
}

impl DocumentContext {
    pub fn property_set(&self) -> &PropertySet {
        &self.property_set
    }

    /// The property mapped to the `_id` field, if any.
    pub fn id_property(&self) -> Option<&Property> {
        self.id_property.as_ref()
    }

    /// Whether the path denotes the identifier property.
    pub fn is_id_path(&self, path: &Path) -> bool {
        self.id_property.as_ref().is_some_and(|p| p.path() == path)
    }

    /// The declared property at the given path.
    pub fn property(&self, path: &Path) -> Option<&Property> {
        self.property_set.get_path(path)
    }
}

/// Shared state for a chain of resolutions.
///
/// Contexts are cheap to clone; deriving a child context never alters its parent.
#[derive(Debug, Clone)]
pub struct ResolutionContext {
    registry: Arc<ResolverRegistry>,
    id_handler: DocumentIdHandler,
    id_resolver: Arc<dyn DocumentIdResolver>,
    enum_strategy: EnumCodecStrategy,
    document: Option<Arc<DocumentContext>>,
}

impl Default for ResolutionContext {
    fn default() -> Self {
        ResolutionContext::builder().build()
    }
}

impl ResolutionContext {
    pub fn builder() -> ResolutionContextBuilder {
        ResolutionContextBuilder::default()
    }

    pub fn registry(&self) -> &ResolverRegistry {
        &self.registry
    }

    pub fn document_id_handler(&self) -> &DocumentIdHandler {
        &self.id_handler
    }

    pub fn document_id_resolver(&self) -> &dyn DocumentIdResolver {
        self.id_resolver.as_ref()
    }

    pub fn enum_codec_strategy(&self) -> EnumCodecStrategy {
        self.enum_strategy
    }

    /// The document shape in scope, if this is a document context.
    pub fn document_context(&self) -> Option<&DocumentContext> {
        self.document.as_deref()
    }

    /// Derives a document context for the given property set, resolving its identifier.
    ///
    /// # Errors
    ///
    /// Fails with [`DatastoreError::InvalidDocumentIdentifier`] if the identifier property
    /// cannot be determined unambiguously.
    pub fn for_document(&self, set: &PropertySet) -> DatastoreResult<ResolutionContext> {
        let id_property = self
            .id_resolver
            .resolve_document_id_property(set, &self.id_handler)?;

        trace!(
            properties = set.len(),
            id = id_property.as_ref().map(Property::name),
            "deriving document context"
        );

        Ok(self.scoped(set, id_property))
    }

    /// Derives a context for a document embedded in another one; embedded documents have
    /// no identifier mapping.
    pub fn for_embedded(&self, set: &PropertySet) -> ResolutionContext {
        self.scoped(set, None)
    }

    fn scoped(&self, set: &PropertySet, id_property: Option<Property>) -> ResolutionContext {
        ResolutionContext {
            document: Some(Arc::new(DocumentContext {
                property_set: set.clone(),
                id_property,
            })),
            ..self.clone()
        }
    }

    /// Derives a context with additional resolvers; the parent's registry is copied, not
    /// shared.
    pub fn with_resolvers(
        &self,
        resolvers: impl IntoIterator<Item = Resolver>,
    ) -> DatastoreResult<ResolutionContext> {
        let mut registry = ResolverRegistry::clone(&self.registry);
        for resolver in resolvers {
            registry.register(resolver)?;
        }

        Ok(ResolutionContext {
            registry: Arc::new(registry),
            ..self.clone()
        })
    }

    /// Validates the expression, then asks each matching resolver in priority order.
    ///
    /// Returns `Ok(None)` when no resolver produced a result.
    pub fn resolve<R: Expression, E: Expression>(&self, expression: &E) -> DatastoreResult<Option<R>> {
        expression.validate()?;

        for resolver in self.registry.candidates::<E, R>() {
            if let Some(resolved) = resolver.resolve_erased(expression, self)? {
                trace!(resolver = resolver.name(), output = type_name::<R>(), "expression resolved");
                return resolved
                    .downcast::<R>()
                    .map(|resolved| Some(*resolved))
                    .map_err(|_| DatastoreError::resolution(expression, type_name::<R>()));
            }
        }

        Ok(None)
    }

    /// Like [`resolve`](Self::resolve), failing with [`DatastoreError::Resolution`] when
    /// nothing resolves.
    pub fn resolve_or_fail<R: Expression, E: Expression>(&self, expression: &E) -> DatastoreResult<R> {
        self.resolve(expression)?
            .ok_or_else(|| DatastoreError::resolution(expression, type_name::<R>()))
    }

    /// Encodes a property box into a document.
    pub fn encode_property_box(&self, value: &PropertyBox) -> DatastoreResult<Document> {
        self.resolve_or_fail::<DocumentValue, _>(&PropertyBoxValue(value.clone()))
            .map(|document| document.0)
    }

    /// Decodes a document into a property box shaped by the given set.
    pub fn decode_document(&self, document: &Document, set: &PropertySet) -> DatastoreResult<PropertyBox> {
        self.for_document(set)?
            .resolve_or_fail::<PropertyBoxValue, _>(&DocumentValue(document.clone()))
            .map(|value| value.0)
    }
}

/// Assembles a [`ResolutionContext`].
#[derive(Debug, Default)]
pub struct ResolutionContextBuilder {
    registry: Option<ResolverRegistry>,
    id_resolver: Option<Arc<dyn DocumentIdResolver>>,
    enum_strategy: EnumCodecStrategy,
}

impl ResolutionContextBuilder {
    /// Replaces the registry; defaults to [`ResolverRegistry::with_defaults`].
    pub fn registry(mut self, registry: ResolverRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn document_id_resolver(mut self, resolver: Arc<dyn DocumentIdResolver>) -> Self {
        self.id_resolver = Some(resolver);
        self
    }

    pub fn enum_codec_strategy(mut self, strategy: EnumCodecStrategy) -> Self {
        self.enum_strategy = strategy;
        self
    }

    pub fn build(self) -> ResolutionContext {
        ResolutionContext {
            registry: Arc::new(self.registry.unwrap_or_else(ResolverRegistry::with_defaults)),
            id_handler: DocumentIdHandler,
            id_resolver: self
                .id_resolver
                .unwrap_or_else(|| Arc::new(DefaultDocumentIdResolver)),
            enum_strategy: self.enum_strategy,
            document: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{expression::FieldName, value::PropertyType};

    #[test]
    fn document_context_is_scoped() {
        let root = ResolutionContext::default();
        let set = PropertySet::new([
            Property::named("code", PropertyType::String).identifier(),
            Property::named("name", PropertyType::String),
        ]);

        let scoped = root.for_document(&set).unwrap();

        assert!(root.document_context().is_none());
        let document = scoped.document_context().unwrap();
        assert_eq!(document.id_property().map(Property::name), Some("code".to_string()));
        assert!(document.is_id_path(&Path::new("code")));
        assert!(!document.is_id_path(&Path::new("name")));
    }

    #[test]
    fn embedded_context_has_no_identifier() {
        let set = PropertySet::new([Property::named("oid", PropertyType::ObjectId)]);
        let embedded = ResolutionContext::default().for_embedded(&set);

        assert!(embedded.document_context().unwrap().id_property().is_none());
    }

    #[test]
    fn with_resolvers_leaves_parent_untouched() {
        let root = ResolutionContext::builder().registry(ResolverRegistry::new()).build();
        let derived = root
            .with_resolvers([Resolver::from_fn("upper", 1, |name: &FieldName, _| {
                Ok(Some(FieldName(name.0.to_uppercase())))
            })])
            .unwrap();

        assert!(root.registry().is_empty());
        assert_eq!(
            derived.resolve_or_fail::<FieldName, _>(&FieldName::new("a")).unwrap(),
            FieldName::new("A")
        );
    }

    #[test]
    fn invalid_expressions_fail_before_resolution() {
        let context = ResolutionContext::default();

        assert!(matches!(
            context.resolve::<Path, _>(&FieldName::new("a..b")),
            Err(DatastoreError::InvalidExpression(_))
        ));
    }
}
