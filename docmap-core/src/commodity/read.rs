use bson::{Bson, Document};
use tracing::debug;

use crate::{
    aggregation::Aggregation,
    backend::{AggregateRequest, CountRequest, DatastoreBackend, DistinctRequest, FindRequest},
    context::ResolutionContext,
    error::{DatastoreError, DatastoreResult},
    expression::{BsonExpression, BsonFieldValue, DataTarget, FieldName, FieldValue},
    property::{Property, PropertyBox, PropertySet},
    query::{Projection, Query, QueryFilter, QueryOptions, QuerySort},
    value::{PropertyType, Value},
};

use super::{Operations, TRACE_TARGET, decode_all, decode_one, identifier_filter, resolve_document, resolve_optional};

impl<B: DatastoreBackend> Operations<'_, B> {
    /// Runs a query, returning the matching values decoded against `set`.
    ///
    /// Only the properties of `set` are projected.
    pub async fn query(
        &mut self,
        target: &DataTarget,
        set: &PropertySet,
        query: &Query,
    ) -> DatastoreResult<Vec<PropertyBox>> {
        let (context, documents) = self.fetch(target, set, query).await?;
        decode_all(&context, documents)
    }

    /// Runs a query expected to match at most one document.
    ///
    /// # Errors
    ///
    /// Fails with [`DatastoreError::DataAccess`] when more than one document matches.
    pub async fn query_one(
        &mut self,
        target: &DataTarget,
        set: &PropertySet,
        query: &Query,
    ) -> DatastoreResult<Option<PropertyBox>> {
        let mut query = query.clone();
        query.limit = Some(2);

        let (context, mut documents) = self.fetch(target, set, &query).await?;
        if documents.len() > 1 {
            return Err(DatastoreError::DataAccess(format!(
                "Query on {} returned more than one document",
                target.name()
            )));
        }

        documents
            .pop()
            .map(|document| decode_one(&context, document))
            .transpose()
    }

    /// Looks a value up by its identifier.
    pub async fn find_by_id(
        &mut self,
        target: &DataTarget,
        set: &PropertySet,
        id: impl Into<Value>,
    ) -> DatastoreResult<Option<PropertyBox>> {
        let context = self.document_context(set)?;
        let Some(property) = context.document_context().and_then(|d| d.id_property()).cloned() else {
            return Err(DatastoreError::InvalidDocumentIdentifier(
                "The property set declares no document identifier".to_string(),
            ));
        };
        let probe = PropertyBox::builder(set.clone())
            .set(property.name(), id)
            .build()?;
        let filter = identifier_filter(&context, &probe)?;

        let collection = self.collection(target)?;
        let projection = resolve_document(&context, &Projection(set.clone()))?;
        self.trace("find_by_id", &collection, filter.as_ref(), None, Some(&projection));
        let request = FindRequest {
            collection,
            filter,
            projection: Some(projection),
            limit: Some(1),
            read: self.read_options(),
            ..Default::default()
        };
        let mut documents = self.backend().find(request, self.session()).await?;

        documents
            .pop()
            .map(|document| decode_one(&context, document))
            .transpose()
    }

    /// Counts the documents a query matches, honouring its offset and limit.
    pub async fn count(&mut self, target: &DataTarget, set: &PropertySet, query: &Query) -> DatastoreResult<u64> {
        let collection = self.collection(target)?;
        let context = self.document_context(set)?;
        let filter = resolve_optional(&context, query.filter.as_ref())?;

        self.trace("count", &collection, filter.as_ref(), None, None);
        let request = CountRequest {
            collection,
            filter,
            skip: query.offset,
            limit: query.limit,
            read: self.read_options(),
        };

        self.backend().count(request, self.session()).await
    }

    /// The distinct values of a property among the documents matching the filter.
    pub async fn distinct(
        &mut self,
        target: &DataTarget,
        set: &PropertySet,
        property: &Property,
        filter: Option<&QueryFilter>,
    ) -> DatastoreResult<Vec<Value>> {
        let collection = self.collection(target)?;
        let context = self.document_context(set)?;
        let filter = resolve_optional(&context, filter)?;
        let field: FieldName = context.resolve_or_fail(property.path())?;

        self.trace("distinct", &collection, filter.as_ref(), None, None);
        let request = DistinctRequest {
            collection,
            field: field.0,
            filter,
            read: self.read_options(),
        };
        let values = self.backend().distinct(request, self.session()).await?;

        // Distinct unwinds arrays, so array properties yield their elements.
        let element = match property.property_type() {
            PropertyType::Array(element) => Property::new(property.path().clone(), element.as_ref().clone()),
            _ => property.clone(),
        };

        values
            .into_iter()
            .map(|value| {
                context
                    .resolve_or_fail::<FieldValue, _>(&BsonFieldValue::new(value, element.clone()))
                    .map(|field| field.value)
            })
            .collect()
    }

    /// Runs an aggregation pipeline, decoding the output documents against `set`.
    pub async fn aggregate(
        &mut self,
        target: &DataTarget,
        set: &PropertySet,
        aggregation: &Aggregation,
    ) -> DatastoreResult<Vec<PropertyBox>> {
        let (context, documents) = self.pipeline(target, set, aggregation).await?;
        decode_all(&context, documents)
    }

    /// Runs an aggregation pipeline, returning the raw output documents.
    pub async fn aggregate_documents(
        &mut self,
        target: &DataTarget,
        set: &PropertySet,
        aggregation: &Aggregation,
    ) -> DatastoreResult<Vec<Document>> {
        self.pipeline(target, set, aggregation)
            .await
            .map(|(_, documents)| documents)
    }

    /// Resolves and runs a find, leaving decoding to the caller.
    pub(crate) async fn fetch(
        &mut self,
        target: &DataTarget,
        set: &PropertySet,
        query: &Query,
    ) -> DatastoreResult<(ResolutionContext, Vec<Document>)> {
        let collection = self.collection(target)?;
        let context = self.document_context(set)?;
        let filter = resolve_optional(&context, query.filter.as_ref())?;
        let sort = if query.sorts.is_empty() {
            None
        } else {
            Some(resolve_document(&context, &QuerySort(query.sorts.clone()))?)
        };
        let projection = resolve_document(&context, &Projection(set.clone()))?;

        self.trace("query", &collection, filter.as_ref(), sort.as_ref(), Some(&projection));
        let request = FindRequest {
            collection,
            filter,
            sort,
            projection: Some(projection),
            skip: query.offset,
            limit: query.limit,
            options: query.options.clone(),
            read: self.read_options(),
        };
        let documents = self.backend().find(request, self.session()).await?;

        Ok((context, documents))
    }

    /// Resolves and runs an aggregation pipeline, returning the document context it was
    /// resolved in along with the raw output.
    pub(crate) async fn pipeline(
        &mut self,
        target: &DataTarget,
        set: &PropertySet,
        aggregation: &Aggregation,
    ) -> DatastoreResult<(ResolutionContext, Vec<Document>)> {
        let context = self.document_context(set)?;
        let documents = self.run_pipeline(target, &context, aggregation).await?;
        Ok((context, documents))
    }

    async fn run_pipeline(
        &mut self,
        target: &DataTarget,
        context: &ResolutionContext,
        aggregation: &Aggregation,
    ) -> DatastoreResult<Vec<Document>> {
        let collection = self.collection(target)?;
        let pipeline = match context.resolve_or_fail::<BsonExpression, _>(aggregation)?.into_value() {
            Bson::Array(stages) => stages
                .into_iter()
                .map(|stage| match stage {
                    Bson::Document(stage) => Ok(stage),
                    other => Err(DatastoreError::Serialization(format!(
                        "Pipeline stage is not a document: {other}"
                    ))),
                })
                .collect::<DatastoreResult<Vec<_>>>()?,
            other => {
                return Err(DatastoreError::Serialization(format!(
                    "Aggregation did not resolve into a pipeline: {other}"
                )));
            }
        };

        if self.datastore.is_trace_enabled() {
            let rendered = Bson::Array(pipeline.iter().cloned().map(Bson::Document).collect());
            debug!(
                target: TRACE_TARGET,
                operation = "aggregate",
                collection = %collection,
                pipeline = %rendered,
                "resolved operation"
            );
        }

        let request = AggregateRequest {
            collection,
            pipeline,
            options: QueryOptions::default(),
            read: self.read_options(),
        };

        self.backend().aggregate(request, self.session()).await
    }
}
