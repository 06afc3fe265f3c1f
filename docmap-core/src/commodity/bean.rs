use crate::{
    backend::DatastoreBackend,
    bean::Bean,
    error::DatastoreResult,
    expression::DataTarget,
    query::Query,
    value::Value,
};

use super::{OperationResult, Operations};

/// Bean flavours of the property box operations.
impl<B: DatastoreBackend> Operations<'_, B> {
    pub async fn insert_bean<T: Bean>(&mut self, target: &DataTarget, bean: &T) -> DatastoreResult<OperationResult> {
        self.insert(target, &bean.to_property_box()?).await
    }

    pub async fn update_bean<T: Bean>(&mut self, target: &DataTarget, bean: &T) -> DatastoreResult<OperationResult> {
        self.update(target, &bean.to_property_box()?).await
    }

    pub async fn save_bean<T: Bean>(&mut self, target: &DataTarget, bean: &T) -> DatastoreResult<OperationResult> {
        self.save(target, &bean.to_property_box()?).await
    }

    pub async fn delete_bean<T: Bean>(&mut self, target: &DataTarget, bean: &T) -> DatastoreResult<OperationResult> {
        self.delete(target, &bean.to_property_box()?).await
    }

    pub async fn query_beans<T: Bean>(&mut self, target: &DataTarget, query: &Query) -> DatastoreResult<Vec<T>> {
        self.query(target, &T::property_set(), query)
            .await?
            .iter()
            .map(T::from_property_box)
            .collect()
    }

    pub async fn query_one_bean<T: Bean>(&mut self, target: &DataTarget, query: &Query) -> DatastoreResult<Option<T>> {
        self.query_one(target, &T::property_set(), query)
            .await?
            .as_ref()
            .map(T::from_property_box)
            .transpose()
    }

    pub async fn find_bean_by_id<T: Bean>(
        &mut self,
        target: &DataTarget,
        id: impl Into<Value>,
    ) -> DatastoreResult<Option<T>> {
        self.find_by_id(target, &T::property_set(), id)
            .await?
            .as_ref()
            .map(T::from_property_box)
            .transpose()
    }
}
