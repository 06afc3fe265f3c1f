//! Path and field name translation.

use crate::{
    context::ResolutionContext,
    error::DatastoreResult,
    expression::FieldName,
    id::ID_FIELD_NAME,
    path::{Path, field_name_to_path, path_to_field_name},
    resolver::{BUILTIN_PRIORITY, ExpressionResolver},
};

/// Resolves a [`Path`] into its field name; the identifier property maps to `_id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathFieldNameResolver;

impl ExpressionResolver<Path, FieldName> for PathFieldNameResolver {
    fn resolve(&self, path: &Path, context: &ResolutionContext) -> DatastoreResult<Option<FieldName>> {
        if context.document_context().is_some_and(|d| d.is_id_path(path)) {
            return Ok(Some(FieldName::new(ID_FIELD_NAME)));
        }

        Ok(Some(FieldName(path_to_field_name(path))))
    }

    fn priority(&self) -> i32 {
        BUILTIN_PRIORITY
    }
}

/// Resolves a field name into a [`Path`]; `_id` maps back to the identifier property.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldNamePathResolver;

impl ExpressionResolver<FieldName, Path> for FieldNamePathResolver {
    fn resolve(&self, name: &FieldName, context: &ResolutionContext) -> DatastoreResult<Option<Path>> {
        if name.as_str() == ID_FIELD_NAME {
            if let Some(property) = context.document_context().and_then(|d| d.id_property()) {
                return Ok(Some(property.path().clone()));
            }
        }

        field_name_to_path(name.as_str()).map(Some)
    }

    fn priority(&self) -> i32 {
        BUILTIN_PRIORITY
    }
}
