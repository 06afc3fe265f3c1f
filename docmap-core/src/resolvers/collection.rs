//! Data target to collection name resolution.

use crate::{
    context::ResolutionContext,
    error::DatastoreResult,
    expression::{CollectionName, DataTarget, Expression},
    resolver::{BUILTIN_PRIORITY, ExpressionResolver},
};

/// Uses the data target name as collection name, validating it.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionNameResolver;

impl ExpressionResolver<DataTarget, CollectionName> for CollectionNameResolver {
    fn resolve(&self, target: &DataTarget, _: &ResolutionContext) -> DatastoreResult<Option<CollectionName>> {
        let name = CollectionName(target.name().to_string());
        name.validate()?;

        Ok(Some(name))
    }

    fn priority(&self) -> i32 {
        BUILTIN_PRIORITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_name_is_validated() {
        let context = ResolutionContext::default();

        let name: CollectionName = context.resolve_or_fail(&DataTarget::named("users")).unwrap();
        assert_eq!(name.as_str(), "users");
        assert!(context.resolve::<CollectionName, _>(&DataTarget::named("system.users")).is_err());
    }
}
