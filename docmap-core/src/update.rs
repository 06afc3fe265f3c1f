//! Update operator expressions (`$set`, `$unset`, `$inc`, ...).
//!
//! Builder methods take dotted field names: `Update::new().set("address.city", "Rome")`.

use crate::{
    error::{DatastoreError, DatastoreResult},
    expression::Expression,
    path::Path,
    query::parsed,
    value::Value,
};

/// A single update operator applied to a path.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOperation {
    Set(Path, Value),
    Unset(Path),
    Increment(Path, Value),
    Push(Path, Value),
    AddToSet(Path, Value),
    Pull(Path, Value),
    Rename(Path, Path),
    CurrentDate(Path),
}

impl UpdateOperation {
    pub fn path(&self) -> &Path {
        match self {
            UpdateOperation::Set(path, _)
            | UpdateOperation::Unset(path)
            | UpdateOperation::Increment(path, _)
            | UpdateOperation::Push(path, _)
            | UpdateOperation::AddToSet(path, _)
            | UpdateOperation::Pull(path, _)
            | UpdateOperation::Rename(path, _)
            | UpdateOperation::CurrentDate(path) => path,
        }
    }

    /// The MongoDB operator this operation is grouped under.
    pub fn operator(&self) -> &'static str {
        match self {
            UpdateOperation::Set(..) => "$set",
            UpdateOperation::Unset(..) => "$unset",
            UpdateOperation::Increment(..) => "$inc",
            UpdateOperation::Push(..) => "$push",
            UpdateOperation::AddToSet(..) => "$addToSet",
            UpdateOperation::Pull(..) => "$pull",
            UpdateOperation::Rename(..) => "$rename",
            UpdateOperation::CurrentDate(..) => "$currentDate",
        }
    }
}

/// An ordered list of update operations, resolved into a single update document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Update(pub Vec<UpdateOperation>);

impl Update {
    pub fn new() -> Self {
        Update::default()
    }

    pub fn set(mut self, path: impl AsRef<str>, value: impl Into<Value>) -> Self {
        self.0.push(UpdateOperation::Set(parsed(path), value.into()));
        self
    }

    pub fn unset(mut self, path: impl AsRef<str>) -> Self {
        self.0.push(UpdateOperation::Unset(parsed(path)));
        self
    }

    pub fn increment(mut self, path: impl AsRef<str>, by: impl Into<Value>) -> Self {
        self.0.push(UpdateOperation::Increment(parsed(path), by.into()));
        self
    }

    pub fn push(mut self, path: impl AsRef<str>, value: impl Into<Value>) -> Self {
        self.0.push(UpdateOperation::Push(parsed(path), value.into()));
        self
    }

    pub fn add_to_set(mut self, path: impl AsRef<str>, value: impl Into<Value>) -> Self {
        self.0.push(UpdateOperation::AddToSet(parsed(path), value.into()));
        self
    }

    pub fn pull(mut self, path: impl AsRef<str>, value: impl Into<Value>) -> Self {
        self.0.push(UpdateOperation::Pull(parsed(path), value.into()));
        self
    }

    pub fn rename(mut self, path: impl AsRef<str>, to: impl AsRef<str>) -> Self {
        self.0.push(UpdateOperation::Rename(parsed(path), parsed(to)));
        self
    }

    pub fn current_date(mut self, path: impl AsRef<str>) -> Self {
        self.0.push(UpdateOperation::CurrentDate(parsed(path)));
        self
    }
}

impl Expression for Update {
    fn validate(&self) -> DatastoreResult<()> {
        if self.0.is_empty() {
            return Err(DatastoreError::InvalidExpression(
                "Update requires at least one operation".to_string(),
            ));
        }

        for operation in &self.0 {
            operation.path().validate()?;
            match operation {
                UpdateOperation::Increment(path, value) => {
                    if !matches!(value, Value::Integer(_) | Value::Long(_) | Value::Double(_)) {
                        return Err(DatastoreError::InvalidExpression(format!(
                            "Increment of '{path}' requires a numeric value"
                        )));
                    }
                }
                UpdateOperation::Rename(_, to) => to.validate()?,
                _ => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation() {
        assert!(Update::new().validate().is_err());
        assert!(Update::new().increment("count", "x").validate().is_err());
        assert!(Update::new().increment("count", 1).set("name", "a").validate().is_ok());
    }
}
