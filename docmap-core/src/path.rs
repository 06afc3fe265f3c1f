//! Hierarchical document paths and their dot-joined field-name form.
//!
//! A [`Path`] names a field inside a document schema. Nested (embedded document) fields
//! are expressed by chaining paths through their parent:
//!
//! ```ignore
//! use docmap::path::Path;
//!
//! let street = Path::new("address").child("street");
//! assert_eq!(street.full_name(), "address.street");
//! assert_eq!(street.relative_name(), "street");
//! ```

use std::{fmt, sync::Arc};

use crate::error::{DatastoreError, DatastoreResult};

/// Separator between the segments of a field name.
pub const PATH_SEPARATOR: char = '.';

/// A named, optionally nested, location inside a document.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Path {
    name: String,
    parent: Option<Arc<Path>>,
}

impl Path {
    /// Creates a root path with a single segment.
    pub fn new(name: impl Into<String>) -> Self {
        Path {
            name: name.into(),
            parent: None,
        }
    }

    /// Creates a path nested below this one.
    pub fn child(&self, name: impl Into<String>) -> Self {
        Path {
            name: name.into(),
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// Parses a dot-joined field name into a chain of single-segment paths.
    ///
    /// # Errors
    ///
    /// Fails with [`DatastoreError::InvalidExpression`] if the name is empty or contains an
    /// empty segment (leading, trailing or consecutive separators).
    pub fn parse(field_name: &str) -> DatastoreResult<Self> {
        let mut path: Option<Path> = None;

        for segment in field_name.split(PATH_SEPARATOR) {
            if segment.is_empty() {
                return Err(DatastoreError::InvalidExpression(format!(
                    "Field name '{field_name}' contains an empty segment"
                )));
            }
            path = Some(match path {
                Some(parent) => parent.child(segment),
                None => Path::new(segment),
            });
        }

        path.ok_or_else(|| DatastoreError::InvalidExpression("Empty field name".to_string()))
    }

    /// The last segment of this path.
    pub fn relative_name(&self) -> &str {
        &self.name
    }

    /// The parent path, if this path is nested.
    pub fn parent(&self) -> Option<&Path> {
        self.parent.as_deref()
    }

    /// Whether this path has no parent.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// The dot-joined name of the whole parent chain.
    pub fn full_name(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{}{}{}", parent.full_name(), PATH_SEPARATOR, self.name),
            None => self.name.clone(),
        }
    }

    /// The segments of this path, root first.
    pub fn segments(&self) -> Vec<&str> {
        let mut segments = match &self.parent {
            Some(parent) => parent.segments(),
            None => Vec::new(),
        };
        segments.push(&self.name);
        segments
    }

    /// Checks that every segment is non-empty and free of separators.
    pub fn validate(&self) -> DatastoreResult<()> {
        for segment in self.segments() {
            if segment.is_empty() || segment.contains(PATH_SEPARATOR) {
                return Err(DatastoreError::InvalidExpression(format!(
                    "Invalid path segment '{segment}' in '{}'",
                    self.full_name()
                )));
            }
        }

        Ok(())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({})", self.full_name())
    }
}

impl From<&str> for Path {
    /// Builds a root path without splitting on separators; use [`Path::parse`] for
    /// dotted names.
    fn from(name: &str) -> Self {
        Path::new(name)
    }
}

/// Translates a path into its dot-joined field name.
pub fn path_to_field_name(path: &Path) -> String {
    path.full_name()
}

/// Translates a dot-joined field name into a path chain.
pub fn field_name_to_path(field_name: &str) -> DatastoreResult<Path> {
    Path::parse(field_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn nested_path_names() {
        let path = Path::new("a").child("b").child("c");

        assert_eq!(path.full_name(), "a.b.c");
        assert_eq!(path.relative_name(), "c");
        assert_eq!(path.parent().map(Path::full_name), Some("a.b".to_string()));
        assert_eq!(path.segments(), vec!["a", "b", "c"]);
    }

    #[test]
    fn parse_builds_parent_chain() {
        let path = Path::parse("a.b.c").unwrap();

        assert_eq!(path, Path::new("a").child("b").child("c"));
        assert!(!path.is_root());
        assert!(Path::parse("a").unwrap().is_root());
    }

    #[rstest]
    #[case("")]
    #[case(".a")]
    #[case("a.")]
    #[case("a..b")]
    fn parse_rejects_empty_segments(#[case] name: &str) {
        assert!(matches!(
            Path::parse(name),
            Err(DatastoreError::InvalidExpression(_))
        ));
    }

    #[test]
    fn validate_rejects_dotted_segment() {
        assert!(Path::new("a.b").validate().is_err());
        assert!(Path::new("a").child("b").validate().is_ok());
    }

    proptest! {
        #[test]
        fn field_name_round_trips(segments in prop::collection::vec("[a-zA-Z_][a-zA-Z0-9_]{0,8}", 1..6)) {
            let name = segments.join(".");
            let path = field_name_to_path(&name).unwrap();

            prop_assert_eq!(path_to_field_name(&path), name.clone());
            prop_assert_eq!(field_name_to_path(&path_to_field_name(&path)).unwrap(), path);
        }
    }
}
