//! Dotted field paths and how update paths line up with declared key paths.

use std::fmt;

use serde_json::Value;

use crate::error::{DocumentError, DocumentResult};

/// An ordered, non-empty list of field names locating a value inside a
/// (possibly nested) document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyPath(Vec<String>);

impl KeyPath {
    /// Parse a dotted path such as `address.city`.
    pub fn parse(dotted: &str) -> DocumentResult<Self> {
        Self::new(dotted.split('.').map(str::to_owned).collect())
    }

    /// Build a path from its segments.
    pub fn new(segments: Vec<String>) -> DocumentResult<Self> {
        if segments.is_empty() || segments.iter().any(String::is_empty) {
            return Err(DocumentError::InvalidKeyPath(segments.join(".")));
        }
        Ok(Self(segments))
    }

    /// The path segments, outermost first.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// The top-level field name.
    #[must_use]
    pub fn head(&self) -> &str {
        &self.0[0]
    }

    /// Returns `true` if `prefix` is this path or one of its ancestors.
    #[must_use]
    pub fn starts_with(&self, prefix: &KeyPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Look the path up in a document.
    #[must_use]
    pub fn resolve<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        resolve(document, &self.0)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl TryFrom<String> for KeyPath {
    type Error = DocumentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<KeyPath> for String {
    fn from(value: KeyPath) -> Self {
        value.to_string()
    }
}

/// Walk `segments` down through nested objects. Missing fields, and
/// descending into anything that is not an object, yield `None`.
#[must_use]
pub fn resolve<'a>(value: &'a Value, segments: &[String]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

/// How an update path relates to a declared key path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMatch<'a> {
    /// The update addresses the key field itself.
    Exact(&'a KeyPath),
    /// The update replaces an object containing the key field; the key value
    /// sits at `residual` inside the new value.
    Ancestor {
        /// The matching update path.
        update: &'a KeyPath,
        /// Remaining declared segments below the update path.
        residual: &'a [String],
    },
    /// The update addresses a sub-field below the key field.
    Descendant {
        /// The matching update path.
        update: &'a KeyPath,
        /// Remaining update segments below the declared path.
        residual: &'a [String],
    },
}

impl<'a> PathMatch<'a> {
    /// The update path that produced the match.
    #[must_use]
    pub fn update_path(&self) -> &'a KeyPath {
        match *self {
            Self::Exact(update)
            | Self::Ancestor { update, .. }
            | Self::Descendant { update, .. } => update,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Exact(_) => 0,
            Self::Ancestor { .. } => 1,
            Self::Descendant { .. } => 2,
        }
    }
}

/// Find the update path that touches `declared`.
///
/// Exact matches win over ancestors, and ancestors over descendants.
#[must_use]
pub fn match_path<'a, I>(update_paths: I, declared: &'a KeyPath) -> Option<PathMatch<'a>>
where
    I: IntoIterator<Item = &'a KeyPath>,
{
    update_paths
        .into_iter()
        .filter_map(|update| {
            if update == declared {
                Some(PathMatch::Exact(update))
            } else if declared.starts_with(update) {
                Some(PathMatch::Ancestor {
                    update,
                    residual: &declared.segments()[update.segments().len()..],
                })
            } else if update.starts_with(declared) {
                Some(PathMatch::Descendant {
                    update,
                    residual: &update.segments()[declared.segments().len()..],
                })
            } else {
                None
            }
        })
        .min_by_key(PathMatch::rank)
}

/// Returns `true` if one path is the other or an ancestor of it.
#[must_use]
pub fn paths_overlap(a: &KeyPath, b: &KeyPath) -> bool {
    a.starts_with(b) || b.starts_with(a)
}
