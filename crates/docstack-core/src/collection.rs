//! Collections, their table layout and their secondary access patterns.
//!
//! A collection is declared once and never changes afterwards. It knows how
//! to lay a document out as a store item: the primary key, the wrapped
//! document body and one composite key per index attribute.

use std::collections::HashMap;
use std::sync::Arc;

use docstack_model::{AttributeValue, Item};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::composite::{self, CompositeKey, KeyPart, KeyRole};
use crate::config::DocumentConfig;
use crate::error::{DocumentError, DocumentResult};
use crate::keypath::KeyPath;
use crate::marshal::{from_attribute, to_attribute};

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// A secondary index on the shared table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexLayout {
    /// Index name.
    pub name: String,
    /// Item attribute holding the index partition key.
    pub partition_attr: String,
    /// Item attribute holding the index sort key, if the index has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_attr: Option<String>,
}

impl IndexLayout {
    /// An index with a partition key only.
    #[must_use]
    pub fn new(name: impl Into<String>, partition_attr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_attr: partition_attr.into(),
            sort_attr: None,
        }
    }

    /// Add a sort key attribute.
    #[must_use]
    pub fn with_sort_attr(mut self, sort_attr: impl Into<String>) -> Self {
        self.sort_attr = Some(sort_attr.into());
        self
    }
}

/// Key attributes of the shared table and its indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableLayout {
    /// Item attribute holding the primary partition key.
    pub partition_attr: String,
    /// Item attribute holding the primary sort key.
    pub sort_attr: String,
    /// Secondary indexes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexLayout>,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            partition_attr: "pk".to_owned(),
            sort_attr: "sk".to_owned(),
            indexes: Vec::new(),
        }
    }
}

impl TableLayout {
    /// Add a secondary index.
    #[must_use]
    pub fn with_index(mut self, index: IndexLayout) -> Self {
        self.indexes.push(index);
        self
    }

    /// Look up an index by name.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexLayout> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

// ---------------------------------------------------------------------------
// Access patterns
// ---------------------------------------------------------------------------

/// A secondary access pattern: which document fields feed which index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPattern {
    /// The index the derived keys are written for.
    pub index_name: String,
    /// Fields forming the index partition key, in order.
    pub partition_key_paths: Vec<KeyPath>,
    /// Fields forming the index sort key, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort_key_paths: Vec<KeyPath>,
}

impl AccessPattern {
    /// Build a pattern from dotted field paths.
    pub fn new(
        index_name: impl Into<String>,
        partition_key_paths: &[&str],
        sort_key_paths: &[&str],
    ) -> DocumentResult<Self> {
        let parse = |paths: &[&str]| {
            paths
                .iter()
                .map(|p| KeyPath::parse(p))
                .collect::<DocumentResult<Vec<_>>>()
        };
        Ok(Self {
            index_name: index_name.into(),
            partition_key_paths: parse(partition_key_paths)?,
            sort_key_paths: parse(sort_key_paths)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// A named set of documents sharing one table layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    /// Collection name; the first segment of every key.
    pub name: String,
    /// Table and index key attributes.
    #[serde(default)]
    pub layout: TableLayout,
    /// Secondary access patterns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_patterns: Vec<AccessPattern>,
}

impl Collection {
    /// A collection with no access patterns.
    #[must_use]
    pub fn new(name: impl Into<String>, layout: TableLayout) -> Self {
        Self {
            name: name.into(),
            layout,
            access_patterns: Vec::new(),
        }
    }

    /// Add an access pattern.
    #[must_use]
    pub fn with_access_pattern(mut self, pattern: AccessPattern) -> Self {
        self.access_patterns.push(pattern);
        self
    }

    /// Check the declaration for internal consistency.
    pub fn validate(&self, config: &DocumentConfig) -> DocumentResult<()> {
        if self.name.is_empty() {
            return Err(DocumentError::InvalidAccessPattern(
                "collection name must not be empty".to_owned(),
            ));
        }

        let reserved = [
            self.layout.partition_attr.as_str(),
            self.layout.sort_attr.as_str(),
            config.wrapper_attribute.as_str(),
        ];
        for index in &self.layout.indexes {
            for attr in std::iter::once(&index.partition_attr).chain(&index.sort_attr) {
                if reserved.contains(&attr.as_str()) {
                    return Err(DocumentError::InvalidAccessPattern(format!(
                        "index {} reuses item attribute {attr}",
                        index.name
                    )));
                }
            }
        }

        for (i, pattern) in self.access_patterns.iter().enumerate() {
            let index = self.index_for(pattern)?;
            if pattern.partition_key_paths.is_empty() {
                return Err(DocumentError::InvalidAccessPattern(format!(
                    "access pattern on {} has no partition key fields",
                    pattern.index_name
                )));
            }
            if index.sort_attr.is_none() && !pattern.sort_key_paths.is_empty() {
                return Err(DocumentError::InvalidAccessPattern(format!(
                    "index {} has no sort key but sort key fields are declared",
                    index.name
                )));
            }
            if self.access_patterns[..i]
                .iter()
                .any(|other| other.index_name == pattern.index_name)
            {
                return Err(DocumentError::InvalidAccessPattern(format!(
                    "index {} is used by more than one access pattern",
                    pattern.index_name
                )));
            }
        }
        Ok(())
    }

    /// The index an access pattern writes to.
    pub fn index_for(&self, pattern: &AccessPattern) -> DocumentResult<&IndexLayout> {
        self.layout
            .index(&pattern.index_name)
            .ok_or_else(|| DocumentError::IndexNotFound {
                collection: self.name.clone(),
                index: pattern.index_name.clone(),
            })
    }

    /// The primary key of the document with identifier `id`.
    #[must_use]
    pub fn primary_key(&self, id: &str) -> Item {
        Item::from([
            (
                self.layout.partition_attr.clone(),
                AttributeValue::S(composite::encode(&self.name, &[id.to_owned()])),
            ),
            (
                self.layout.sort_attr.clone(),
                AttributeValue::S(composite::encode(&self.name, &[])),
            ),
        ])
    }

    /// Lay a full document out as a store item.
    ///
    /// Index attributes whose key fields are all missing are left out, so the
    /// item drops out of that (sparse) index.
    pub fn to_item(&self, document: &Value, config: &DocumentConfig) -> DocumentResult<Item> {
        let id = document_id(document, config)?;
        let mut item = self.primary_key(&id);
        item.insert(config.wrapper_attribute.clone(), to_attribute(document));

        for pattern in &self.access_patterns {
            let index = self.index_for(pattern)?;
            let keys = [
                (
                    KeyRole::Partition,
                    &pattern.partition_key_paths,
                    Some(&index.partition_attr),
                ),
                (
                    KeyRole::Sort,
                    &pattern.sort_key_paths,
                    index.sort_attr.as_ref(),
                ),
            ];
            for (role, paths, attr) in keys {
                let Some(attr) = attr else { continue };
                if paths.is_empty() {
                    continue;
                }
                let parts: Vec<KeyPart<'_>> =
                    paths.iter().map(|p| KeyPart::of(p.resolve(document))).collect();
                match composite::assemble(role, &self.name, &parts)? {
                    CompositeKey::Set(key) => {
                        item.insert(attr.clone(), AttributeValue::S(key));
                    }
                    CompositeKey::Skip | CompositeKey::Remove => {}
                }
            }
        }
        Ok(item)
    }

    /// Extract the document body from a stored item.
    pub fn document_from_item(
        &self,
        item: &Item,
        config: &DocumentConfig,
    ) -> DocumentResult<Value> {
        let body = item.get(&config.wrapper_attribute).ok_or_else(|| {
            DocumentError::InvalidDocument(format!(
                "stored item in {} has no {} attribute",
                self.name, config.wrapper_attribute
            ))
        })?;
        from_attribute(body)
    }
}

/// Registered collections by name.
pub type CollectionRegistry = HashMap<String, Arc<Collection>>;

/// Look up a registered collection.
pub fn lookup<'a>(
    registry: &'a CollectionRegistry,
    name: &str,
) -> DocumentResult<&'a Arc<Collection>> {
    registry
        .get(name)
        .ok_or_else(|| DocumentError::CollectionNotFound(name.to_owned()))
}

/// The identifier of a document: a non-empty string or a number.
pub fn document_id(document: &Value, config: &DocumentConfig) -> DocumentResult<String> {
    let fields = document
        .as_object()
        .ok_or_else(|| DocumentError::InvalidDocument("document must be an object".to_owned()))?;
    match fields.get(&config.id_field) {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(DocumentError::InvalidDocument(format!(
            "document needs a non-empty string or number in field {}",
            config.id_field
        ))),
    }
}
