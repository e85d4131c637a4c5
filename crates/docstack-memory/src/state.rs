//! Tables and items held by the in-memory store.

use std::sync::Arc;

use dashmap::DashMap;
use docstack_model::{AttributeValue, Item, StoreError};

/// Every table, keyed by name.
#[derive(Debug, Default)]
pub struct MemoryServiceState {
    tables: DashMap<String, Arc<MemoryTable>>,
}

impl MemoryServiceState {
    /// Create an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a table by name.
    #[must_use]
    pub fn get_table(&self, name: &str) -> Option<Arc<MemoryTable>> {
        self.tables.get(name).map(|r| Arc::clone(r.value()))
    }

    /// Get a table or return `ResourceNotFoundException`.
    pub fn require_table(&self, name: &str) -> Result<Arc<MemoryTable>, StoreError> {
        self.get_table(name).ok_or_else(|| {
            StoreError::resource_not_found(format!(
                "Requested resource not found: Table: {name} not found"
            ))
        })
    }

    /// Insert a new table. Fails if the name is taken.
    pub fn create_table(&self, table: MemoryTable) -> Result<Arc<MemoryTable>, StoreError> {
        match self.tables.entry(table.name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(e) => Err(StoreError::resource_in_use(
                format!("Table already exists: {}", e.key()),
            )),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                let table = Arc::new(table);
                e.insert(Arc::clone(&table));
                Ok(table)
            }
        }
    }
}

/// The key attributes of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    /// Partition key attribute.
    pub partition_attr: String,
    /// Sort key attribute, if the table has one.
    pub sort_attr: Option<String>,
}

impl KeySchema {
    /// Returns `true` if `name` is one of the key attributes.
    #[must_use]
    pub fn is_key_attribute(&self, name: &str) -> bool {
        self.partition_attr == name || self.sort_attr.as_deref() == Some(name)
    }

    /// Pick the primary key out of an item or key map.
    pub fn extract(&self, attributes: &Item) -> Result<PrimaryKey, StoreError> {
        let partition = key_value(attributes, &self.partition_attr)?;
        let sort = self
            .sort_attr
            .as_deref()
            .map(|attr| key_value(attributes, attr))
            .transpose()?;
        Ok(PrimaryKey { partition, sort })
    }
}

fn key_value(attributes: &Item, name: &str) -> Result<AttributeValue, StoreError> {
    match attributes.get(name) {
        Some(value) if value.is_key_type() => Ok(value.clone()),
        Some(value) => Err(StoreError::validation(format!(
            "One or more parameter values were invalid: Type mismatch for key {name}, \
             got {}",
            value.type_descriptor()
        ))),
        None => Err(StoreError::validation(format!(
            "One or more parameter values were invalid: Missing the key {name} in the item"
        ))),
    }
}

/// A table's primary key value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrimaryKey {
    /// Partition key value.
    pub partition: AttributeValue,
    /// Sort key value.
    pub sort: Option<AttributeValue>,
}

impl PrimaryKey {
    /// The key as an attribute map.
    #[must_use]
    pub fn to_item(&self, schema: &KeySchema) -> Item {
        let mut item = Item::from([(schema.partition_attr.clone(), self.partition.clone())]);
        if let (Some(attr), Some(sort)) = (&schema.sort_attr, &self.sort) {
            item.insert(attr.clone(), sort.clone());
        }
        item
    }
}

/// A single table.
#[derive(Debug)]
pub struct MemoryTable {
    /// Table name.
    pub name: String,
    /// Key attributes.
    pub key_schema: KeySchema,
    items: DashMap<PrimaryKey, Item>,
}

impl MemoryTable {
    /// Create an empty table.
    #[must_use]
    pub fn new(name: impl Into<String>, key_schema: KeySchema) -> Self {
        Self {
            name: name.into(),
            key_schema,
            items: DashMap::new(),
        }
    }

    /// Fetch a copy of an item.
    #[must_use]
    pub fn get(&self, key: &PrimaryKey) -> Option<Item> {
        self.items.get(key).map(|r| r.value().clone())
    }

    /// Insert or overwrite an item.
    pub fn put(&self, key: PrimaryKey, item: Item) {
        self.items.insert(key, item);
    }

    /// Remove an item, returning it.
    pub fn remove(&self, key: &PrimaryKey) -> Option<Item> {
        self.items.remove(key).map(|(_, item)| item)
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the table holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// A copy of every item, in no particular order.
    #[must_use]
    pub fn scan(&self) -> Vec<Item> {
        self.items.iter().map(|r| r.value().clone()).collect()
    }
}
