//! Shared model types: items, transactional write entries and cancellation
//! reasons.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::attribute_value::AttributeValue;
use crate::error::StoreErrorCode;

/// A stored item: attribute name to attribute value.
pub type Item = BTreeMap<String, AttributeValue>;

/// One entry of a `TransactWriteItems` request.
///
/// Exactly one of the fields must be specified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransactWriteItem {
    /// Put (insert or replace) an item.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put: Option<Put>,
    /// Update an item with an update expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<Update>,
    /// Delete an item.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<Delete>,
}

impl TransactWriteItem {
    /// Returns the table and key targeted by this entry, if exactly one
    /// action is present.
    #[must_use]
    pub fn target(&self) -> Option<(&str, TargetKey<'_>)> {
        match (&self.put, &self.update, &self.delete) {
            (Some(put), None, None) => {
                Some((put.table_name.as_str(), TargetKey::Item(&put.item)))
            }
            (None, Some(update), None) => {
                Some((update.table_name.as_str(), TargetKey::Key(&update.key)))
            }
            (None, None, Some(delete)) => {
                Some((delete.table_name.as_str(), TargetKey::Key(&delete.key)))
            }
            _ => None,
        }
    }
}

/// The key-bearing part of a transactional write entry.
#[derive(Debug, Clone, Copy)]
pub enum TargetKey<'a> {
    /// A full item; the key attributes are picked out of it.
    Item(&'a Item),
    /// A bare primary key.
    Key(&'a Item),
}

impl<'a> TargetKey<'a> {
    /// The attribute map carrying the key.
    #[must_use]
    pub fn attributes(&self) -> &'a Item {
        match self {
            Self::Item(item) | Self::Key(item) => item,
        }
    }
}

/// A transactional put.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Put {
    /// The target table.
    pub table_name: String,
    /// The full item to write.
    pub item: Item,
    /// A condition that must hold for the transaction to proceed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_expression: Option<String>,
    /// Substitution tokens for attribute names.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expression_attribute_names: BTreeMap<String, String>,
    /// Substitution tokens for attribute values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expression_attribute_values: BTreeMap<String, AttributeValue>,
}

/// A transactional update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Update {
    /// The target table.
    pub table_name: String,
    /// The primary key of the item to update.
    pub key: Item,
    /// The update expression (`SET ... REMOVE ...`).
    pub update_expression: String,
    /// A condition that must hold for the transaction to proceed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_expression: Option<String>,
    /// Substitution tokens for attribute names.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expression_attribute_names: BTreeMap<String, String>,
    /// Substitution tokens for attribute values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expression_attribute_values: BTreeMap<String, AttributeValue>,
}

/// A transactional delete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Delete {
    /// The target table.
    pub table_name: String,
    /// The primary key of the item to delete.
    pub key: Item,
    /// A condition that must hold for the transaction to proceed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_expression: Option<String>,
    /// Substitution tokens for attribute names.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expression_attribute_names: BTreeMap<String, String>,
    /// Substitution tokens for attribute values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expression_attribute_values: BTreeMap<String, AttributeValue>,
}

/// Why an individual transaction item was (or was not) the cause of a
/// cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CancellationReason {
    /// The reason code, `None` for items that did not fail.
    pub code: String,
    /// A human-readable message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CancellationReason {
    /// The reason reported for items that did not cause the cancellation.
    #[must_use]
    pub fn none() -> Self {
        Self {
            code: "None".to_owned(),
            message: None,
        }
    }

    /// A reason derived from a store error code.
    #[must_use]
    pub fn from_code(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.cancellation_code().to_owned(),
            message: Some(message.into()),
        }
    }
}
