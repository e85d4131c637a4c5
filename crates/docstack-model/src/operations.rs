//! Store operation enum.

use std::fmt;

/// All operations the document engine issues against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// Get an item by primary key.
    GetItem,
    /// Put (insert or replace) an item.
    PutItem,
    /// Update an item.
    UpdateItem,
    /// Delete an item by primary key.
    DeleteItem,
    /// Apply a batch of writes atomically.
    TransactWriteItems,
}

impl StoreOperation {
    /// Returns the operation name string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetItem => "GetItem",
            Self::PutItem => "PutItem",
            Self::UpdateItem => "UpdateItem",
            Self::DeleteItem => "DeleteItem",
            Self::TransactWriteItems => "TransactWriteItems",
        }
    }

    /// Returns `true` if the operation may modify stored items.
    #[must_use]
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::GetItem)
    }
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
