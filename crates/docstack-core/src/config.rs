//! Document engine configuration.
//!
//! All configuration can be driven by environment variables; anything unset
//! falls back to the defaults below.

use std::env;

/// Largest batch the backing store accepts in a single transactional write.
pub const DEFAULT_MAX_TRANSACTION_ITEMS: usize = 100;

/// Document engine configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentConfig {
    /// The table every collection is stored in.
    pub table_name: String,
    /// Top-level attribute holding the document body.
    pub wrapper_attribute: String,
    /// Document field carrying the caller-assigned identifier.
    pub id_field: String,
    /// Upper bound on the number of requests in one transaction.
    pub max_transaction_items: usize,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            table_name: "documents".to_owned(),
            wrapper_attribute: "value".to_owned(),
            id_field: "id".to_owned(),
            max_transaction_items: DEFAULT_MAX_TRANSACTION_ITEMS,
        }
    }
}

impl DocumentConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = env::var("DOCSTACK_TABLE_NAME") {
            config.table_name = v;
        }
        if let Ok(v) = env::var("DOCSTACK_WRAPPER_ATTRIBUTE") {
            config.wrapper_attribute = v;
        }
        if let Ok(v) = env::var("DOCSTACK_ID_FIELD") {
            config.id_field = v;
        }
        if let Some(v) = env::var("DOCSTACK_MAX_TRANSACTION_ITEMS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            config.max_transaction_items = v;
        }

        config
    }

    /// Set the table name.
    #[must_use]
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    /// Set the transaction size bound.
    #[must_use]
    pub fn with_max_transaction_items(mut self, max: usize) -> Self {
        self.max_transaction_items = max;
        self
    }
}
