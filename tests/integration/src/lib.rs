//! End-to-end tests for docstack.
//!
//! Every test builds its own [`MemoryStore`] and drives it through the
//! public [`DocumentStore`] API, so nothing needs to be running. Set
//! `RUST_LOG=debug` to see the compiled expressions.

use std::sync::Once;

use docstack_core::{
    AccessPattern, Collection, DocumentConfig, DocumentStore, IndexLayout, TableLayout,
};
use docstack_memory::MemoryStore;

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Generate a unique table name for a test.
#[must_use]
pub fn test_table_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("test-{prefix}-{id}")
}

/// The `users` collection: looked up by email through `byEmail`.
#[must_use]
pub fn users_collection() -> Collection {
    let layout = TableLayout::default().with_index(IndexLayout::new("byEmail", "gsi1pk"));
    let by_email = AccessPattern::new("byEmail", &["email"], &[])
        .unwrap_or_else(|e| panic!("invalid access pattern: {e}"));
    Collection::new("users", layout).with_access_pattern(by_email)
}

/// The `orders` collection: listed per customer and region, sorted by date
/// and status.
#[must_use]
pub fn orders_collection() -> Collection {
    let layout = TableLayout::default()
        .with_index(IndexLayout::new("byCustomer", "gsi1pk").with_sort_attr("gsi1sk"));
    let by_customer = AccessPattern::new(
        "byCustomer",
        &["customer.id", "region"],
        &["placedAt", "status"],
    )
    .unwrap_or_else(|e| panic!("invalid access pattern: {e}"));
    Collection::new("orders", layout).with_access_pattern(by_customer)
}

/// Create a store over a fresh table with `users` and `orders` registered.
pub fn document_store(prefix: &str) -> anyhow::Result<DocumentStore<MemoryStore>> {
    init_tracing();

    let table = test_table_name(prefix);
    let client = MemoryStore::default();
    client.create_table(&table, "pk", Some("sk"))?;
    tracing::debug!(table = %table, "created test table");

    let config = DocumentConfig::default().with_table_name(table);
    let mut store = DocumentStore::new(client, config);
    store.register(users_collection())?;
    store.register(orders_collection())?;
    Ok(store)
}

/// Every stored item of the store's table.
pub fn stored_items(
    store: &DocumentStore<MemoryStore>,
) -> anyhow::Result<Vec<docstack_model::Item>> {
    Ok(store.client().scan(&store.config().table_name)?)
}

mod test_transaction;
mod test_update;
