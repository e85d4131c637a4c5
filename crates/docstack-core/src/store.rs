//! The document store facade.

use std::sync::Arc;

use docstack_model::StoreClient;
use docstack_model::input::{DeleteItemInput, GetItemInput, PutItemInput, UpdateItemInput};
use futures::future::try_join_all;
use serde_json::Value;
use tracing::debug;

use crate::collection::{Collection, CollectionRegistry, lookup};
use crate::config::DocumentConfig;
use crate::error::{DocumentError, DocumentResult};
use crate::expression::{Condition, Updates};
use crate::transaction::{
    TransactOptions, TransactionCoordinator, TransactionWriteRequest, build_delete, build_put,
    build_update, require_id,
};

/// Collections of JSON documents stored in one table behind a
/// [`StoreClient`].
///
/// Collections are registered up front; each single-document write is one
/// conditional store call, and [`Self::transact`] commits several writes
/// atomically.
#[derive(Debug)]
pub struct DocumentStore<C> {
    client: C,
    config: DocumentConfig,
    collections: CollectionRegistry,
}

impl<C: StoreClient> DocumentStore<C> {
    /// Create a store with no registered collections.
    #[must_use]
    pub fn new(client: C, config: DocumentConfig) -> Self {
        Self {
            client,
            config,
            collections: CollectionRegistry::new(),
        }
    }

    /// The underlying client.
    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    /// Validate and register a collection. Registered collections cannot be
    /// redeclared.
    pub fn register(&mut self, collection: Collection) -> DocumentResult<Arc<Collection>> {
        collection.validate(&self.config)?;
        if self.collections.contains_key(&collection.name) {
            return Err(DocumentError::InvalidAccessPattern(format!(
                "collection {} is already registered",
                collection.name
            )));
        }
        let collection = Arc::new(collection);
        self.collections
            .insert(collection.name.clone(), Arc::clone(&collection));
        debug!(
            collection = %collection.name,
            access_patterns = collection.access_patterns.len(),
            "registered collection"
        );
        Ok(collection)
    }

    /// Look up a registered collection.
    pub fn collection(&self, name: &str) -> DocumentResult<Arc<Collection>> {
        lookup(&self.collections, name).cloned()
    }

    /// Create a document. Fails with a conditional-check error if a document
    /// with the same identifier exists.
    pub async fn insert(&self, collection: &str, document: &Value) -> DocumentResult<()> {
        let collection = lookup(&self.collections, collection)?;
        let put = build_put(collection, document, true, None, &self.config)?;
        debug!(collection = %collection.name, condition = ?put.condition_expression, "insert");
        self.client
            .put_item(PutItemInput {
                table_name: put.table_name,
                item: put.item,
                condition_expression: put.condition_expression,
                expression_attribute_names: put.expression_attribute_names,
                expression_attribute_values: put.expression_attribute_values,
            })
            .await?;
        Ok(())
    }

    /// Write a full document, recomputing every index key.
    pub async fn replace(
        &self,
        collection: &str,
        document: &Value,
        condition: Option<&Condition>,
    ) -> DocumentResult<()> {
        let collection = lookup(&self.collections, collection)?;
        let put = build_put(collection, document, false, condition, &self.config)?;
        debug!(collection = %collection.name, condition = ?put.condition_expression, "replace");
        self.client
            .put_item(PutItemInput {
                table_name: put.table_name,
                item: put.item,
                condition_expression: put.condition_expression,
                expression_attribute_names: put.expression_attribute_names,
                expression_attribute_values: put.expression_attribute_values,
            })
            .await?;
        Ok(())
    }

    /// Apply a partial update to an existing document and return the
    /// updated document, if the store reports it.
    pub async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: &Updates,
        condition: Option<&Condition>,
    ) -> DocumentResult<Option<Value>> {
        let collection = lookup(&self.collections, collection)?;
        let update = build_update(collection, id, updates, condition, &self.config)?;
        debug!(
            collection = %collection.name,
            id,
            expression = %update.update_expression,
            "update"
        );
        let output = self
            .client
            .update_item(UpdateItemInput {
                table_name: update.table_name,
                key: update.key,
                update_expression: update.update_expression,
                condition_expression: update.condition_expression,
                expression_attribute_names: update.expression_attribute_names,
                expression_attribute_values: update.expression_attribute_values,
                return_all_new: Some(true),
            })
            .await?;
        output
            .attributes
            .map(|item| collection.document_from_item(&item, &self.config))
            .transpose()
    }

    /// Delete a document.
    pub async fn delete(
        &self,
        collection: &str,
        id: &str,
        condition: Option<&Condition>,
    ) -> DocumentResult<()> {
        let collection = lookup(&self.collections, collection)?;
        let delete = build_delete(collection, id, condition, &self.config)?;
        debug!(collection = %collection.name, id, "delete");
        self.client
            .delete_item(DeleteItemInput {
                table_name: delete.table_name,
                key: delete.key,
                condition_expression: delete.condition_expression,
                expression_attribute_names: delete.expression_attribute_names,
                expression_attribute_values: delete.expression_attribute_values,
            })
            .await?;
        Ok(())
    }

    /// Fetch a document by identifier.
    pub async fn find(&self, collection: &str, id: &str) -> DocumentResult<Option<Value>> {
        let collection = lookup(&self.collections, collection)?;
        self.find_in(collection, id).await
    }

    /// Fetch several documents concurrently, in the order of `ids`.
    pub async fn find_many(
        &self,
        collection: &str,
        ids: &[&str],
    ) -> DocumentResult<Vec<Option<Value>>> {
        let collection = lookup(&self.collections, collection)?;
        try_join_all(ids.iter().map(|id| self.find_in(collection, id))).await
    }

    /// Commit several writes atomically.
    pub async fn transact(
        &self,
        requests: &[TransactionWriteRequest],
        options: &TransactOptions,
    ) -> DocumentResult<()> {
        TransactionCoordinator::new(&self.client, &self.config, &self.collections)
            .commit(requests, options)
            .await
    }

    async fn find_in(&self, collection: &Collection, id: &str) -> DocumentResult<Option<Value>> {
        require_id(id)?;
        let output = self
            .client
            .get_item(GetItemInput {
                table_name: self.config.table_name.clone(),
                key: collection.primary_key(id),
                consistent_read: Some(true),
            })
            .await?;
        output
            .item
            .map(|item| collection.document_from_item(&item, &self.config))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use docstack_memory::MemoryStore;
    use docstack_model::StoreErrorCode;
    use serde_json::json;

    use super::*;
    use crate::collection::{AccessPattern, IndexLayout, TableLayout};
    use crate::keypath::KeyPath;

    fn store() -> DocumentStore<MemoryStore> {
        let client = MemoryStore::default();
        client.create_table("documents", "pk", Some("sk")).unwrap();
        let mut store = DocumentStore::new(client, DocumentConfig::default());
        store
            .register(
                Collection::new(
                    "users",
                    TableLayout::default().with_index(IndexLayout::new("byEmail", "gsi1pk")),
                )
                .with_access_pattern(AccessPattern::new("byEmail", &["email"], &[]).unwrap()),
            )
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_should_insert_and_find_document() {
        let store = store();
        let doc = json!({"id": "u1", "email": "a@x.com", "name": "Ada"});
        store.insert("users", &doc).await.unwrap();

        assert_eq!(store.find("users", "u1").await.unwrap(), Some(doc.clone()));
        assert_eq!(store.find("users", "u2").await.unwrap(), None);

        let err = store.insert("users", &doc).await.unwrap_err();
        assert_eq!(
            err.store_code(),
            Some(StoreErrorCode::ConditionalCheckFailedException)
        );
    }

    #[tokio::test]
    async fn test_should_keep_index_key_in_step_with_update() {
        let store = store();
        store
            .insert("users", &json!({"id": "u1", "email": "a@x.com"}))
            .await
            .unwrap();

        let updated = store
            .update(
                "users",
                "u1",
                &Updates::new().set("email", "b@x.com"),
                None,
            )
            .await
            .unwrap();
        assert_eq!(updated, Some(json!({"id": "u1", "email": "b@x.com"})));

        let items = store.client().scan("documents").unwrap();
        assert_eq!(items[0]["gsi1pk"].as_s(), Some("users|b@x.com"));
    }

    #[tokio::test]
    async fn test_should_reject_update_of_missing_document() {
        let store = store();
        let err = store
            .update("users", "ghost", &Updates::new().set("email", "x"), None)
            .await
            .unwrap_err();
        assert_eq!(
            err.store_code(),
            Some(StoreErrorCode::ConditionalCheckFailedException)
        );
        assert!(store.client().scan("documents").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_should_honour_caller_condition_on_delete() {
        let store = store();
        store
            .insert("users", &json!({"id": "u1", "email": "a@x.com"}))
            .await
            .unwrap();

        let stale = Condition::Equals(KeyPath::parse("email").unwrap(), json!("old@x.com"));
        assert!(store.delete("users", "u1", Some(&stale)).await.is_err());

        let current = Condition::Equals(KeyPath::parse("email").unwrap(), json!("a@x.com"));
        store.delete("users", "u1", Some(&current)).await.unwrap();
        assert_eq!(store.find("users", "u1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_should_reject_unknown_and_duplicate_collections() {
        let mut store = store();
        let err = store.find("orders", "o1").await.unwrap_err();
        assert!(matches!(err, DocumentError::CollectionNotFound(_)));

        let err = store
            .register(Collection::new("users", TableLayout::default()))
            .unwrap_err();
        assert!(matches!(err, DocumentError::InvalidAccessPattern(_)));
    }

    #[tokio::test]
    async fn test_should_find_many_in_request_order() {
        let store = store();
        for id in ["a", "b"] {
            store
                .insert("users", &json!({"id": id, "email": format!("{id}@x.com")}))
                .await
                .unwrap();
        }
        let found = store.find_many("users", &["b", "missing", "a"]).await.unwrap();
        assert_eq!(found[0].as_ref().unwrap()["id"], "b");
        assert!(found[1].is_none());
        assert_eq!(found[2].as_ref().unwrap()["id"], "a");
    }
}
