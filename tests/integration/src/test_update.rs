//! Single-document writes and partial updates.

#[cfg(test)]
mod tests {
    use docstack_core::{Condition, DocumentError, KeyPath, Updates};
    use docstack_model::{AttributeValue, StoreErrorCode};
    use serde_json::json;

    use crate::{document_store, stored_items};

    fn attr<'a>(item: &'a docstack_model::Item, name: &str) -> Option<&'a str> {
        item.get(name).and_then(AttributeValue::as_s)
    }

    #[tokio::test]
    async fn test_should_move_email_index_on_update() {
        let store = document_store("email").unwrap();
        store
            .insert("users", &json!({"id": "u1", "email": "a@x.com", "name": "Ada"}))
            .await
            .unwrap();
        let items = stored_items(&store).unwrap();
        assert_eq!(attr(&items[0], "gsi1pk"), Some("users|a@x.com"));

        let updated = store
            .update("users", "u1", &Updates::new().set("email", "b@x.com"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["email"], "b@x.com");
        assert_eq!(updated["name"], "Ada");

        let items = stored_items(&store).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(attr(&items[0], "pk"), Some("users|u1"));
        assert_eq!(attr(&items[0], "sk"), Some("users"));
        assert_eq!(attr(&items[0], "gsi1pk"), Some("users|b@x.com"));
    }

    #[tokio::test]
    async fn test_should_drop_index_key_when_field_removed() {
        let store = document_store("remove").unwrap();
        store
            .insert("users", &json!({"id": "u1", "email": "a@x.com"}))
            .await
            .unwrap();

        store
            .update("users", "u1", &Updates::new().remove("email"), None)
            .await
            .unwrap();

        let items = stored_items(&store).unwrap();
        assert!(!items[0].contains_key("gsi1pk"));
        assert_eq!(
            store.find("users", "u1").await.unwrap(),
            Some(json!({"id": "u1"}))
        );
    }

    #[tokio::test]
    async fn test_should_not_index_document_without_key_fields() {
        let store = document_store("sparse").unwrap();
        store.insert("users", &json!({"id": "u1"})).await.unwrap();
        let items = stored_items(&store).unwrap();
        assert!(!items[0].contains_key("gsi1pk"));
    }

    #[tokio::test]
    async fn test_should_maintain_multi_field_keys() {
        let store = document_store("orders").unwrap();
        let order = json!({
            "id": "o1",
            "customer": {"id": "c1", "name": "Ada"},
            "region": "eu",
            "placedAt": "2024-01-31",
            "status": "open",
        });
        store.insert("orders", &order).await.unwrap();
        let items = stored_items(&store).unwrap();
        assert_eq!(attr(&items[0], "gsi1pk"), Some("orders|c1|eu"));
        assert_eq!(attr(&items[0], "gsi1sk"), Some("orders|2024-01-31|open"));

        store
            .update(
                "orders",
                "o1",
                &Updates::new()
                    .set("customer", json!({"id": "c2"}))
                    .set("region", "eu")
                    .set("placedAt", "2024-01-31")
                    .set("status", "shipped"),
                None,
            )
            .await
            .unwrap();
        let items = stored_items(&store).unwrap();
        assert_eq!(attr(&items[0], "gsi1pk"), Some("orders|c2|eu"));
        assert_eq!(attr(&items[0], "gsi1sk"), Some("orders|2024-01-31|shipped"));
    }

    #[tokio::test]
    async fn test_should_reject_partial_keys_before_calling_store() {
        let store = document_store("partial").unwrap();
        store
            .insert(
                "orders",
                &json!({"id": "o1", "customer": {"id": "c1"}, "region": "eu"}),
            )
            .await
            .unwrap();
        let calls = store.client().operations().len();

        let err = store
            .update("orders", "o1", &Updates::new().remove("region"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::InvalidUpdates(_)));

        let err = store
            .update("orders", "o1", &Updates::new().set("placedAt", "2024-02-01"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::InvalidUpdateValue(_)));

        assert_eq!(store.client().operations().len(), calls);
    }

    #[tokio::test]
    async fn test_should_update_field_named_like_a_function() {
        let store = document_store("function").unwrap();
        store.insert("users", &json!({"id": "u1"})).await.unwrap();

        let updated = store
            .update(
                "users",
                "u1",
                &Updates::new().set("attribute_exists", 1),
                None,
            )
            .await
            .unwrap();
        assert_eq!(updated, Some(json!({"id": "u1", "attribute_exists": 1})));
    }

    #[tokio::test]
    async fn test_should_fail_update_of_missing_document() {
        let store = document_store("missing").unwrap();
        let err = store
            .update("users", "ghost", &Updates::new().set("email", "a@x.com"), None)
            .await
            .unwrap_err();
        assert_eq!(
            err.store_code(),
            Some(StoreErrorCode::ConditionalCheckFailedException)
        );
        assert!(stored_items(&store).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_should_apply_update_only_when_condition_holds() {
        let store = document_store("guarded").unwrap();
        store
            .insert("users", &json!({"id": "u1", "email": "a@x.com", "version": 1}))
            .await
            .unwrap();
        let version = KeyPath::parse("version").unwrap();

        let stale = Condition::Equals(version.clone(), json!(0));
        let err = store
            .update("users", "u1", &Updates::new().set("version", 2), Some(&stale))
            .await
            .unwrap_err();
        assert_eq!(
            err.store_code(),
            Some(StoreErrorCode::ConditionalCheckFailedException)
        );

        let current = Condition::Equals(version, json!(1));
        let updated = store
            .update("users", "u1", &Updates::new().set("version", 2), Some(&current))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["version"], 2);
    }

    #[tokio::test]
    async fn test_should_replace_and_find_many() {
        let store = document_store("many").unwrap();
        store
            .insert("users", &json!({"id": "u1", "email": "a@x.com"}))
            .await
            .unwrap();
        store
            .replace("users", &json!({"id": "u1", "email": "z@x.com"}), None)
            .await
            .unwrap();
        store
            .replace("users", &json!({"id": "u2"}), None)
            .await
            .unwrap();

        let found = store.find_many("users", &["u2", "u3", "u1"]).await.unwrap();
        assert_eq!(found[0], Some(json!({"id": "u2"})));
        assert_eq!(found[1], None);
        assert_eq!(found[2], Some(json!({"id": "u1", "email": "z@x.com"})));
    }
}
