//! Transactional batches and idempotency tokens.

#[cfg(test)]
mod tests {
    use docstack_core::{DocumentError, TransactOptions, TransactionWriteRequest, Updates};
    use docstack_model::{AttributeValue, StoreErrorCode, StoreOperation};
    use serde_json::json;

    use crate::{document_store, stored_items};

    fn batch() -> Vec<TransactionWriteRequest> {
        vec![
            TransactionWriteRequest::insert("users", json!({"id": "u1", "email": "a@x.com"})),
            TransactionWriteRequest::insert(
                "orders",
                json!({"id": "o1", "customer": {"id": "u1"}, "region": "eu"}),
            ),
        ]
    }

    #[tokio::test]
    async fn test_should_commit_batch_once_per_token() {
        let store = document_store("token").unwrap();
        let options = TransactOptions::default().with_idempotency_token("checkout-1");

        store.transact(&batch(), &options).await.unwrap();
        // Replaying the inserts would fail their existence guards.
        store.transact(&batch(), &options).await.unwrap();

        assert_eq!(stored_items(&store).unwrap().len(), 2);
        assert_eq!(
            store.client().operations(),
            vec![
                StoreOperation::TransactWriteItems,
                StoreOperation::TransactWriteItems
            ]
        );
    }

    #[tokio::test]
    async fn test_should_reject_token_reuse_with_different_batch() {
        let store = document_store("mismatch").unwrap();
        let options = TransactOptions::default().with_idempotency_token("checkout-1");
        store.transact(&batch(), &options).await.unwrap();

        let other = vec![TransactionWriteRequest::update(
            "users",
            "u1",
            Updates::new().set("email", "b@x.com"),
        )];
        let err = store.transact(&other, &options).await.unwrap_err();
        assert!(matches!(err, DocumentError::IdempotentParameterMismatch(_)));
        assert_eq!(
            store.find("users", "u1").await.unwrap().unwrap()["email"],
            "a@x.com"
        );
    }

    #[tokio::test]
    async fn test_should_apply_nothing_when_one_condition_fails() {
        let store = document_store("atomic").unwrap();
        store
            .insert("users", &json!({"id": "u1", "email": "a@x.com"}))
            .await
            .unwrap();

        let requests = vec![
            TransactionWriteRequest::insert("users", json!({"id": "u2", "email": "b@x.com"})),
            TransactionWriteRequest::insert("users", json!({"id": "u1", "email": "c@x.com"})),
        ];
        let err = store
            .transact(&requests, &TransactOptions::default())
            .await
            .unwrap_err();

        let DocumentError::Store(err) = err else {
            panic!("expected a store error, got {err:?}");
        };
        assert_eq!(err.code, StoreErrorCode::TransactionCanceledException);
        let codes: Vec<_> = err
            .cancellation_reasons
            .iter()
            .map(|r| r.code.as_str())
            .collect();
        assert_eq!(codes, ["None", "ConditionalCheckFailed"]);
        assert_eq!(store.find("users", "u2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_should_commit_mixed_batch() {
        let store = document_store("mixed").unwrap();
        store
            .insert("users", &json!({"id": "u1", "email": "a@x.com"}))
            .await
            .unwrap();
        store
            .insert("users", &json!({"id": "u2", "email": "b@x.com"}))
            .await
            .unwrap();

        let requests = vec![
            TransactionWriteRequest::update("users", "u1", Updates::new().set("email", "z@x.com")),
            TransactionWriteRequest::delete("users", "u2"),
            TransactionWriteRequest::replace("users", json!({"id": "u3"})),
        ];
        store
            .transact(&requests, &TransactOptions::default())
            .await
            .unwrap();

        let u1 = store.find("users", "u1").await.unwrap().unwrap();
        assert_eq!(u1["email"], "z@x.com");
        assert_eq!(store.find("users", "u2").await.unwrap(), None);
        assert_eq!(store.find("users", "u3").await.unwrap(), Some(json!({"id": "u3"})));

        let index_keys: Vec<_> = stored_items(&store)
            .unwrap()
            .iter()
            .filter_map(|item| {
                item.get("gsi1pk")
                    .and_then(AttributeValue::as_s)
                    .map(str::to_owned)
            })
            .collect();
        assert_eq!(index_keys, ["users|z@x.com"]);
    }

    #[tokio::test]
    async fn test_should_reject_duplicate_target_without_store_call() {
        let store = document_store("duplicate").unwrap();
        let requests = vec![
            TransactionWriteRequest::replace("users", json!({"id": "u1"})),
            TransactionWriteRequest::delete("users", "u1"),
        ];
        let err = store
            .transact(&requests, &TransactOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::TransactionValidation(_)));
        assert!(store.client().operations().is_empty());
    }

    #[tokio::test]
    async fn test_should_reject_unknown_collection_in_batch() {
        let store = document_store("unknown").unwrap();
        let requests = vec![TransactionWriteRequest::delete("invoices", "i1")];
        let err = store
            .transact(&requests, &TransactOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::CollectionNotFound(_)));
        assert!(store.client().operations().is_empty());
    }
}
