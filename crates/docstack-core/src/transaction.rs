//! Transactional batches of document writes.
//!
//! A batch is validated locally, translated into a single
//! `TransactWriteItems` request and submitted exactly once. Translation is
//! deterministic, so resubmitting the same batch with the same idempotency
//! token produces a byte-identical request.

use std::collections::HashSet;

use docstack_model::input::TransactWriteItemsInput;
use docstack_model::types::{Delete, Put, TransactWriteItem, Update};
use docstack_model::{StoreClient, StoreError, StoreErrorCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::collection::{Collection, CollectionRegistry, document_id, lookup};
use crate::config::DocumentConfig;
use crate::error::{DocumentError, DocumentResult};
use crate::expression::condition::{guarded, item_not_exists};
use crate::expression::{Condition, NameSession, Updates, compile_guarded};

/// Longest idempotency token the store accepts.
pub const MAX_TOKEN_LEN: usize = 36;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// One write in a transactional batch.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionWriteRequest {
    /// Create a document that must not exist yet.
    Insert {
        /// Target collection.
        collection: String,
        /// The full document, including its identifier.
        document: Value,
        /// Extra condition on the (absent) stored document.
        condition: Option<Condition>,
    },
    /// Write a full document, creating or overwriting it.
    Replace {
        /// Target collection.
        collection: String,
        /// The full document, including its identifier.
        document: Value,
        /// Condition on the stored document.
        condition: Option<Condition>,
    },
    /// Apply a partial update to an existing document.
    Update {
        /// Target collection.
        collection: String,
        /// Document identifier.
        id: String,
        /// Field updates.
        updates: Updates,
        /// Condition on the stored document.
        condition: Option<Condition>,
    },
    /// Delete a document.
    Delete {
        /// Target collection.
        collection: String,
        /// Document identifier.
        id: String,
        /// Condition on the stored document.
        condition: Option<Condition>,
    },
}

impl TransactionWriteRequest {
    /// An unconditional insert.
    #[must_use]
    pub fn insert(collection: impl Into<String>, document: Value) -> Self {
        Self::Insert {
            collection: collection.into(),
            document,
            condition: None,
        }
    }

    /// An unconditional replace.
    #[must_use]
    pub fn replace(collection: impl Into<String>, document: Value) -> Self {
        Self::Replace {
            collection: collection.into(),
            document,
            condition: None,
        }
    }

    /// An update of an existing document.
    #[must_use]
    pub fn update(collection: impl Into<String>, id: impl Into<String>, updates: Updates) -> Self {
        Self::Update {
            collection: collection.into(),
            id: id.into(),
            updates,
            condition: None,
        }
    }

    /// An unconditional delete.
    #[must_use]
    pub fn delete(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Delete {
            collection: collection.into(),
            id: id.into(),
            condition: None,
        }
    }

    /// Attach a condition, replacing any existing one.
    #[must_use]
    pub fn with_condition(mut self, new: Condition) -> Self {
        match &mut self {
            Self::Insert { condition, .. }
            | Self::Replace { condition, .. }
            | Self::Update { condition, .. }
            | Self::Delete { condition, .. } => *condition = Some(new),
        }
        self
    }

    /// The target collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        match self {
            Self::Insert { collection, .. }
            | Self::Replace { collection, .. }
            | Self::Update { collection, .. }
            | Self::Delete { collection, .. } => collection,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Replace { .. } => "replace",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }
}

/// Options for a transactional commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactOptions {
    /// Client request token; retries carrying the same token and the same
    /// batch are applied at most once.
    pub idempotency_token: Option<String>,
}

impl TransactOptions {
    /// Set the idempotency token.
    #[must_use]
    pub fn with_idempotency_token(mut self, token: impl Into<String>) -> Self {
        self.idempotency_token = Some(token.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Write construction
// ---------------------------------------------------------------------------

/// A put of a full document, optionally requiring that it does not exist.
pub(crate) fn build_put(
    collection: &Collection,
    document: &Value,
    must_not_exist: bool,
    condition: Option<&Condition>,
    config: &DocumentConfig,
) -> DocumentResult<Put> {
    let item = collection.to_item(document, config)?;
    let mut session = NameSession::new(&config.wrapper_attribute);
    let guard =
        must_not_exist.then(|| item_not_exists(&mut session, &collection.layout.partition_attr));
    let condition_expression = guarded(&mut session, guard, condition);
    let (expression_attribute_names, expression_attribute_values) = session.into_parts();
    Ok(Put {
        table_name: config.table_name.clone(),
        item,
        condition_expression,
        expression_attribute_names,
        expression_attribute_values,
    })
}

/// A partial update of an existing document.
pub(crate) fn build_update(
    collection: &Collection,
    id: &str,
    updates: &Updates,
    condition: Option<&Condition>,
    config: &DocumentConfig,
) -> DocumentResult<Update> {
    require_id(id)?;
    let plan = compile_guarded(collection, updates, condition, config)?;
    Ok(Update {
        table_name: config.table_name.clone(),
        key: collection.primary_key(id),
        update_expression: plan.expression(),
        condition_expression: plan.condition_expression,
        expression_attribute_names: plan.names,
        expression_attribute_values: plan.values,
    })
}

/// A delete by identifier.
pub(crate) fn build_delete(
    collection: &Collection,
    id: &str,
    condition: Option<&Condition>,
    config: &DocumentConfig,
) -> DocumentResult<Delete> {
    require_id(id)?;
    let mut session = NameSession::new(&config.wrapper_attribute);
    let condition_expression = guarded(&mut session, None, condition);
    let (expression_attribute_names, expression_attribute_values) = session.into_parts();
    Ok(Delete {
        table_name: config.table_name.clone(),
        key: collection.primary_key(id),
        condition_expression,
        expression_attribute_names,
        expression_attribute_values,
    })
}

pub(crate) fn require_id(id: &str) -> DocumentResult<()> {
    if id.is_empty() {
        return Err(DocumentError::InvalidDocument(
            "document id must not be empty".to_owned(),
        ));
    }
    Ok(())
}

/// Map store errors that have a dedicated document error.
pub(crate) fn map_store_error(err: StoreError) -> DocumentError {
    if err.code == StoreErrorCode::IdempotentParameterMismatchException {
        warn!(message = %err.message, "idempotency token reused with a different batch");
        return DocumentError::IdempotentParameterMismatch(err.message);
    }
    DocumentError::Store(err)
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Validates and commits transactional batches.
#[derive(Debug)]
pub struct TransactionCoordinator<'a, C> {
    client: &'a C,
    config: &'a DocumentConfig,
    collections: &'a CollectionRegistry,
}

impl<'a, C: StoreClient> TransactionCoordinator<'a, C> {
    /// Create a coordinator over registered collections.
    #[must_use]
    pub fn new(
        client: &'a C,
        config: &'a DocumentConfig,
        collections: &'a CollectionRegistry,
    ) -> Self {
        Self {
            client,
            config,
            collections,
        }
    }

    /// Commit `requests` atomically.
    ///
    /// Every validation failure is reported before the store is called. Store
    /// errors are returned unchanged, except an idempotency mismatch which
    /// maps to [`DocumentError::IdempotentParameterMismatch`].
    pub async fn commit(
        &self,
        requests: &[TransactionWriteRequest],
        options: &TransactOptions,
    ) -> DocumentResult<()> {
        let input = self.prepare(requests, options)?;
        debug!(
            items = input.transact_items.len(),
            token = ?input.client_request_token,
            "submitting transaction"
        );

        self.client
            .transact_write_items(input)
            .await
            .map_err(map_store_error)?;

        info!(items = requests.len(), "transaction committed");
        Ok(())
    }

    /// Validate `requests` and build the store request without sending it.
    pub fn prepare(
        &self,
        requests: &[TransactionWriteRequest],
        options: &TransactOptions,
    ) -> DocumentResult<TransactWriteItemsInput> {
        self.validate_shape(requests, options)?;

        let mut targets = HashSet::with_capacity(requests.len());
        let mut transact_items = Vec::with_capacity(requests.len());
        for (i, request) in requests.iter().enumerate() {
            let collection = lookup(self.collections, request.collection())?;
            let id = match request {
                TransactionWriteRequest::Insert { document, .. }
                | TransactionWriteRequest::Replace { document, .. } => {
                    document_id(document, self.config)?
                }
                TransactionWriteRequest::Update { id, .. }
                | TransactionWriteRequest::Delete { id, .. } => id.clone(),
            };
            if !targets.insert((collection.name.clone(), id.clone())) {
                return Err(DocumentError::TransactionValidation(format!(
                    "request {i} ({}) targets {}/{id}, which an earlier request already targets",
                    request.kind(),
                    collection.name
                )));
            }
            transact_items.push(self.build(collection, &id, request)?);
        }

        Ok(TransactWriteItemsInput {
            transact_items,
            client_request_token: options.idempotency_token.clone(),
        })
    }

    fn validate_shape(
        &self,
        requests: &[TransactionWriteRequest],
        options: &TransactOptions,
    ) -> DocumentResult<()> {
        if requests.is_empty() {
            return Err(DocumentError::TransactionValidation(
                "a transaction needs at least one request".to_owned(),
            ));
        }
        if requests.len() > self.config.max_transaction_items {
            return Err(DocumentError::TransactionValidation(format!(
                "{} requests exceed the limit of {}",
                requests.len(),
                self.config.max_transaction_items
            )));
        }
        if let Some(token) = &options.idempotency_token {
            let len = token.chars().count();
            if len == 0 || len > MAX_TOKEN_LEN {
                return Err(DocumentError::TransactionValidation(format!(
                    "idempotency token must be 1 to {MAX_TOKEN_LEN} characters, got {len}"
                )));
            }
        }
        Ok(())
    }

    fn build(
        &self,
        collection: &Collection,
        id: &str,
        request: &TransactionWriteRequest,
    ) -> DocumentResult<TransactWriteItem> {
        let item = match request {
            TransactionWriteRequest::Insert {
                document,
                condition,
                ..
            } => TransactWriteItem {
                put: Some(build_put(
                    collection,
                    document,
                    true,
                    condition.as_ref(),
                    self.config,
                )?),
                ..Default::default()
            },
            TransactionWriteRequest::Replace {
                document,
                condition,
                ..
            } => TransactWriteItem {
                put: Some(build_put(
                    collection,
                    document,
                    false,
                    condition.as_ref(),
                    self.config,
                )?),
                ..Default::default()
            },
            TransactionWriteRequest::Update {
                updates, condition, ..
            } => TransactWriteItem {
                update: Some(build_update(
                    collection,
                    id,
                    updates,
                    condition.as_ref(),
                    self.config,
                )?),
                ..Default::default()
            },
            TransactionWriteRequest::Delete { condition, .. } => TransactWriteItem {
                delete: Some(build_delete(
                    collection,
                    id,
                    condition.as_ref(),
                    self.config,
                )?),
                ..Default::default()
            },
        };
        Ok(item)
    }
}
