//! The in-memory [`StoreClient`].

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use docstack_model::input::{
    DeleteItemInput, GetItemInput, PutItemInput, TransactWriteItemsInput, UpdateItemInput,
};
use docstack_model::output::{
    DeleteItemOutput, GetItemOutput, PutItemOutput, TransactWriteItemsOutput, UpdateItemOutput,
};
use docstack_model::types::{CancellationReason, TransactWriteItem};
use docstack_model::{AttributeValue, Item, StoreClient, StoreError, StoreErrorCode, StoreOperation};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::MemoryStoreConfig;
use crate::expression::ast::UpdateExpr;
use crate::expression::{EvalContext, parse_condition, parse_update};
use crate::state::{KeySchema, MemoryServiceState, MemoryTable, PrimaryKey};

/// A remembered client request token.
#[derive(Debug, Clone)]
struct TokenRecord {
    fingerprint: String,
    recorded_at: DateTime<Utc>,
}

/// What a validated write will do once every condition has passed.
#[derive(Debug)]
struct PendingWrite {
    table: Arc<MemoryTable>,
    key: PrimaryKey,
    /// `None` deletes the item.
    item: Option<Item>,
}

/// An in-memory, DynamoDB-shaped store.
///
/// Writes are serialised behind a single gate so that transactions apply
/// atomically; reads go straight to the tables. Every call is recorded and
/// can be inspected with [`MemoryStore::operations`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    config: MemoryStoreConfig,
    state: MemoryServiceState,
    write_gate: Mutex<()>,
    tokens: DashMap<String, TokenRecord>,
    operations: Mutex<Vec<StoreOperation>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(config: MemoryStoreConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Create a table with the given key attributes.
    pub fn create_table(
        &self,
        name: &str,
        partition_attr: &str,
        sort_attr: Option<&str>,
    ) -> Result<(), StoreError> {
        let key_schema = KeySchema {
            partition_attr: partition_attr.to_owned(),
            sort_attr: sort_attr.map(str::to_owned),
        };
        self.state
            .create_table(MemoryTable::new(name, key_schema))?;
        info!(table = name, "created table");
        Ok(())
    }

    /// Every item of a table, in no particular order.
    pub fn scan(&self, table_name: &str) -> Result<Vec<Item>, StoreError> {
        Ok(self.state.require_table(table_name)?.scan())
    }

    /// Operations received so far, in order.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOperation> {
        self.operations.lock().clone()
    }

    fn record(&self, op: StoreOperation) {
        debug!(operation = %op, "store call");
        self.operations.lock().push(op);
    }
}

// ---------------------------------------------------------------------------
// Single-item operations
// ---------------------------------------------------------------------------

impl MemoryStore {
    fn handle_get_item(&self, input: &GetItemInput) -> Result<GetItemOutput, StoreError> {
        let table = self.state.require_table(&input.table_name)?;
        let key = table.key_schema.extract(&input.key)?;
        Ok(GetItemOutput {
            item: table.get(&key),
        })
    }

    fn handle_put_item(&self, input: PutItemInput) -> Result<PutItemOutput, StoreError> {
        let _gate = self.write_gate.lock();
        let table = self.state.require_table(&input.table_name)?;
        let key = table.key_schema.extract(&input.item)?;
        let existing = table.get(&key);
        check_condition(
            existing.as_ref(),
            input.condition_expression.as_deref(),
            &input.expression_attribute_names,
            &input.expression_attribute_values,
        )?;
        table.put(key, input.item);
        Ok(PutItemOutput {})
    }

    fn handle_update_item(&self, input: UpdateItemInput) -> Result<UpdateItemOutput, StoreError> {
        let _gate = self.write_gate.lock();
        let table = self.state.require_table(&input.table_name)?;
        let key = table.key_schema.extract(&input.key)?;
        let existing = table.get(&key);
        check_condition(
            existing.as_ref(),
            input.condition_expression.as_deref(),
            &input.expression_attribute_names,
            &input.expression_attribute_values,
        )?;
        let updated = apply_update(
            &table.key_schema,
            &key,
            existing,
            &input.update_expression,
            &input.expression_attribute_names,
            &input.expression_attribute_values,
        )?;
        let attributes = input.return_all_new.unwrap_or(false).then(|| updated.clone());
        table.put(key, updated);
        Ok(UpdateItemOutput { attributes })
    }

    fn handle_delete_item(&self, input: DeleteItemInput) -> Result<DeleteItemOutput, StoreError> {
        let _gate = self.write_gate.lock();
        let table = self.state.require_table(&input.table_name)?;
        let key = table.key_schema.extract(&input.key)?;
        let existing = table.get(&key);
        check_condition(
            existing.as_ref(),
            input.condition_expression.as_deref(),
            &input.expression_attribute_names,
            &input.expression_attribute_values,
        )?;
        table.remove(&key);
        Ok(DeleteItemOutput {})
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

impl MemoryStore {
    fn handle_transact_write_items(
        &self,
        input: &TransactWriteItemsInput,
    ) -> Result<TransactWriteItemsOutput, StoreError> {
        let count = input.transact_items.len();
        if count == 0 || count > self.config.max_transaction_items {
            return Err(StoreError::validation(format!(
                "1 validation error detected: Value at 'transactItems' failed to satisfy \
                 constraint: Member must have length between 1 and {}",
                self.config.max_transaction_items
            )));
        }

        let _gate = self.write_gate.lock();

        let token_record = match &input.client_request_token {
            Some(token) => {
                let digest = fingerprint(input)?;
                if self.replayed(token, &digest)? {
                    debug!(token = %token, "replayed transaction ignored");
                    return Ok(TransactWriteItemsOutput {});
                }
                Some((token.clone(), digest))
            }
            None => None,
        };

        let mut seen = HashSet::with_capacity(count);
        let mut reasons = Vec::with_capacity(count);
        let mut pending = Vec::with_capacity(count);
        let mut failed = false;

        for entry in &input.transact_items {
            let (table_name, target) = entry.target().ok_or_else(|| {
                StoreError::validation(
                    "TransactItems can only contain one of Put, Update or Delete per item",
                )
            })?;
            let table = self.state.require_table(table_name)?;
            let key = table.key_schema.extract(target.attributes())?;
            if !seen.insert((table_name.to_owned(), key.clone())) {
                return Err(StoreError::validation(
                    "Transaction request cannot include multiple operations on one item",
                ));
            }

            let existing = table.get(&key);
            match prepare_write(&table, key, existing, entry)? {
                Some(write) => {
                    reasons.push(CancellationReason::none());
                    pending.push(write);
                }
                None => {
                    failed = true;
                    reasons.push(CancellationReason::from_code(
                        StoreErrorCode::ConditionalCheckFailedException,
                        "The conditional request failed",
                    ));
                }
            }
        }

        if failed {
            info!(items = count, "transaction canceled");
            return Err(StoreError::transaction_canceled(reasons));
        }

        for write in pending {
            match write.item {
                Some(item) => write.table.put(write.key, item),
                None => {
                    write.table.remove(&write.key);
                }
            }
        }

        if let Some((token, digest)) = token_record {
            self.tokens.insert(
                token,
                TokenRecord {
                    fingerprint: digest,
                    recorded_at: Utc::now(),
                },
            );
        }
        info!(items = count, "transaction applied");
        Ok(TransactWriteItemsOutput {})
    }

    /// Returns `true` if `token` was already used for this exact batch inside
    /// the idempotency window.
    fn replayed(&self, token: &str, fingerprint: &str) -> Result<bool, StoreError> {
        let now = Utc::now();
        let window = self.config.idempotency_window;
        self.tokens.retain(|_, record| {
            now.signed_duration_since(record.recorded_at)
                .to_std()
                .is_ok_and(|age| age < window)
        });

        match self.tokens.get(token) {
            Some(record) if record.fingerprint == fingerprint => Ok(true),
            Some(_) => {
                warn!(token, "client request token reused with different parameters");
                Err(StoreError::idempotent_parameter_mismatch(
                    "Request with the same client token was submitted with different parameters",
                ))
            }
            None => Ok(false),
        }
    }
}

/// SHA-256 over the canonical request payload, excluding the token itself.
fn fingerprint(input: &TransactWriteItemsInput) -> Result<String, StoreError> {
    let payload = input
        .payload_bytes()
        .map_err(|e| StoreError::internal_error(format!("cannot serialize request: {e}")))?;
    Ok(hex::encode(Sha256::digest(&payload)))
}

/// Check conditions and compute the resulting item. `Ok(None)` means the
/// entry's condition failed.
fn prepare_write(
    table: &Arc<MemoryTable>,
    key: PrimaryKey,
    existing: Option<Item>,
    entry: &TransactWriteItem,
) -> Result<Option<PendingWrite>, StoreError> {
    let (condition, names, values) = if let Some(put) = &entry.put {
        (
            &put.condition_expression,
            &put.expression_attribute_names,
            &put.expression_attribute_values,
        )
    } else if let Some(update) = &entry.update {
        (
            &update.condition_expression,
            &update.expression_attribute_names,
            &update.expression_attribute_values,
        )
    } else if let Some(delete) = &entry.delete {
        (
            &delete.condition_expression,
            &delete.expression_attribute_names,
            &delete.expression_attribute_values,
        )
    } else {
        return Err(StoreError::validation("empty transaction item"));
    };

    match check_condition(existing.as_ref(), condition.as_deref(), names, values) {
        Ok(()) => {}
        Err(e) if e.code == StoreErrorCode::ConditionalCheckFailedException => return Ok(None),
        Err(e) => return Err(e),
    }

    let item = if let Some(put) = &entry.put {
        Some(put.item.clone())
    } else if let Some(update) = &entry.update {
        Some(apply_update(
            &table.key_schema,
            &key,
            existing,
            &update.update_expression,
            names,
            values,
        )?)
    } else {
        None
    };

    Ok(Some(PendingWrite {
        table: Arc::clone(table),
        key,
        item,
    }))
}

// ---------------------------------------------------------------------------
// Expression helpers
// ---------------------------------------------------------------------------

fn check_condition(
    existing: Option<&Item>,
    condition: Option<&str>,
    names: &BTreeMap<String, String>,
    values: &BTreeMap<String, AttributeValue>,
) -> Result<(), StoreError> {
    let Some(condition) = condition else {
        return Ok(());
    };
    let expr = parse_condition(condition)
        .map_err(|e| StoreError::validation(format!("Invalid ConditionExpression: {e}")))?;
    let empty = Item::new();
    let ctx = EvalContext {
        item: existing.unwrap_or(&empty),
        names,
        values,
    };
    let passed = ctx
        .evaluate(&expr)
        .map_err(|e| StoreError::validation(format!("Invalid ConditionExpression: {e}")))?;
    if passed {
        Ok(())
    } else {
        Err(StoreError::conditional_check_failed(
            "The conditional request failed",
        ))
    }
}

fn apply_update(
    schema: &KeySchema,
    key: &PrimaryKey,
    existing: Option<Item>,
    expression: &str,
    names: &BTreeMap<String, String>,
    values: &BTreeMap<String, AttributeValue>,
) -> Result<Item, StoreError> {
    let update = parse_update(expression)
        .map_err(|e| StoreError::validation(format!("Invalid UpdateExpression: {e}")))?;
    let base = existing.unwrap_or_else(|| key.to_item(schema));
    let ctx = EvalContext {
        item: &base,
        names,
        values,
    };
    reject_key_updates(schema, &ctx, &update)?;
    ctx.apply_update(&update)
        .map_err(|e| StoreError::validation(format!("Invalid UpdateExpression: {e}")))
}

fn reject_key_updates(
    schema: &KeySchema,
    ctx: &EvalContext<'_>,
    update: &UpdateExpr,
) -> Result<(), StoreError> {
    for path in update.targets() {
        let names = ctx
            .resolve_names(path)
            .map_err(|e| StoreError::validation(format!("Invalid UpdateExpression: {e}")))?;
        if let [name] = names.as_slice()
            && schema.is_key_attribute(name)
        {
            return Err(StoreError::validation(format!(
                "One or more parameter values were invalid: Cannot update attribute {name}. \
                 This attribute is part of the key"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// StoreClient
// ---------------------------------------------------------------------------

#[async_trait]
impl StoreClient for MemoryStore {
    async fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput, StoreError> {
        self.record(StoreOperation::GetItem);
        self.handle_get_item(&input)
    }

    async fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput, StoreError> {
        self.record(StoreOperation::PutItem);
        self.handle_put_item(input)
    }

    async fn update_item(&self, input: UpdateItemInput) -> Result<UpdateItemOutput, StoreError> {
        self.record(StoreOperation::UpdateItem);
        self.handle_update_item(input)
    }

    async fn delete_item(&self, input: DeleteItemInput) -> Result<DeleteItemOutput, StoreError> {
        self.record(StoreOperation::DeleteItem);
        self.handle_delete_item(input)
    }

    async fn transact_write_items(
        &self,
        input: TransactWriteItemsInput,
    ) -> Result<TransactWriteItemsOutput, StoreError> {
        self.record(StoreOperation::TransactWriteItems);
        self.handle_transact_write_items(&input)
    }
}
