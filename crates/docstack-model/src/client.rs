//! The outbound store client seam.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::input::{
    DeleteItemInput, GetItemInput, PutItemInput, TransactWriteItemsInput, UpdateItemInput,
};
use crate::output::{
    DeleteItemOutput, GetItemOutput, PutItemOutput, TransactWriteItemsOutput, UpdateItemOutput,
};

/// A DynamoDB-shaped store the document engine writes through.
///
/// Implementations own retries and transport; the engine issues each call
/// exactly once and propagates whatever error comes back.
#[async_trait]
pub trait StoreClient: Send + Sync + 'static {
    /// Fetch a single item by primary key.
    async fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput, StoreError>;

    /// Write a full item, optionally guarded by a condition.
    async fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput, StoreError>;

    /// Apply an update expression to a single item.
    async fn update_item(&self, input: UpdateItemInput) -> Result<UpdateItemOutput, StoreError>;

    /// Delete a single item, optionally guarded by a condition.
    async fn delete_item(&self, input: DeleteItemInput) -> Result<DeleteItemOutput, StoreError>;

    /// Apply a batch of writes atomically.
    async fn transact_write_items(
        &self,
        input: TransactWriteItemsInput,
    ) -> Result<TransactWriteItemsOutput, StoreError>;
}
