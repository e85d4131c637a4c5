//! Backing-store model types for docstack.
//!
//! These types describe the requests the document engine sends to a
//! DynamoDB-shaped key-value store: typed attribute values, item CRUD and
//! transactional-write inputs, their outputs, and the store error taxonomy.
//! The [`StoreClient`] trait is the single outbound seam; any store that can
//! honour these inputs (a real network client or the in-memory store) plugs
//! in behind it.
// "DynamoDB" appears in a number of doc comments in this crate.
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]

pub mod attribute_value;
pub mod client;
pub mod error;
pub mod input;
pub mod operations;
pub mod output;
pub mod types;

pub use attribute_value::AttributeValue;
pub use client::StoreClient;
pub use error::{StoreError, StoreErrorCode};
pub use operations::StoreOperation;
pub use types::Item;
