//! Document collections over a DynamoDB-shaped key-value store.
//!
//! Documents are stored one item per document under a wrapper attribute,
//! next to the primary key and every secondary-index key derived from the
//! collection's access patterns. The engine keeps those derived keys
//! consistent:
//!
//! - [`composite`] assembles multi-field key values into a single escaped
//!   string per key attribute.
//! - [`expression`] compiles sparse partial updates into one collision-safe
//!   `SET`/`REMOVE` mutation covering the document and its index keys.
//! - [`transaction`] validates and submits heterogeneous write batches as one
//!   atomic, idempotent store call.
//!
//! [`DocumentStore`] ties these together behind a small async API.
#![allow(clippy::doc_markdown, clippy::module_name_repetitions)]

pub mod collection;
pub mod composite;
pub mod config;
pub mod error;
pub mod expression;
pub mod keypath;
pub mod marshal;
pub mod store;
pub mod transaction;

pub use collection::{AccessPattern, Collection, CollectionRegistry, IndexLayout, TableLayout};
pub use composite::{CompositeKey, KeyPart, KeyRole};
pub use config::DocumentConfig;
pub use error::{DocumentError, DocumentResult};
pub use expression::{
    Condition, FieldUpdate, MutationPlan, NameSession, Updates, compile, compile_guarded,
};
pub use keypath::{KeyPath, PathMatch};
pub use store::DocumentStore;
pub use transaction::{TransactOptions, TransactionCoordinator, TransactionWriteRequest};
