//! In-memory backing store for docstack.
//!
//! [`MemoryStore`] implements [`docstack_model::StoreClient`] over
//! concurrent maps. It understands the expression subset the document engine
//! emits (`SET`/`REMOVE` updates and `attribute_exists`, `attribute_not_exists`,
//! `=`, `<>`, `AND`, `OR`, `NOT` conditions), applies transactions all or
//! nothing, and honours client request tokens within a configurable window.
//!
//! ```
//! use docstack_memory::MemoryStore;
//!
//! let store = MemoryStore::default();
//! store.create_table("documents", "pk", Some("sk")).unwrap();
//! assert!(store.scan("documents").unwrap().is_empty());
//! ```
#![allow(clippy::doc_markdown)]

pub mod config;
pub mod expression;
pub mod provider;
pub mod state;

pub use config::MemoryStoreConfig;
pub use provider::MemoryStore;
