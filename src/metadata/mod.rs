//! Listing metadata storage layer.
//!
//! The document store keeps listing records as JSON objects grouped into
//! collections.  The [`store::DocumentStore`] trait defines the interface;
//! [`sqlite::SqliteDocumentStore`] is the default implementation and
//! [`memory::MemoryDocumentStore`] backs tests and ephemeral runs.

pub mod memory;
pub mod sqlite;
pub mod store;
