//! Document store implementations.
//!
//! Concrete implementations of [`crate::odm::DocumentStore`].
//!
//! # Stores
//!
//! - [`PgDocumentStore`] - PostgreSQL `JSONB` storage, used for `postgres://` URLs
//! - [`MemoryStore`] - in-process storage, used for `memory://` URLs and tests

pub mod memory_store;
pub mod pg_document_store;

pub use memory_store::MemoryStore;
pub use pg_document_store::PgDocumentStore;
