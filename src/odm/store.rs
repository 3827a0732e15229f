//! Storage backend contract for the ODM.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::odm::error::StoreError;
use crate::odm::filter::{Filter, SortKey};
use crate::odm::id::DocumentId;

/// A stored document as plain JSON: `_id`, the model fields, `createdAt`
/// and `updatedAt`.
pub type RawDocument = Map<String, Value>;

/// Parameters of a collection scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindSpec {
    pub filter: Filter,
    /// Sort keys applied in order; documents tie-break on `_id`.
    pub sort: Vec<SortKey>,
    pub skip: u64,
    pub limit: Option<u64>,
}

/// Number of documents held by one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    pub name: String,
    pub documents: u64,
}

/// Document storage backend.
///
/// Collections are created implicitly by the first insert. Implementations
/// must be safe to share across tasks.
///
/// # Implementations
///
/// - [`crate::infrastructure::persistence::PgDocumentStore`] - PostgreSQL `JSONB` table
/// - [`crate::infrastructure::persistence::MemoryStore`] - in-process maps
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a new document.
    ///
    /// `unique` lists top-level fields whose values no other document of the
    /// collection may share. Documents without such a field are exempt.
    ///
    /// # Errors
    ///
    /// - [`StoreError::DuplicateKey`] if `id` is already present
    /// - [`StoreError::UniqueViolation`] if a `unique` field value is taken
    async fn insert(
        &self,
        collection: &str,
        id: DocumentId,
        doc: RawDocument,
        unique: &[&'static str],
    ) -> Result<(), StoreError>;

    /// Replaces an existing document if its stored `__v` still equals
    /// `expected_version`. A stored document without `__v` counts as
    /// version 0. Returns `false` if the document does not exist.
    ///
    /// # Errors
    ///
    /// - [`StoreError::VersionConflict`] if another write got there first
    /// - [`StoreError::UniqueViolation`] if a `unique` field value is taken
    async fn replace(
        &self,
        collection: &str,
        id: DocumentId,
        expected_version: u64,
        doc: RawDocument,
        unique: &[&'static str],
    ) -> Result<bool, StoreError>;

    async fn find(&self, collection: &str, spec: &FindSpec)
    -> Result<Vec<RawDocument>, StoreError>;

    /// Fetches the documents with the given ids, in no particular order.
    /// Unknown ids are skipped.
    async fn find_by_ids(
        &self,
        collection: &str,
        ids: &[DocumentId],
    ) -> Result<Vec<RawDocument>, StoreError>;

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    /// Deletes one document. Returns `false` if it does not exist.
    async fn delete(&self, collection: &str, id: DocumentId) -> Result<bool, StoreError>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn collections(&self) -> Result<Vec<CollectionStats>, StoreError>;

    /// Removes every document of a collection and returns how many were removed.
    async fn drop_collection(&self, collection: &str) -> Result<u64, StoreError>;

    /// Releases the backend's resources. Later calls fail with
    /// [`StoreError::Closed`].
    async fn close(&self);
}
