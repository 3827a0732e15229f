//! In-process document store.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use crate::odm::filter::compare_documents;
use crate::odm::{
    CollectionStats, DocumentId, DocumentStore, Filter, FindSpec, RawDocument, StoreError,
    VERSION_KEY,
};

type Collection = BTreeMap<DocumentId, RawDocument>;

/// A [`DocumentStore`] that keeps every collection in memory.
///
/// Selected with a `memory://` connection string. Data is lost when the
/// process exits.
///
/// # Use Cases
///
/// - Local development without PostgreSQL
/// - Handler and model tests
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        debug!("Using in-memory document store");
        Self {
            collections: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

/// First of `unique` whose value in `doc` another document already holds.
/// Missing and `null` values never collide.
fn taken_field(
    docs: &Collection,
    id: DocumentId,
    doc: &RawDocument,
    unique: &[&'static str],
) -> Option<&'static str> {
    unique.iter().copied().find(|field| {
        let Some(value) = doc.get(*field).filter(|v| !v.is_null()) else {
            return false;
        };
        docs.iter()
            .any(|(other, stored)| *other != id && stored.get(*field) == Some(value))
    })
}

fn stored_version(doc: &RawDocument) -> u64 {
    doc.get(VERSION_KEY).and_then(|v| v.as_u64()).unwrap_or(0)
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(
        &self,
        collection: &str,
        id: DocumentId,
        doc: RawDocument,
        unique: &[&'static str],
    ) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();

        if docs.contains_key(&id) {
            return Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
                id,
            });
        }
        if let Some(field) = taken_field(docs, id, &doc, unique) {
            return Err(StoreError::UniqueViolation {
                collection: collection.to_string(),
                field: field.to_string(),
            });
        }
        docs.insert(id, doc);
        Ok(())
    }

    async fn replace(
        &self,
        collection: &str,
        id: DocumentId,
        expected_version: u64,
        doc: RawDocument,
        unique: &[&'static str],
    ) -> Result<bool, StoreError> {
        self.ensure_open()?;
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let Some(current) = docs.get(&id) else {
            return Ok(false);
        };

        if stored_version(current) != expected_version {
            return Err(StoreError::VersionConflict {
                collection: collection.to_string(),
                id,
            });
        }
        if let Some(field) = taken_field(docs, id, &doc, unique) {
            return Err(StoreError::UniqueViolation {
                collection: collection.to_string(),
                field: field.to_string(),
            });
        }
        docs.insert(id, doc);
        Ok(true)
    }

    async fn find(
        &self,
        collection: &str,
        spec: &FindSpec,
    ) -> Result<Vec<RawDocument>, StoreError> {
        self.ensure_open()?;
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        // BTreeMap iteration yields `_id` order, which the stable sort keeps
        // as the tie-break.
        let mut matched: Vec<&RawDocument> =
            docs.values().filter(|doc| spec.filter.matches(doc)).collect();
        if !spec.sort.is_empty() {
            matched.sort_by(|a, b| compare_documents(a, b, &spec.sort));
        }

        let skip = usize::try_from(spec.skip).unwrap_or(usize::MAX);
        let limit = spec
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);

        Ok(matched
            .into_iter()
            .skip(skip)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_by_ids(
        &self,
        collection: &str,
        ids: &[DocumentId],
    ) -> Result<Vec<RawDocument>, StoreError> {
        self.ensure_open()?;
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        Ok(ids.iter().filter_map(|id| docs.get(id).cloned()).collect())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.ensure_open()?;
        let collections = self.collections.read().await;

        Ok(collections
            .get(collection)
            .map(|docs| docs.values().filter(|doc| filter.matches(doc)).count() as u64)
            .unwrap_or(0))
    }

    async fn delete(&self, collection: &str, id: DocumentId) -> Result<bool, StoreError> {
        self.ensure_open()?;
        let mut collections = self.collections.write().await;

        Ok(collections
            .get_mut(collection)
            .is_some_and(|docs| docs.remove(&id).is_some()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.ensure_open()
    }

    async fn collections(&self) -> Result<Vec<CollectionStats>, StoreError> {
        self.ensure_open()?;
        let collections = self.collections.read().await;

        let mut stats: Vec<CollectionStats> = collections
            .iter()
            .filter(|(_, docs)| !docs.is_empty())
            .map(|(name, docs)| CollectionStats {
                name: name.clone(),
                documents: docs.len() as u64,
            })
            .collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(stats)
    }

    async fn drop_collection(&self, collection: &str) -> Result<u64, StoreError> {
        self.ensure_open()?;
        let mut collections = self.collections.write().await;

        Ok(collections
            .remove(collection)
            .map(|docs| docs.len() as u64)
            .unwrap_or(0))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        debug!("In-memory document store closed");
    }
}

/// [`MemoryStore`] that yields to the scheduler before every data call, so
/// joined tasks interleave between their reads and writes.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct YieldingStore(MemoryStore);

#[cfg(test)]
#[async_trait]
impl DocumentStore for YieldingStore {
    async fn insert(
        &self,
        collection: &str,
        id: DocumentId,
        doc: RawDocument,
        unique: &[&'static str],
    ) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.0.insert(collection, id, doc, unique).await
    }

    async fn replace(
        &self,
        collection: &str,
        id: DocumentId,
        expected_version: u64,
        doc: RawDocument,
        unique: &[&'static str],
    ) -> Result<bool, StoreError> {
        tokio::task::yield_now().await;
        self.0.replace(collection, id, expected_version, doc, unique).await
    }

    async fn find(
        &self,
        collection: &str,
        spec: &FindSpec,
    ) -> Result<Vec<RawDocument>, StoreError> {
        tokio::task::yield_now().await;
        self.0.find(collection, spec).await
    }

    async fn find_by_ids(
        &self,
        collection: &str,
        ids: &[DocumentId],
    ) -> Result<Vec<RawDocument>, StoreError> {
        tokio::task::yield_now().await;
        self.0.find_by_ids(collection, ids).await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        tokio::task::yield_now().await;
        self.0.count(collection, filter).await
    }

    async fn delete(&self, collection: &str, id: DocumentId) -> Result<bool, StoreError> {
        tokio::task::yield_now().await;
        self.0.delete(collection, id).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.0.ping().await
    }

    async fn collections(&self) -> Result<Vec<CollectionStats>, StoreError> {
        self.0.collections().await
    }

    async fn drop_collection(&self, collection: &str) -> Result<u64, StoreError> {
        self.0.drop_collection(collection).await
    }

    async fn close(&self) {
        self.0.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::odm::filter::{Direction, SortKey};
    use serde_json::{Value, json};

    fn raw(value: Value) -> RawDocument {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    async fn seeded() -> (MemoryStore, Vec<DocumentId>) {
        let store = MemoryStore::new();
        let mut ids = Vec::new();
        for (title, views) in [("b", 10), ("a", 30), ("c", 20)] {
            let id = DocumentId::generate();
            store
                .insert(
                    "posts",
                    id,
                    raw(json!({ "_id": id, "title": title, "views": views })),
                    &["title"],
                )
                .await
                .unwrap();
            ids.push(id);
        }
        (store, ids)
    }

    #[tokio::test]
    async fn test_insert_duplicate_is_rejected() {
        let (store, ids) = seeded().await;
        let result = store.insert("posts", ids[0], RawDocument::new(), &[]).await;
        assert!(matches!(result, Err(StoreError::DuplicateKey { .. })));
    }

    #[tokio::test]
    async fn test_find_default_order_is_insertion() {
        let (store, _) = seeded().await;
        let docs = store.find("posts", &FindSpec::default()).await.unwrap();
        let titles: Vec<&str> = docs.iter().map(|d| d["title"].as_str().unwrap()).collect();
        assert_eq!(titles, ["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_find_with_filter_sort_skip_limit() {
        let (store, _) = seeded().await;
        let spec = FindSpec {
            filter: Filter::new().gte("views", 20),
            sort: vec![SortKey {
                path: "views".into(),
                direction: Direction::Descending,
            }],
            skip: 1,
            limit: Some(5),
        };

        let docs = store.find("posts", &spec).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["title"], "c");
    }

    #[tokio::test]
    async fn test_find_by_ids_skips_unknown() {
        let (store, ids) = seeded().await;
        let docs = store
            .find_by_ids("posts", &[ids[2], DocumentId::generate()])
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["title"], "c");
    }

    #[tokio::test]
    async fn test_replace_and_delete() {
        let (store, ids) = seeded().await;

        assert!(
            store
                .replace("posts", ids[0], 0, raw(json!({ "title": "z" })), &[])
                .await
                .unwrap()
        );
        assert!(
            !store
                .replace("posts", DocumentId::generate(), 0, RawDocument::new(), &[])
                .await
                .unwrap()
        );

        assert!(store.delete("posts", ids[0]).await.unwrap());
        assert!(!store.delete("posts", ids[0]).await.unwrap());
        assert_eq!(store.count("posts", &Filter::new()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_replace_requires_current_version() {
        let (store, ids) = seeded().await;
        let next = |version: u64| raw(json!({ "title": "b", "__v": version }));

        assert!(store.replace("posts", ids[0], 0, next(1), &[]).await.unwrap());

        let stale = store.replace("posts", ids[0], 0, next(1), &[]).await;
        assert!(matches!(stale, Err(StoreError::VersionConflict { id, .. }) if id == ids[0]));

        assert!(store.replace("posts", ids[0], 1, next(2), &[]).await.unwrap());
        let docs = store.find_by_ids("posts", &ids[..1]).await.unwrap();
        assert_eq!(docs[0]["__v"], 2);
    }

    #[tokio::test]
    async fn test_unique_fields_are_enforced_on_write() {
        let (store, ids) = seeded().await;

        let taken = store
            .insert("posts", DocumentId::generate(), raw(json!({ "title": "a" })), &["title"])
            .await;
        assert!(matches!(
            taken,
            Err(StoreError::UniqueViolation { ref field, .. }) if field == "title"
        ));

        let renamed = store
            .replace("posts", ids[0], 0, raw(json!({ "title": "c" })), &["title"])
            .await;
        assert!(matches!(renamed, Err(StoreError::UniqueViolation { .. })));

        // Keeping its own value is not a collision.
        assert!(
            store
                .replace("posts", ids[0], 0, raw(json!({ "title": "b", "views": 1 })), &["title"])
                .await
                .unwrap()
        );
        store
            .insert("posts", DocumentId::generate(), raw(json!({ "views": 1 })), &["title"])
            .await
            .unwrap();
        assert_eq!(store.count("posts", &Filter::new()).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_collections_and_drop() {
        let (store, _) = seeded().await;

        let stats = store.collections().await.unwrap();
        assert_eq!(
            stats,
            vec![CollectionStats {
                name: "posts".into(),
                documents: 3
            }]
        );

        assert_eq!(store.drop_collection("posts").await.unwrap(), 3);
        assert!(store.collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_store_rejects_operations() {
        let (store, _) = seeded().await;
        store.close().await;

        assert!(matches!(store.ping().await, Err(StoreError::Closed)));
        assert!(matches!(
            store.find("posts", &FindSpec::default()).await,
            Err(StoreError::Closed)
        ));
    }
}
