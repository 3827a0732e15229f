//! Models, documents and collection handles.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::odm::error::{ModelError, StoreError};
use crate::odm::filter::Filter;
use crate::odm::id::{DocumentId, Ref};
use crate::odm::query::Query;
use crate::odm::registry::{ModelRegistry, RefPath};
use crate::odm::store::{DocumentStore, RawDocument};
use crate::odm::{CREATED_AT_KEY, ID_KEY, UPDATED_AT_KEY, VERSION_KEY};

/// Attempts [`ModelHandle::modify`] makes before giving up on a document
/// that keeps being saved by other writers.
const MAX_SAVE_ATTEMPTS: u32 = 5;

/// A schema bound to a collection.
///
/// The schema itself is the implementing struct: its fields, their serde
/// representation and their `validator` constraints. `NAME` identifies the
/// model in the [`ModelRegistry`] and in reference declarations,
/// `COLLECTION` names its storage.
pub trait Model: Serialize + DeserializeOwned + Validate + Send + Sync + 'static {
    const NAME: &'static str;
    const COLLECTION: &'static str;

    /// Top-level fields whose values are unique within the collection.
    /// The store enforces this on every write.
    const UNIQUE: &'static [&'static str] = &[];

    /// Fields holding references to other models.
    fn references() -> Vec<RefPath> {
        Vec::new()
    }
}

/// A model instance together with its identity and timestamps.
///
/// Dereferences to the model data, so fields can be read and mutated
/// directly before handing the document back to [`ModelHandle::save`].
#[derive(Debug, Clone)]
pub struct Document<M> {
    id: DocumentId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
    data: M,
    is_new: bool,
    populated: BTreeMap<String, Vec<Value>>,
}

impl<M: Model> Document<M> {
    fn new(data: M) -> Self {
        let id = DocumentId::generate();
        let created = now();
        Self {
            id,
            created_at: created,
            updated_at: created,
            version: 0,
            data,
            is_new: true,
            populated: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Typed reference to this document.
    pub fn to_ref(&self) -> Ref<M> {
        Ref::new(self.id)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Number of times the document was saved after its insert.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// `true` until the document has been persisted once.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn data(&self) -> &M {
        &self.data
    }

    pub fn into_inner(self) -> M {
        self.data
    }

    /// Referenced documents resolved for `path` by
    /// [`Query::populate`], in reference order.
    pub fn populated(&self, path: &str) -> Option<&[Value]> {
        self.populated.get(path).map(Vec::as_slice)
    }

    pub(crate) fn set_populated(&mut self, path: &str, values: Vec<Value>) {
        self.populated.insert(path.to_string(), values);
    }

    /// Plain JSON form: `_id`, the model fields, `createdAt`, `updatedAt`
    /// and `__v`.
    pub fn to_value(&self) -> Result<Value, ModelError> {
        self.to_raw().map(Value::Object)
    }

    pub(crate) fn to_raw(&self) -> Result<RawDocument, ModelError> {
        let encode = |source: serde_json::Error| ModelError::Encode {
            model: M::NAME,
            source,
        };

        let Value::Object(mut raw) = serde_json::to_value(&self.data).map_err(encode)? else {
            return Err(encode(<serde_json::Error as serde::ser::Error>::custom(
                "model must serialize to a JSON object",
            )));
        };

        raw.insert(ID_KEY.to_string(), self.id.into());
        raw.insert(CREATED_AT_KEY.to_string(), timestamp_value(self.created_at));
        raw.insert(UPDATED_AT_KEY.to_string(), timestamp_value(self.updated_at));
        raw.insert(VERSION_KEY.to_string(), self.version.into());
        Ok(raw)
    }

    pub(crate) fn from_raw(mut raw: RawDocument) -> Result<Self, ModelError> {
        let decode = |source: serde_json::Error| ModelError::Decode {
            collection: M::COLLECTION,
            source,
        };

        let id: DocumentId = raw
            .remove(ID_KEY)
            .map(serde_json::from_value)
            .transpose()
            .map_err(decode)?
            .ok_or_else(|| decode(<serde_json::Error as serde::de::Error>::missing_field(ID_KEY)))?;

        let created_at = take_timestamp(&mut raw, CREATED_AT_KEY)
            .map_err(decode)?
            .unwrap_or_else(|| id.timestamp());
        let updated_at = take_timestamp(&mut raw, UPDATED_AT_KEY)
            .map_err(decode)?
            .unwrap_or(created_at);
        let version = raw
            .remove(VERSION_KEY)
            .map(serde_json::from_value::<u64>)
            .transpose()
            .map_err(decode)?
            .unwrap_or(0);

        let data = serde_json::from_value(Value::Object(raw)).map_err(decode)?;

        Ok(Self {
            id,
            created_at,
            updated_at,
            version,
            data,
            is_new: false,
            populated: BTreeMap::new(),
        })
    }
}

/// Current time at the precision timestamps are stored with.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339, so stored timestamps sort as strings.
fn timestamp_value(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Translates write failures the caller can act on.
///
/// A taken unique value reads like a schema violation of that field, a
/// stale version becomes [`ModelError::Conflict`].
fn write_error<M: Model>(error: StoreError) -> ModelError {
    match error {
        StoreError::UniqueViolation { collection, field } => {
            match M::UNIQUE.iter().copied().find(|unique| *unique == field) {
                Some(field) => {
                    let mut errors = ValidationErrors::new();
                    errors.add(
                        field,
                        ValidationError::new("unique")
                            .with_message(Cow::Borrowed("is already taken")),
                    );
                    ModelError::Validation(errors)
                }
                None => ModelError::Store(StoreError::UniqueViolation { collection, field }),
            }
        }
        StoreError::VersionConflict { id, .. } => ModelError::Conflict { model: M::NAME, id },
        other => ModelError::Store(other),
    }
}

fn take_timestamp(
    raw: &mut RawDocument,
    key: &str,
) -> Result<Option<DateTime<Utc>>, serde_json::Error> {
    raw.remove(key).map(serde_json::from_value).transpose()
}

impl<M> Deref for Document<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.data
    }
}

impl<M> DerefMut for Document<M> {
    fn deref_mut(&mut self) -> &mut M {
        &mut self.data
    }
}

/// Shared state behind every [`ModelHandle`].
#[derive(Clone)]
pub(crate) struct Context {
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) registry: Arc<ModelRegistry>,
}

/// Entry point of the ODM: a store plus the registered models.
///
/// Built once at startup and cloned into request handlers.
#[derive(Clone)]
pub struct Odm {
    context: Context,
}

impl Odm {
    /// Binds a registry to a store.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownModel`] if a model references a model
    /// that is not registered.
    pub fn new(store: Arc<dyn DocumentStore>, registry: ModelRegistry) -> Result<Self, ModelError> {
        registry.check_references()?;
        Ok(Self {
            context: Context {
                store,
                registry: Arc::new(registry),
            },
        })
    }

    /// Returns the collection handle of a registered model.
    pub fn model<M: Model>(&self) -> Result<ModelHandle<M>, ModelError> {
        self.context.registry.descriptor::<M>()?;
        Ok(ModelHandle {
            context: self.context.clone(),
            _model: PhantomData,
        })
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.context.registry
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.context.store
    }

    pub async fn ping(&self) -> Result<(), ModelError> {
        Ok(self.context.store.ping().await?)
    }

    /// Closes the underlying store.
    pub async fn close(&self) {
        self.context.store.close().await;
    }
}

/// Collection-level operations of model `M`.
pub struct ModelHandle<M> {
    pub(crate) context: Context,
    _model: PhantomData<fn() -> M>,
}

impl<M> Clone for ModelHandle<M> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            _model: PhantomData,
        }
    }
}

impl<M: Model> ModelHandle<M> {
    /// Wraps data in an unsaved document. Nothing is written until
    /// [`Self::save`].
    pub fn new_document(&self, data: M) -> Document<M> {
        Document::new(data)
    }

    /// Validates and inserts a new document.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Validation`] if `data` violates the schema.
    pub async fn create(&self, data: M) -> Result<Document<M>, ModelError> {
        let mut doc = self.new_document(data);
        self.save(&mut doc).await?;
        Ok(doc)
    }

    /// Validates and persists a document.
    ///
    /// New documents are inserted. Existing ones get a fresh `updatedAt`, a
    /// bumped `__v`, and replace the stored version only if nobody saved it
    /// since it was loaded.
    ///
    /// # Errors
    ///
    /// - [`ModelError::Validation`] if the data violates the schema or a
    ///   [`Model::UNIQUE`] field value is taken; nothing is written
    /// - [`ModelError::NotFound`] if an existing document was deleted meanwhile
    /// - [`ModelError::Conflict`] if the stored document is newer than `doc`
    pub async fn save(&self, doc: &mut Document<M>) -> Result<(), ModelError> {
        doc.data.validate()?;

        if doc.is_new {
            let raw = doc.to_raw()?;
            self.context
                .store
                .insert(M::COLLECTION, doc.id, raw, M::UNIQUE)
                .await
                .map_err(write_error::<M>)?;
            doc.is_new = false;
            tracing::debug!(model = M::NAME, id = %doc.id, "Document inserted");
            return Ok(());
        }

        let previous = (doc.updated_at, doc.version);
        doc.updated_at = now();
        doc.version += 1;

        let result = self.replace(doc, previous.1).await;
        if result.is_err() {
            (doc.updated_at, doc.version) = previous;
        }
        result
    }

    async fn replace(&self, doc: &Document<M>, expected_version: u64) -> Result<(), ModelError> {
        let raw = doc.to_raw()?;
        let replaced = self
            .context
            .store
            .replace(M::COLLECTION, doc.id, expected_version, raw, M::UNIQUE)
            .await
            .map_err(write_error::<M>)?;

        if !replaced {
            return Err(ModelError::NotFound {
                model: M::NAME,
                id: doc.id,
            });
        }
        tracing::debug!(model = M::NAME, id = %doc.id, version = doc.version, "Document updated");
        Ok(())
    }

    /// Loads a document, lets `change` mutate its data and saves it.
    ///
    /// When another writer saved the document in between, the whole cycle
    /// starts over from a fresh read, so `change` may run several times.
    /// It returns `false` to leave the document as loaded; nothing is
    /// written then.
    ///
    /// # Errors
    ///
    /// As [`Self::get`] and [`Self::save`]; [`ModelError::Conflict`] once
    /// every attempt lost the race.
    pub async fn modify<F>(&self, id: DocumentId, mut change: F) -> Result<Document<M>, ModelError>
    where
        F: FnMut(&mut M) -> bool + Send,
    {
        let mut attempt = 1;
        loop {
            let mut doc = self.get(id).await?;
            if !change(&mut doc.data) {
                return Ok(doc);
            }

            match self.save(&mut doc).await {
                Err(ModelError::Conflict { .. }) if attempt < MAX_SAVE_ATTEMPTS => {
                    tracing::debug!(model = M::NAME, %id, attempt, "Concurrent save, retrying");
                    attempt += 1;
                }
                result => return result.map(|()| doc),
            }
        }
    }

    /// Query for every document matching `filter`.
    pub fn find(&self, filter: Filter) -> Query<M> {
        Query::new(self.clone(), filter)
    }

    /// Query for the first document matching `filter`.
    pub fn find_one(&self, filter: Filter) -> Query<M> {
        self.find(filter).limit(1)
    }

    /// Query for the document with the given id.
    pub fn find_by_id(&self, id: DocumentId) -> Query<M> {
        self.find_one(Filter::new().eq(ID_KEY, id))
    }

    /// Loads a document or fails with [`ModelError::NotFound`].
    pub async fn get(&self, id: DocumentId) -> Result<Document<M>, ModelError> {
        self.find_by_id(id)
            .exec_one()
            .await?
            .ok_or(ModelError::NotFound { model: M::NAME, id })
    }

    pub async fn count(&self, filter: &Filter) -> Result<u64, ModelError> {
        Ok(self.context.store.count(M::COLLECTION, filter).await?)
    }

    pub async fn exists(&self, filter: &Filter) -> Result<bool, ModelError> {
        Ok(self.count(filter).await? > 0)
    }

    /// Deletes by id. Returns `false` if no such document exists.
    pub async fn delete_by_id(&self, id: DocumentId) -> Result<bool, ModelError> {
        let deleted = self.context.store.delete(M::COLLECTION, id).await?;
        if deleted {
            tracing::debug!(model = M::NAME, %id, "Document deleted");
        }
        Ok(deleted)
    }

    /// Deletes a loaded document.
    pub async fn delete(&self, doc: Document<M>) -> Result<(), ModelError> {
        if self.delete_by_id(doc.id).await? {
            Ok(())
        } else {
            Err(ModelError::NotFound {
                model: M::NAME,
                id: doc.id,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::MemoryStore;
    use crate::odm::store::MockDocumentStore;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
    struct Note {
        #[validate(length(min = 1, max = 20))]
        text: String,
        #[validate(range(min = 0, max = 5))]
        stars: u8,
    }

    impl Model for Note {
        const NAME: &'static str = "Note";
        const COLLECTION: &'static str = "notes";
    }

    fn odm_with(store: Arc<dyn DocumentStore>) -> Odm {
        let mut registry = ModelRegistry::new();
        registry.register::<Note>().unwrap();
        Odm::new(store, registry).unwrap()
    }

    fn note(text: &str, stars: u8) -> Note {
        Note {
            text: text.to_string(),
            stars,
        }
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let notes = odm_with(Arc::new(MemoryStore::new())).model::<Note>().unwrap();

        let created = notes.create(note("hello", 3)).await.unwrap();
        assert!(!created.is_new());

        let loaded = notes.get(created.id()).await.unwrap();
        assert_eq!(loaded.data(), &note("hello", 3));
        assert_eq!(loaded.created_at(), created.created_at());
    }

    #[tokio::test]
    async fn test_invalid_data_is_never_stored() {
        let notes = odm_with(Arc::new(MemoryStore::new())).model::<Note>().unwrap();

        let result = notes.create(note("", 9)).await;
        let Err(ModelError::Validation(errors)) = result else {
            panic!("expected validation error");
        };
        assert!(errors.field_errors().contains_key("text"));
        assert!(errors.field_errors().contains_key("stars"));
        assert_eq!(notes.count(&Filter::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mutate_then_save() {
        let notes = odm_with(Arc::new(MemoryStore::new())).model::<Note>().unwrap();

        let mut doc = notes.create(note("draft", 1)).await.unwrap();
        doc.text = "final".to_string();
        doc.stars = 5;
        notes.save(&mut doc).await.unwrap();

        let loaded = notes.get(doc.id()).await.unwrap();
        assert_eq!(loaded.text, "final");
        assert!(loaded.updated_at() >= loaded.created_at());
    }

    #[tokio::test]
    async fn test_save_rejects_invalid_mutation() {
        let notes = odm_with(Arc::new(MemoryStore::new())).model::<Note>().unwrap();

        let mut doc = notes.create(note("ok", 1)).await.unwrap();
        doc.stars = 99;
        assert!(matches!(
            notes.save(&mut doc).await,
            Err(ModelError::Validation(_))
        ));

        let loaded = notes.get(doc.id()).await.unwrap();
        assert_eq!(loaded.stars, 1);
    }

    #[tokio::test]
    async fn test_save_of_deleted_document_is_not_found() {
        let notes = odm_with(Arc::new(MemoryStore::new())).model::<Note>().unwrap();

        let mut doc = notes.create(note("gone", 1)).await.unwrap();
        assert!(notes.delete_by_id(doc.id()).await.unwrap());

        doc.stars = 2;
        assert!(matches!(
            notes.save(&mut doc).await,
            Err(ModelError::NotFound { model: "Note", .. })
        ));
    }

    #[tokio::test]
    async fn test_stale_save_is_a_conflict() {
        let notes = odm_with(Arc::new(MemoryStore::new())).model::<Note>().unwrap();
        let created = notes.create(note("shared", 1)).await.unwrap();

        let mut first = notes.get(created.id()).await.unwrap();
        let mut second = notes.get(created.id()).await.unwrap();
        first.stars = 2;
        notes.save(&mut first).await.unwrap();
        assert_eq!(first.version(), 1);

        second.stars = 3;
        assert!(matches!(
            notes.save(&mut second).await,
            Err(ModelError::Conflict { model: "Note", .. })
        ));
        assert_eq!(second.version(), 0);

        let loaded = notes.get(created.id()).await.unwrap();
        assert_eq!(loaded.stars, 2);
        assert_eq!(loaded.to_value().unwrap()["__v"], 1);
    }

    fn stored_note(id: DocumentId) -> RawDocument {
        let mut raw = RawDocument::new();
        raw.insert("_id".into(), Value::String(id.to_hex()));
        raw.insert("text".into(), Value::String("busy".into()));
        raw.insert("stars".into(), Value::from(1));
        raw
    }

    #[tokio::test]
    async fn test_modify_retries_after_conflict() {
        let id = DocumentId::generate();
        let mut store = MockDocumentStore::new();
        store
            .expect_find()
            .times(2)
            .returning(move |_, _| Ok(vec![stored_note(id)]));
        let mut conflicts = 1;
        store.expect_replace().times(2).returning(move |collection, id, _, _, _| {
            if conflicts > 0 {
                conflicts -= 1;
                return Err(StoreError::VersionConflict {
                    collection: collection.to_string(),
                    id,
                });
            }
            Ok(true)
        });

        let notes = odm_with(Arc::new(store)).model::<Note>().unwrap();
        let mut calls = 0;
        let doc = notes
            .modify(id, |note| {
                calls += 1;
                note.stars += 1;
                true
            })
            .await
            .unwrap();

        assert_eq!(calls, 2);
        assert_eq!(doc.stars, 2);
        assert_eq!(doc.version(), 1);
    }

    #[tokio::test]
    async fn test_modify_gives_up_after_repeated_conflicts() {
        let id = DocumentId::generate();
        let mut store = MockDocumentStore::new();
        store
            .expect_find()
            .times(MAX_SAVE_ATTEMPTS as usize)
            .returning(move |_, _| Ok(vec![stored_note(id)]));
        store
            .expect_replace()
            .times(MAX_SAVE_ATTEMPTS as usize)
            .returning(|collection, id, _, _, _| {
                Err(StoreError::VersionConflict {
                    collection: collection.to_string(),
                    id,
                })
            });

        let notes = odm_with(Arc::new(store)).model::<Note>().unwrap();
        assert!(matches!(
            notes.modify(id, |_| true).await,
            Err(ModelError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_modify_without_change_writes_nothing() {
        let id = DocumentId::generate();
        let mut store = MockDocumentStore::new();
        store
            .expect_find()
            .returning(move |_, _| Ok(vec![stored_note(id)]));
        store.expect_replace().never();

        let notes = odm_with(Arc::new(store)).model::<Note>().unwrap();
        let doc = notes.modify(id, |_| false).await.unwrap();
        assert_eq!(doc.text, "busy");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let notes = odm_with(Arc::new(MemoryStore::new())).model::<Note>().unwrap();
        assert!(matches!(
            notes.get(DocumentId::generate()).await,
            Err(ModelError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_lean_form_carries_identity_and_timestamps() {
        let notes = odm_with(Arc::new(MemoryStore::new())).model::<Note>().unwrap();
        let doc = notes.create(note("hi", 2)).await.unwrap();

        let value = doc.to_value().unwrap();
        assert_eq!(value["_id"], doc.id().to_hex());
        assert_eq!(value["text"], "hi");
        assert!(value.get("createdAt").is_some());
        assert!(value.get("updatedAt").is_some());
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let mut store = MockDocumentStore::new();
        store
            .expect_insert()
            .returning(|_, _, _, _| Err(StoreError::Closed));

        let notes = odm_with(Arc::new(store)).model::<Note>().unwrap();
        assert!(matches!(
            notes.create(note("x", 1)).await,
            Err(ModelError::Store(StoreError::Closed))
        ));
    }

    #[tokio::test]
    async fn test_malformed_stored_document_is_a_decode_error() {
        let mut store = MockDocumentStore::new();
        store.expect_find().returning(|_, _| {
            let mut raw = RawDocument::new();
            raw.insert("_id".into(), Value::String("65a1b2c3d4e5f60718293a4b".into()));
            raw.insert("text".into(), Value::Bool(true));
            Ok(vec![raw])
        });

        let notes = odm_with(Arc::new(store)).model::<Note>().unwrap();
        assert!(matches!(
            notes.find(Filter::new()).exec().await,
            Err(ModelError::Decode {
                collection: "notes",
                ..
            })
        ));
    }

    #[test]
    fn test_unregistered_model_handle() {
        let odm = Odm::new(Arc::new(MemoryStore::new()), ModelRegistry::new()).unwrap();
        assert!(matches!(
            odm.model::<Note>(),
            Err(ModelError::UnknownModel(_))
        ));
    }
}
