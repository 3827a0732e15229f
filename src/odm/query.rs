//! Lazily executed query descriptors.
//!
//! A [`Query`] only records what to fetch. Refinements (`sort`, `skip`,
//! `limit`, `populate`, and `select` in lean mode) are chained onto it, and
//! the store is only touched when `exec`, `exec_one` or `count` is awaited.
//!
//! ```rust,ignore
//! let posts = odm.model::<Post>()?
//!     .find(Filter::new().eq("status", "published"))
//!     .sort("createdAt", Direction::Descending)
//!     .limit(20)
//!     .populate_select("author", "username display_name")
//!     .lean()
//!     .select("title author tags")
//!     .exec()
//!     .await?;
//! ```

use serde_json::Value;

use crate::odm::error::ModelError;
use crate::odm::filter::{Direction, Filter, SortKey};
use crate::odm::model::{Document, Model, ModelHandle};
use crate::odm::populate::{self, PopulateSpec, PreparedPopulate};
use crate::odm::projection::Projection;
use crate::odm::store::{FindSpec, RawDocument};

/// Pending retrieval of `M` documents, hydrated into [`Document<M>`].
#[must_use = "queries do nothing until executed"]
pub struct Query<M> {
    model: ModelHandle<M>,
    spec: FindSpec,
    populate: Vec<PopulateSpec>,
}

impl<M: Model> Query<M> {
    pub(crate) fn new(model: ModelHandle<M>, filter: Filter) -> Self {
        Self {
            model,
            spec: FindSpec {
                filter,
                ..FindSpec::default()
            },
            populate: Vec::new(),
        }
    }

    /// Adds a sort key. Keys apply in the order they are added.
    pub fn sort(mut self, path: impl Into<String>, direction: Direction) -> Self {
        self.spec.sort.push(SortKey {
            path: path.into(),
            direction,
        });
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.spec.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.spec.limit = Some(limit);
        self
    }

    /// Resolves the references stored at `path`.
    ///
    /// `path` must be declared in [`Model::references`]; this is checked
    /// when the query runs.
    pub fn populate(mut self, path: impl Into<String>) -> Self {
        self.populate.push(PopulateSpec {
            path: path.into(),
            select: None,
        });
        self
    }

    /// Like [`Self::populate`], projecting the referenced documents.
    pub fn populate_select(mut self, path: impl Into<String>, select: impl Into<String>) -> Self {
        self.populate.push(PopulateSpec {
            path: path.into(),
            select: Some(select.into()),
        });
        self
    }

    /// Switches to plain data mode: results are JSON values instead of
    /// [`Document`]s, and fields can be projected.
    pub fn lean(self) -> LeanQuery<M> {
        LeanQuery {
            query: self,
            select: None,
        }
    }

    pub fn filter(&self) -> &Filter {
        &self.spec.filter
    }

    /// Counts the matching documents, ignoring `skip` and `limit`.
    pub async fn count(self) -> Result<u64, ModelError> {
        self.model.count(&self.spec.filter).await
    }

    /// Runs the main fetch. Populate requests are checked first, so an
    /// unknown path or a bad selection fails before the store is queried.
    async fn fetch(&self) -> Result<(Vec<RawDocument>, Vec<PreparedPopulate>), ModelError> {
        let context = &self.model.context;
        let descriptor = context.registry.descriptor::<M>()?;
        let prepared = self
            .populate
            .iter()
            .map(|spec| populate::prepare(context, descriptor, spec))
            .collect::<Result<Vec<_>, _>>()?;

        let raws = context.store.find(M::COLLECTION, &self.spec).await?;
        tracing::trace!(model = M::NAME, found = raws.len(), "Query executed");
        Ok((raws, prepared))
    }

    pub async fn exec(self) -> Result<Vec<Document<M>>, ModelError> {
        let (raws, prepared) = self.fetch().await?;
        let mut docs = raws
            .into_iter()
            .map(Document::from_raw)
            .collect::<Result<Vec<_>, _>>()?;

        let descriptor = self.model.context.registry.descriptor::<M>()?;
        for spec in &prepared {
            populate::populate_documents(&self.model.context, descriptor, spec, &mut docs).await?;
        }
        Ok(docs)
    }

    pub async fn exec_one(self) -> Result<Option<Document<M>>, ModelError> {
        Ok(self.limit(1).exec().await?.into_iter().next())
    }
}

/// Pending retrieval of `M` documents as plain JSON.
#[must_use = "queries do nothing until executed"]
pub struct LeanQuery<M> {
    query: Query<M>,
    select: Option<String>,
}

impl<M: Model> LeanQuery<M> {
    /// Projects the results, see [`Projection::parse`] for the syntax.
    pub fn select(mut self, fields: impl Into<String>) -> Self {
        self.select = Some(fields.into());
        self
    }

    pub fn sort(mut self, path: impl Into<String>, direction: Direction) -> Self {
        self.query = self.query.sort(path, direction);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.query = self.query.skip(skip);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.query = self.query.limit(limit);
        self
    }

    pub fn populate(mut self, path: impl Into<String>) -> Self {
        self.query = self.query.populate(path);
        self
    }

    pub fn populate_select(mut self, path: impl Into<String>, select: impl Into<String>) -> Self {
        self.query = self.query.populate_select(path, select);
        self
    }

    pub async fn count(self) -> Result<u64, ModelError> {
        self.query.count().await
    }

    /// Runs the query. The projection is applied before references are
    /// populated, so unselected reference paths stay unresolved.
    pub async fn exec(self) -> Result<Vec<Value>, ModelError> {
        let projection = self.select.as_deref().map(Projection::parse).transpose()?;
        let (mut raws, prepared) = self.query.fetch().await?;

        if let Some(projection) = &projection {
            raws.iter_mut().for_each(|raw| projection.apply(raw));
        }

        let descriptor = self.query.model.context.registry.descriptor::<M>()?;
        for spec in &prepared {
            populate::populate_raw(&self.query.model.context, descriptor, spec, &mut raws).await?;
        }

        Ok(raws.into_iter().map(Value::Object).collect())
    }

    pub async fn exec_one(self) -> Result<Option<Value>, ModelError> {
        Ok(self.limit(1).exec().await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::odm::model::Odm;
    use crate::odm::registry::{ModelRegistry, RefPath};
    use crate::odm::store::MockDocumentStore;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;
    use validator::Validate;

    #[derive(Debug, Serialize, Deserialize, Validate)]
    struct Writer {
        name: String,
    }

    impl Model for Writer {
        const NAME: &'static str = "Writer";
        const COLLECTION: &'static str = "writers";
    }

    #[derive(Debug, Serialize, Deserialize, Validate)]
    struct Essay {
        title: String,
        writer: String,
    }

    impl Model for Essay {
        const NAME: &'static str = "Essay";
        const COLLECTION: &'static str = "essays";

        fn references() -> Vec<RefPath> {
            vec![RefPath::one("writer", Writer::NAME)]
        }
    }

    /// A mock without expectations panics on any store call.
    fn essays(store: MockDocumentStore) -> ModelHandle<Essay> {
        let mut registry = ModelRegistry::new();
        registry.register::<Writer>().unwrap();
        registry.register::<Essay>().unwrap();
        Odm::new(Arc::new(store), registry)
            .unwrap()
            .model::<Essay>()
            .unwrap()
    }

    #[tokio::test]
    async fn test_bad_populate_selection_fails_before_fetch() {
        let essays = essays(MockDocumentStore::new());

        let lean = essays
            .find(Filter::new())
            .populate_select("writer", "name -title")
            .lean()
            .exec()
            .await;
        assert!(matches!(lean, Err(ModelError::InvalidProjection(_))));

        let hydrated = essays
            .find(Filter::new())
            .populate_select("writer", "")
            .exec()
            .await;
        assert!(matches!(hydrated, Err(ModelError::InvalidProjection(_))));
    }

    #[tokio::test]
    async fn test_unknown_populate_path_fails_before_fetch() {
        let essays = essays(MockDocumentStore::new());

        let result = essays.find(Filter::new()).populate("title").exec().await;
        assert!(matches!(
            result,
            Err(ModelError::UnknownReference { model: "Essay", .. })
        ));
    }

    #[tokio::test]
    async fn test_query_runs_only_when_awaited() {
        let mut store = MockDocumentStore::new();
        store.expect_find().times(1).returning(|_, spec| {
            assert_eq!(spec.skip, 5);
            assert_eq!(spec.limit, Some(2));
            Ok(Vec::new())
        });
        let essays = essays(store);

        let pending = essays.find(Filter::new()).skip(5).limit(2);
        let _unused = essays.find(Filter::new()).populate("writer");
        assert!(pending.exec().await.unwrap().is_empty());
    }
}
