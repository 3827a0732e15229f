//! Process-wide binding of model names to collections.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::odm::error::ModelError;
use crate::odm::model::Model;

/// A field of a model that holds references to another model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefPath {
    /// Dotted path of the field; arrays along the path are traversed.
    pub path: &'static str,
    /// Name of the referenced model.
    pub target: &'static str,
    /// `true` when the field holds a list of references.
    pub many: bool,
}

impl RefPath {
    pub const fn one(path: &'static str, target: &'static str) -> Self {
        Self {
            path,
            target,
            many: false,
        }
    }

    pub const fn many(path: &'static str, target: &'static str) -> Self {
        Self {
            path,
            target,
            many: true,
        }
    }
}

/// Registration record of one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    pub name: &'static str,
    pub collection: &'static str,
    pub references: Vec<RefPath>,
}

impl ModelDescriptor {
    pub fn reference(&self, path: &str) -> Option<&RefPath> {
        self.references.iter().find(|r| r.path == path)
    }
}

/// Registry of every model known to an [`crate::odm::Odm`].
///
/// Model names and collection names are both unique: two models can never
/// share storage, and a name always resolves to one collection.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<&'static str, ModelDescriptor>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers model `M`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::DuplicateModel`] if the name or the collection
    /// is already taken.
    pub fn register<M: Model>(&mut self) -> Result<&mut Self, ModelError> {
        if self.models.contains_key(M::NAME) {
            return Err(ModelError::DuplicateModel(M::NAME.to_string()));
        }
        if self.models.values().any(|m| m.collection == M::COLLECTION) {
            return Err(ModelError::DuplicateModel(M::COLLECTION.to_string()));
        }

        self.models.insert(
            M::NAME,
            ModelDescriptor {
                name: M::NAME,
                collection: M::COLLECTION,
                references: M::references(),
            },
        );
        tracing::debug!(model = M::NAME, collection = M::COLLECTION, "Model registered");

        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&ModelDescriptor> {
        self.models.get(name)
    }

    /// Returns the descriptor of `M`, checking it was registered as declared.
    pub fn descriptor<M: Model>(&self) -> Result<&ModelDescriptor, ModelError> {
        self.models
            .get(M::NAME)
            .filter(|d| d.collection == M::COLLECTION)
            .ok_or_else(|| ModelError::UnknownModel(M::NAME.to_string()))
    }

    /// Checks that every reference points at a registered model.
    pub fn check_references(&self) -> Result<(), ModelError> {
        for model in self.models.values() {
            for reference in &model.references {
                if !self.models.contains_key(reference.target) {
                    return Err(ModelError::UnknownModel(reference.target.to_string()));
                }
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
