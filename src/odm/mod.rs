//! Object-document mapper.
//!
//! Typed models over a JSON document store:
//!
//! - [`model`] - the [`Model`] trait, [`Document`], [`ModelHandle`] and [`Odm`]
//! - [`registry`] - unique binding of model names to collections
//! - [`query`] - lazily executed query descriptors
//! - [`filter`] / [`projection`] - query conditions, sort keys and field selection
//! - [`store`] - the [`DocumentStore`] backend contract
//! - [`id`] - [`DocumentId`] and typed references ([`Ref`])
//!
//! Schemas are plain structs validated with `validator`; a document is only
//! written after its data passes validation.

pub mod error;
pub mod filter;
pub mod id;
pub mod model;
mod populate;
pub mod projection;
pub mod query;
pub mod registry;
pub mod store;

pub use error::{ModelError, StoreError};
pub use filter::{Direction, Filter};
pub use id::{DocumentId, InvalidId, Ref};
pub use model::{Document, Model, ModelHandle, Odm};
pub use projection::Projection;
pub use query::{LeanQuery, Query};
pub use registry::{ModelDescriptor, ModelRegistry, RefPath};
pub use store::{CollectionStats, DocumentStore, FindSpec, RawDocument};

/// Key of the document id in stored and lean documents.
pub const ID_KEY: &str = "_id";
/// Key of the creation timestamp.
pub const CREATED_AT_KEY: &str = "createdAt";
/// Key of the last-save timestamp.
pub const UPDATED_AT_KEY: &str = "updatedAt";
/// Key of the revision counter, bumped by every save of an existing document.
pub const VERSION_KEY: &str = "__v";
