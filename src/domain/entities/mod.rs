//! Core domain entities representing the stored records.
//!
//! Each entity is an ODM schema: a plain struct whose serde shape and
//! `validator` constraints define what may be stored, bound to a collection
//! through [`crate::odm::Model`].
//!
//! # Entity Types
//!
//! - [`User`] - A registered user with an embedded [`Profile`]
//! - [`Post`] - A blog post referencing its author, with embedded [`Comment`]s
//!   and a many-to-many list of likes
//!
//! `UserPatch` and `PostPatch` carry partial updates; `None` fields are left
//! unchanged.

pub mod post;
pub mod user;

pub use post::{Comment, Post, PostPatch, PostStatus};
pub use user::{Profile, Role, User, UserPatch};

use crate::odm::{ModelError, ModelRegistry};

/// Registers every domain model.
pub fn register_models(registry: &mut ModelRegistry) -> Result<(), ModelError> {
    registry.register::<User>()?.register::<Post>()?;
    Ok(())
}
