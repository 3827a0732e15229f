//! User management service.

use serde_json::Value;
use validator::Validate;

use crate::application::services::rule_violation;
use crate::domain::entities::{Post, Role, User, UserPatch};
use crate::error::AppError;
use crate::odm::{Direction, DocumentId, Filter, ModelError, ModelHandle, Odm, ID_KEY};

/// Service for creating, listing, updating and deleting users.
///
/// Enforces the rules no single document can check on its own: usernames
/// and emails are unique, and a user cannot be deleted while authoring posts.
/// The lookups in [`Self::create`] and [`Self::update`] only give early
/// answers; the store rejects a taken value on write all the same.
#[derive(Clone)]
pub struct UserService {
    users: ModelHandle<User>,
    posts: ModelHandle<Post>,
}

impl UserService {
    /// Creates a new user service.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownModel`] if `User` or `Post` is not registered.
    pub fn new(odm: &Odm) -> Result<Self, ModelError> {
        Ok(Self {
            users: odm.model::<User>()?,
            posts: odm.model::<Post>()?,
        })
    }

    /// Validates and stores a new user.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::BadRequest`] if the data violates the schema or
    /// the username or email is taken.
    pub async fn create(&self, user: User) -> Result<Value, AppError> {
        user.validate()?;
        self.ensure_unique(&user, None).await?;

        let doc = self.users.create(user).await?;
        tracing::info!(id = %doc.id(), username = %doc.username, "User created");
        Ok(doc.to_value()?)
    }

    /// Returns one page of users, oldest first, and the total match count.
    pub async fn list(
        &self,
        role: Option<Role>,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<Value>, u64), AppError> {
        let mut filter = Filter::new();
        if let Some(role) = role {
            filter = filter.eq("role", role.as_str());
        }

        let total = self.users.count(&filter).await?;
        let items = self
            .users
            .find(filter)
            .sort("createdAt", Direction::Ascending)
            .skip(offset)
            .limit(limit)
            .lean()
            .exec()
            .await?;

        Ok((items, total))
    }

    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if no user has this id.
    pub async fn get(&self, id: DocumentId) -> Result<Value, AppError> {
        self.users
            .find_by_id(id)
            .lean()
            .exec_one()
            .await?
            .ok_or_else(|| AppError::not_found(format!("User `{id}` not found")))
    }

    /// Applies a partial update and saves the result.
    pub async fn update(&self, id: DocumentId, patch: UserPatch) -> Result<Value, AppError> {
        let mut candidate = self.users.get(id).await?.into_inner();
        patch.clone().apply(&mut candidate);
        candidate.validate()?;
        self.ensure_unique(&candidate, Some(id)).await?;

        let doc = self
            .users
            .modify(id, |user| {
                patch.clone().apply(user);
                true
            })
            .await?;
        tracing::info!(%id, "User updated");
        Ok(doc.to_value()?)
    }

    /// Deletes a user who authors no posts.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotFound`] if no user has this id
    /// - [`AppError::BadRequest`] if the user still authors posts
    pub async fn delete(&self, id: DocumentId) -> Result<(), AppError> {
        if !self.users.exists(&Filter::new().eq(ID_KEY, id)).await? {
            return Err(AppError::not_found(format!("User `{id}` not found")));
        }

        if self.posts.exists(&Filter::new().eq("author", id)).await? {
            return Err(AppError::bad_request(format!(
                "User `{id}` still authors posts and cannot be deleted"
            )));
        }

        if !self.users.delete_by_id(id).await? {
            return Err(AppError::not_found(format!("User `{id}` not found")));
        }
        tracing::info!(%id, "User deleted");
        Ok(())
    }

    /// Fails unless a user with this id exists.
    pub async fn ensure_exists(&self, id: DocumentId) -> Result<(), AppError> {
        if self.users.exists(&Filter::new().eq(ID_KEY, id)).await? {
            Ok(())
        } else {
            Err(AppError::not_found(format!("User `{id}` not found")))
        }
    }

    async fn ensure_unique(&self, user: &User, current: Option<DocumentId>) -> Result<(), AppError> {
        let taken = |filter: Filter| {
            let filter = match current {
                Some(id) => filter.ne(ID_KEY, id),
                None => filter,
            };
            let users = self.users.clone();
            async move { users.exists(&filter).await }
        };

        if taken(Filter::new().eq("username", user.username.as_str())).await? {
            return Err(rule_violation("username", "is already taken"));
        }
        if taken(Filter::new().eq("email", user.email.as_str())).await? {
            return Err(rule_violation("email", "is already taken"));
        }
        Ok(())
    }
}
