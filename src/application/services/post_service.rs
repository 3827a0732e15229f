//! Post management service: posts, comments and likes.

use serde_json::Value;
use validator::Validate;

use crate::application::services::{USER_SUMMARY_FIELDS, rule_violation};
use crate::domain::entities::{Comment, Post, PostPatch, PostStatus, User};
use crate::error::AppError;
use crate::odm::{Direction, DocumentId, Filter, ID_KEY, ModelError, ModelHandle, Odm, Ref};

/// Criteria for listing posts. Every set field must match.
#[derive(Debug, Clone, Default)]
pub struct PostListFilter {
    pub author: Option<DocumentId>,
    pub tag: Option<String>,
    pub status: Option<PostStatus>,
    /// Resolve `author` into a user summary.
    pub populate: bool,
    /// Projection applied to each post, e.g. `"title tags"`.
    pub fields: Option<String>,
}

impl PostListFilter {
    fn to_filter(&self) -> Filter {
        let mut filter = Filter::new();
        if let Some(author) = self.author {
            filter = filter.eq("author", author);
        }
        if let Some(tag) = &self.tag {
            filter = filter.eq("tags", tag.as_str());
        }
        if let Some(status) = self.status {
            filter = filter.eq("status", status.as_str());
        }
        filter
    }
}

/// Service for posts and the interactions embedded in them.
///
/// Edits of an existing post go through [`ModelHandle::modify`], so
/// concurrent comments and likes on the same post are all kept.
#[derive(Clone)]
pub struct PostService {
    posts: ModelHandle<Post>,
    users: ModelHandle<User>,
}

impl PostService {
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownModel`] if `User` or `Post` is not registered.
    pub fn new(odm: &Odm) -> Result<Self, ModelError> {
        Ok(Self {
            posts: odm.model::<Post>()?,
            users: odm.model::<User>()?,
        })
    }

    /// Validates and stores a new post.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::BadRequest`] if the data violates the schema or
    /// `author` does not reference an existing user.
    pub async fn create(&self, post: Post) -> Result<Value, AppError> {
        post.validate()?;
        if !self.user_exists(post.author.id()).await? {
            return Err(rule_violation("author", "does not reference an existing user"));
        }

        let doc = self.posts.create(post).await?;
        tracing::info!(id = %doc.id(), author = %doc.author.id(), "Post created");
        self.load(doc.id()).await
    }

    /// Returns one page of posts, newest first, and the total match count.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::BadRequest`] if `fields` is not a valid projection.
    pub async fn list(
        &self,
        criteria: &PostListFilter,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<Value>, u64), AppError> {
        let filter = criteria.to_filter();
        let total = self.posts.count(&filter).await?;

        let mut query = self
            .posts
            .find(filter)
            .sort("createdAt", Direction::Descending)
            .skip(offset)
            .limit(limit)
            .lean();
        if criteria.populate {
            query = query.populate_select("author", USER_SUMMARY_FIELDS);
        }
        if let Some(fields) = &criteria.fields {
            query = query.select(fields.as_str());
        }

        Ok((query.exec().await?, total))
    }

    /// Loads a post with its author, comment authors and likes resolved to
    /// user summaries.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if no post has this id.
    pub async fn get(&self, id: DocumentId) -> Result<Value, AppError> {
        self.load(id).await
    }

    async fn load(&self, id: DocumentId) -> Result<Value, AppError> {
        self.posts
            .find_by_id(id)
            .populate_select("author", USER_SUMMARY_FIELDS)
            .populate_select("comments.author", USER_SUMMARY_FIELDS)
            .populate_select("likes", USER_SUMMARY_FIELDS)
            .lean()
            .exec_one()
            .await?
            .ok_or_else(|| AppError::not_found(format!("Post `{id}` not found")))
    }

    pub async fn update(&self, id: DocumentId, patch: PostPatch) -> Result<Value, AppError> {
        self.posts
            .modify(id, |post| {
                patch.clone().apply(post);
                true
            })
            .await?;
        tracing::info!(%id, "Post updated");
        self.load(id).await
    }

    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if no post has this id.
    pub async fn delete(&self, id: DocumentId) -> Result<(), AppError> {
        if !self.posts.delete_by_id(id).await? {
            return Err(AppError::not_found(format!("Post `{id}` not found")));
        }
        tracing::info!(%id, "Post deleted");
        Ok(())
    }

    /// Appends a comment by `author`.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotFound`] if no post has this id
    /// - [`AppError::BadRequest`] if the text is invalid or `author` is unknown
    pub async fn add_comment(
        &self,
        id: DocumentId,
        author: DocumentId,
        text: String,
    ) -> Result<Value, AppError> {
        self.posts.get(id).await?;
        if !self.user_exists(author).await? {
            return Err(rule_violation("author", "does not reference an existing user"));
        }

        self.posts
            .modify(id, |post| {
                post.comments.push(Comment::new(Ref::new(author), text.clone()));
                true
            })
            .await?;
        tracing::debug!(%id, %author, "Comment added");
        self.load(id).await
    }

    /// Records that `user` likes the post. Liking twice has no effect.
    pub async fn like(&self, id: DocumentId, user: DocumentId) -> Result<Value, AppError> {
        self.posts.get(id).await?;
        if !self.user_exists(user).await? {
            return Err(rule_violation("user", "does not reference an existing user"));
        }

        self.posts.modify(id, |post| post.like(Ref::new(user))).await?;
        self.load(id).await
    }

    /// Removes the like of `user`. Unliking a post that was not liked has no effect.
    pub async fn unlike(&self, id: DocumentId, user: DocumentId) -> Result<Value, AppError> {
        self.posts.modify(id, |post| post.unlike(Ref::new(user))).await?;
        self.load(id).await
    }

    async fn user_exists(&self, id: DocumentId) -> Result<bool, AppError> {
        Ok(self.users.exists(&Filter::new().eq(ID_KEY, id)).await?)
    }
}
