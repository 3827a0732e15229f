//! Post entity and its embedded comments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;
use validator::{Validate, ValidationError};

use crate::domain::entities::User;
use crate::odm::{Model, Ref, RefPath};

/// Publication state of a post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
            PostStatus::Archived => "archived",
        }
    }
}

/// A comment embedded in a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Comment {
    pub author: Ref<User>,

    #[validate(length(min = 1, max = 1000, message = "must be 1 to 1000 characters"))]
    pub text: String,

    pub posted_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(author: Ref<User>, text: String) -> Self {
        Self {
            author,
            text,
            posted_at: Utc::now(),
        }
    }
}

/// A blog post.
///
/// `author` is a one-to-many reference, `likes` a many-to-many one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Post {
    #[validate(length(min = 1, max = 200, message = "must be 1 to 200 characters"))]
    pub title: String,

    #[serde(default)]
    #[validate(length(max = 20000, message = "must be at most 20000 characters"))]
    pub body: String,

    pub author: Ref<User>,

    #[serde(default)]
    #[validate(
        length(max = 10, message = "must list at most 10 tags"),
        custom(function = "validate_tags")
    )]
    pub tags: Vec<String>,

    #[serde(default)]
    pub status: PostStatus,

    #[serde(default)]
    #[validate(nested)]
    pub comments: Vec<Comment>,

    #[serde(default)]
    pub likes: Vec<Ref<User>>,
}

impl Model for Post {
    const NAME: &'static str = "Post";
    const COLLECTION: &'static str = "posts";

    fn references() -> Vec<RefPath> {
        vec![
            RefPath::one("author", User::NAME),
            RefPath::one("comments.author", User::NAME),
            RefPath::many("likes", User::NAME),
        ]
    }
}

impl Post {
    /// Adds `user` to `likes`. Returns `false` if it was already there.
    pub fn like(&mut self, user: Ref<User>) -> bool {
        if self.likes.contains(&user) {
            return false;
        }
        self.likes.push(user);
        true
    }

    /// Removes `user` from `likes`. Returns `false` if it was not there.
    pub fn unlike(&mut self, user: Ref<User>) -> bool {
        let before = self.likes.len();
        self.likes.retain(|liked| *liked != user);
        self.likes.len() != before
    }
}

/// Partial update of a post. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostPatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub tags: Option<Vec<String>>,
    pub status: Option<PostStatus>,
}

impl PostPatch {
    pub fn apply(self, post: &mut Post) {
        if let Some(title) = self.title {
            post.title = title;
        }
        if let Some(body) = self.body {
            post.body = body;
        }
        if let Some(tags) = self.tags {
            post.tags = tags;
        }
        if let Some(status) = self.status {
            post.status = status;
        }
    }
}

fn validate_tags(tags: &[String]) -> Result<(), ValidationError> {
    if tags.iter().any(|t| t.trim().is_empty()) {
        return Err(
            ValidationError::new("tags").with_message(Cow::Borrowed("must not contain empty tags"))
        );
    }
    if tags.iter().any(|t| t.chars().any(char::is_uppercase)) {
        return Err(
            ValidationError::new("tags").with_message(Cow::Borrowed("must be lowercase"))
        );
    }

    let mut seen = HashSet::new();
    if !tags.iter().all(|t| seen.insert(t.as_str())) {
        return Err(
            ValidationError::new("tags").with_message(Cow::Borrowed("must not contain duplicates"))
        );
    }

    Ok(())
}
