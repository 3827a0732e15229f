//! DTOs for post, comment and like endpoints.

use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};

use crate::api::dto::pagination::PaginationParams;
use crate::application::services::PostListFilter;
use crate::domain::entities::{Post, PostStatus};
use crate::odm::{DocumentId, Ref};

/// Body of `POST /api/posts`.
///
/// Comments and likes are added through their own endpoints.
#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub author: DocumentId,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: PostStatus,
}

impl From<CreatePostRequest> for Post {
    fn from(req: CreatePostRequest) -> Self {
        Post {
            title: req.title,
            body: req.body,
            author: Ref::new(req.author),
            tags: req.tags,
            status: req.status,
            comments: Vec::new(),
            likes: Vec::new(),
        }
    }
}

/// Query parameters of `GET /api/posts`.
#[serde_as]
#[derive(Debug, Default, Deserialize)]
pub struct PostListParams {
    #[serde(flatten)]
    pub pagination: PaginationParams,

    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub author: Option<DocumentId>,

    pub tag: Option<String>,

    pub status: Option<PostStatus>,

    /// Resolve `author` to a user summary.
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub populate: Option<bool>,

    /// Projection such as `title,tags` or `-body`.
    pub fields: Option<String>,
}

impl PostListParams {
    pub fn to_filter(&self) -> PostListFilter {
        PostListFilter {
            author: self.author,
            tag: self.tag.clone(),
            status: self.status,
            populate: self.populate.unwrap_or(false),
            fields: self.fields.clone(),
        }
    }
}

/// Body of `POST /api/posts/{id}/comments`.
#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub author: DocumentId,
    pub text: String,
}

/// Body of `POST` and `DELETE /api/posts/{id}/likes`.
#[derive(Debug, Deserialize)]
pub struct LikeRequest {
    pub user: DocumentId,
}
