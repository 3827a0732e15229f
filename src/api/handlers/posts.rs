//! Handlers for post, comment and like endpoints.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use serde_json::Value;

use crate::api::dto::pagination::ListResponse;
use crate::api::dto::post::{CommentRequest, CreatePostRequest, LikeRequest, PostListParams};
use crate::api::extract::{AppJson, AppPath, AppQuery, parse_id};
use crate::domain::entities::PostPatch;
use crate::error::AppError;
use crate::state::AppState;

/// Lists posts, newest first.
///
/// # Endpoint
///
/// `GET /api/posts?author=<id>&tag=rust&status=published&populate=true&fields=title,author`
///
/// # Errors
///
/// Returns 400 for an invalid author id or projection.
pub async fn post_list_handler(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<PostListParams>,
) -> Result<Json<ListResponse>, AppError> {
    let (offset, limit) = params
        .pagination
        .validate_and_get_offset_limit()
        .map_err(AppError::bad_request)?;

    let (items, total) = state
        .post_service
        .list(&params.to_filter(), offset, limit)
        .await?;

    Ok(Json(ListResponse {
        items,
        total,
        page: params.pagination.page(),
        page_size: limit,
    }))
}

/// Creates a post.
///
/// # Endpoint
///
/// `POST /api/posts`
///
/// # Errors
///
/// Returns 400 if the body violates the schema or the author does not exist.
pub async fn create_post_handler(
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreatePostRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let created = state.post_service.create(payload.into()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Returns a post with author, comment authors and likes populated.
///
/// # Endpoint
///
/// `GET /api/posts/{id}`
pub async fn get_post_handler(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_id(&id)?;
    Ok(Json(state.post_service.get(id).await?))
}

/// `PATCH /api/posts/{id}`
pub async fn update_post_handler(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
    AppJson(patch): AppJson<PostPatch>,
) -> Result<Json<Value>, AppError> {
    let id = parse_id(&id)?;
    Ok(Json(state.post_service.update(id, patch).await?))
}

/// `DELETE /api/posts/{id}`
pub async fn delete_post_handler(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    state.post_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Appends a comment.
///
/// # Endpoint
///
/// `POST /api/posts/{id}/comments`
///
/// # Request Body
///
/// ```json
/// { "author": "65a1b2c3d4e5f60718293a4b", "text": "Nice post" }
/// ```
pub async fn add_comment_handler(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
    AppJson(payload): AppJson<CommentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let id = parse_id(&id)?;
    let post = state
        .post_service
        .add_comment(id, payload.author, payload.text)
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// Likes a post. Liking twice has no further effect.
///
/// # Endpoint
///
/// `POST /api/posts/{id}/likes`
pub async fn like_post_handler(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
    AppJson(payload): AppJson<LikeRequest>,
) -> Result<Json<Value>, AppError> {
    let id = parse_id(&id)?;
    Ok(Json(state.post_service.like(id, payload.user).await?))
}

/// `DELETE /api/posts/{id}/likes`
pub async fn unlike_post_handler(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
    AppJson(payload): AppJson<LikeRequest>,
) -> Result<Json<Value>, AppError> {
    let id = parse_id(&id)?;
    Ok(Json(state.post_service.unlike(id, payload.user).await?))
}
