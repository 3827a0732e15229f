//! Handlers for user endpoints.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use serde_json::Value;

use crate::api::dto::pagination::{ListResponse, PaginationParams};
use crate::api::dto::user::UserListParams;
use crate::api::extract::{AppJson, AppPath, AppQuery, parse_id};
use crate::application::services::PostListFilter;
use crate::domain::entities::{User, UserPatch};
use crate::error::AppError;
use crate::state::AppState;

/// Lists users, oldest first.
///
/// # Endpoint
///
/// `GET /api/users?role=author&page=1&page_size=20`
pub async fn user_list_handler(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<UserListParams>,
) -> Result<Json<ListResponse>, AppError> {
    let (offset, limit) = params
        .pagination
        .validate_and_get_offset_limit()
        .map_err(AppError::bad_request)?;

    let (items, total) = state.user_service.list(params.role, offset, limit).await?;

    Ok(Json(ListResponse {
        items,
        total,
        page: params.pagination.page(),
        page_size: limit,
    }))
}

/// Creates a user.
///
/// # Endpoint
///
/// `POST /api/users`
///
/// # Errors
///
/// Returns 400 if the body is malformed, violates the schema, or reuses a
/// username or email.
pub async fn create_user_handler(
    State(state): State<AppState>,
    AppJson(user): AppJson<User>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let created = state.user_service.create(user).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/users/{id}`
pub async fn get_user_handler(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_id(&id)?;
    Ok(Json(state.user_service.get(id).await?))
}

/// Partially updates a user.
///
/// # Endpoint
///
/// `PATCH /api/users/{id}`
///
/// All fields are optional. `display_name: null` and `age: null` clear the field.
pub async fn update_user_handler(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
    AppJson(patch): AppJson<UserPatch>,
) -> Result<Json<Value>, AppError> {
    let id = parse_id(&id)?;
    Ok(Json(state.user_service.update(id, patch).await?))
}

/// Deletes a user.
///
/// # Endpoint
///
/// `DELETE /api/users/{id}`
///
/// # Errors
///
/// Returns 400 while the user still authors posts, 404 if the user does not exist.
pub async fn delete_user_handler(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    state.user_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Lists the posts of one author, newest first.
///
/// # Endpoint
///
/// `GET /api/users/{id}/posts`
pub async fn user_posts_handler(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
    AppQuery(pagination): AppQuery<PaginationParams>,
) -> Result<Json<ListResponse>, AppError> {
    let id = parse_id(&id)?;
    let (offset, limit) = pagination
        .validate_and_get_offset_limit()
        .map_err(AppError::bad_request)?;

    state.user_service.ensure_exists(id).await?;

    let criteria = PostListFilter {
        author: Some(id),
        ..PostListFilter::default()
    };
    let (items, total) = state.post_service.list(&criteria, offset, limit).await?;

    Ok(Json(ListResponse {
        items,
        total,
        page: pagination.page(),
        page_size: limit,
    }))
}
