//! Fallback for unmatched routes.

use axum::extract::OriginalUri;
use axum::http::Method;

use crate::error::AppError;

/// Answers every request no route matched with a JSON 404.
///
/// Nested routers see a path with their mount point stripped, so the
/// message is built from the original URI.
pub async fn not_found_handler(method: Method, OriginalUri(uri): OriginalUri) -> AppError {
    AppError::not_found(format!("Cannot {method} {}", uri.path()))
}
