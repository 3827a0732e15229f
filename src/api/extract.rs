//! Request extractors whose rejections are [`AppError`]s.
//!
//! Axum's own `Json` and `Query` reject with plain-text bodies; these
//! wrappers route every malformed body or query string through the same
//! `{"error": ...}` translation as handler failures.

use axum::extract::FromRequest;
use axum::extract::FromRequestParts;

use crate::error::AppError;
use crate::odm::DocumentId;

/// JSON body extractor.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Query string extractor.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

/// Single path segment extractor.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

/// Parses a document id taken from the URL.
pub fn parse_id(raw: &str) -> Result<DocumentId, AppError> {
    Ok(raw.parse::<DocumentId>()?)
}
