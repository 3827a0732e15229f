//! HTTP error translation.
//!
//! Every failure raised while handling a request ends up as an [`AppError`],
//! which renders as `{"error": "<message>"}` with one of these statuses:
//!
//! | Variant | Status | Raised for |
//! |---|---|---|
//! | [`AppError::BadRequest`] | 400 | malformed input, invalid ids, validation failures, rule violations |
//! | [`AppError::NotFound`] | 404 | missing resources, unknown routes |
//! | [`AppError::Conflict`] | 409 | documents still contended after every save retry |
//! | [`AppError::Internal`] | 500 | everything else |
//!
//! Internal errors are logged and counted; their cause never reaches the client.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::any::Any;
use validator::ValidationErrors;

use crate::odm::{InvalidId, ModelError};

/// Message returned for every 500 response.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message as sent to the client.
    pub fn message(&self) -> &str {
        match self {
            AppError::BadRequest(message)
            | AppError::NotFound(message)
            | AppError::Conflict(message) => message,
            AppError::Internal(_) => INTERNAL_ERROR_MESSAGE,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::BadRequest(m)
            | AppError::NotFound(m)
            | AppError::Conflict(m)
            | AppError::Internal(m) => f.write_str(m),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            AppError::Internal(cause) => {
                tracing::error!(error = %cause, "Request failed with internal error");
                metrics::counter!("http_errors_total", "kind" => "internal").increment(1);
            }
            AppError::BadRequest(message) => {
                tracing::debug!(error = %message, "Rejected bad request");
                metrics::counter!("http_errors_total", "kind" => "bad_request").increment(1);
            }
            AppError::NotFound(_) => {
                metrics::counter!("http_errors_total", "kind" => "not_found").increment(1);
            }
            AppError::Conflict(message) => {
                tracing::warn!(error = %message, "Gave up on contended document");
                metrics::counter!("http_errors_total", "kind" => "conflict").increment(1);
            }
        }

        let body = ErrorBody {
            error: self.message().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ModelError> for AppError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::Validation(_)
            | ModelError::InvalidId(_)
            | ModelError::UnknownReference { .. }
            | ModelError::InvalidProjection(_) => AppError::BadRequest(e.to_string()),
            ModelError::NotFound { .. } => AppError::NotFound(e.to_string()),
            ModelError::Conflict { .. } => AppError::Conflict(e.to_string()),
            ModelError::UnknownModel(_)
            | ModelError::DuplicateModel(_)
            | ModelError::Encode { .. }
            | ModelError::Decode { .. }
            | ModelError::Store(_) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(e: ValidationErrors) -> Self {
        ModelError::from(e).into()
    }
}

impl From<InvalidId> for AppError {
    fn from(e: InvalidId) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// Turns a handler panic caught by `CatchPanicLayer` into a 500 response.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    AppError::internal(format!("handler panicked: {detail}")).into_response()
}
