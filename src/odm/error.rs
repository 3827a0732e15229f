//! Error types of the model and storage layers.

use validator::{ValidationErrors, ValidationErrorsKind};

use crate::odm::id::{DocumentId, InvalidId};

/// Failure reported by a [`crate::odm::DocumentStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document `{id}` already exists in `{collection}`")]
    DuplicateKey { collection: String, id: DocumentId },

    #[error("document `{id}` in `{collection}` was saved by another writer")]
    VersionConflict { collection: String, id: DocumentId },

    #[error("`{field}` must be unique in `{collection}`")]
    UniqueViolation { collection: String, field: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("document store is closed")]
    Closed,
}

/// Failure reported by models, queries and the registry.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The candidate record violates its schema.
    #[error("validation failed: {}", describe_validation(.0))]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    InvalidId(#[from] InvalidId),

    #[error("{model} `{id}` not found")]
    NotFound { model: &'static str, id: DocumentId },

    /// The document changed since it was loaded; reload and retry.
    #[error("{model} `{id}` was modified concurrently")]
    Conflict { model: &'static str, id: DocumentId },

    #[error("model `{0}` is not registered")]
    UnknownModel(String),

    #[error("model name or collection `{0}` is already registered")]
    DuplicateModel(String),

    #[error("`{path}` is not a reference path of {model}")]
    UnknownReference { model: &'static str, path: String },

    #[error("invalid projection: {0}")]
    InvalidProjection(String),

    #[error("cannot encode {model}: {source}")]
    Encode {
        model: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed document in `{collection}`: {source}")]
    Decode {
        collection: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Flattens validation errors into `(path, message)` pairs.
///
/// Nested structs use dotted paths (`profile.bio`), list items use indices
/// (`comments[0].text`). Pairs are sorted by path.
pub fn validation_messages(errors: &ValidationErrors) -> Vec<(String, String)> {
    let mut out = Vec::new();
    collect(errors, "", &mut out);
    out.sort();
    out
}

fn collect(errors: &ValidationErrors, prefix: &str, out: &mut Vec<(String, String)>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };

        match kind {
            ValidationErrorsKind::Field(items) => {
                for error in items {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| default_message(&error.code));
                    out.push((path.clone(), message));
                }
            }
            ValidationErrorsKind::Struct(inner) => collect(inner, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect(inner, &format!("{path}[{index}]"), out);
                }
            }
        }
    }
}

fn default_message(code: &str) -> String {
    match code {
        "length" => "has an invalid length".to_string(),
        "range" => "is out of range".to_string(),
        "email" => "must be a valid email address".to_string(),
        "url" => "must be a valid URL".to_string(),
        "regex" => "has an invalid format".to_string(),
        "required" => "is required".to_string(),
        other => format!("failed `{other}` check"),
    }
}

/// Renders validation errors as `path: message; path: message`.
pub fn describe_validation(errors: &ValidationErrors) -> String {
    validation_messages(errors)
        .into_iter()
        .map(|(path, message)| format!("{path}: {message}"))
        .collect::<Vec<_>>()
        .join("; ")
}
