//! Business logic services for the application layer.

pub mod post_service;
pub mod user_service;

pub use post_service::{PostListFilter, PostService};
pub use user_service::UserService;

use std::borrow::Cow;
use validator::{ValidationError, ValidationErrors};

use crate::error::AppError;

/// Fields of a user exposed when it is populated into another document.
pub const USER_SUMMARY_FIELDS: &str = "username display_name";

/// A rule spanning several records failed for `field`.
///
/// Reported like a schema violation so clients see one error shape.
pub(crate) fn rule_violation(field: &'static str, message: &'static str) -> AppError {
    let mut errors = ValidationErrors::new();
    errors.add(
        field,
        ValidationError::new("rule").with_message(Cow::Borrowed(message)),
    );
    errors.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_violation_is_bad_request() {
        let err = rule_violation("username", "is already taken");
        assert_eq!(
            err,
            AppError::BadRequest("validation failed: username: is already taken".into())
        );
    }
}
