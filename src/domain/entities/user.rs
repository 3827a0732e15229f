//! User entity.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::LazyLock;
use validator::{Validate, ValidationError};

use crate::odm::Model;

static USERNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-z0-9_]+$").expect("username pattern is valid")
});

/// Access level of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Reader,
    Author,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Reader => "reader",
            Role::Author => "author",
            Role::Admin => "admin",
        }
    }
}

/// Optional public profile embedded in a user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 280, message = "must be at most 280 characters"))]
    pub bio: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(url(message = "must be a valid URL"))]
    pub website: Option<String>,

    #[serde(default)]
    #[validate(
        length(max = 10, message = "must list at most 10 interests"),
        custom(function = "validate_interests")
    )]
    pub interests: Vec<String>,
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct User {
    #[validate(
        length(min = 3, max = 30, message = "must be 3 to 30 characters"),
        regex(
            path = *USERNAME_RE,
            message = "may only contain lowercase letters, digits and underscores"
        )
    )]
    pub username: String,

    #[validate(email(message = "must be a valid email address"))]
    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 80, message = "must be 1 to 80 characters"))]
    pub display_name: Option<String>,

    #[serde(default)]
    pub role: Role,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 13, max = 120, message = "must be between 13 and 120"))]
    pub age: Option<u8>,

    #[serde(default)]
    #[validate(nested)]
    pub profile: Profile,
}

impl Model for User {
    const NAME: &'static str = "User";
    const COLLECTION: &'static str = "users";
    const UNIQUE: &'static [&'static str] = &["username", "email"];
}

/// Partial update of a user. `None` fields are left unchanged.
///
/// `display_name: Some(None)` and `age: Some(None)` clear the field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    #[serde(default, with = "serde_with::rust::double_option")]
    pub display_name: Option<Option<String>>,
    pub role: Option<Role>,
    #[serde(default, with = "serde_with::rust::double_option")]
    pub age: Option<Option<u8>>,
    pub profile: Option<Profile>,
}

impl UserPatch {
    /// Applies the patch in place. The result still has to be validated.
    pub fn apply(self, user: &mut User) {
        if let Some(username) = self.username {
            user.username = username;
        }
        if let Some(email) = self.email {
            user.email = email;
        }
        if let Some(display_name) = self.display_name {
            user.display_name = display_name;
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        if let Some(age) = self.age {
            user.age = age;
        }
        if let Some(profile) = self.profile {
            user.profile = profile;
        }
    }
}

fn validate_interests(interests: &[String]) -> Result<(), ValidationError> {
    if interests.iter().any(|i| i.trim().is_empty()) {
        return Err(ValidationError::new("interests")
            .with_message(Cow::Borrowed("must not contain empty entries")));
    }

    let mut seen = HashSet::new();
    if !interests.iter().all(|i| seen.insert(i.as_str())) {
        return Err(ValidationError::new("interests")
            .with_message(Cow::Borrowed("must not contain duplicates")));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::odm::error::validation_messages;

    fn valid_user() -> User {
        User {
            username: "ada_l".into(),
            email: "ada@example.com".into(),
            display_name: Some("Ada Lovelace".into()),
            role: Role::Author,
            age: Some(36),
            profile: Profile {
                bio: Some("Analyst".into()),
                website: Some("https://example.com".into()),
                interests: vec!["math".into(), "engines".into()],
            },
        }
    }

    fn failing_paths(user: &User) -> Vec<String> {
        let errors = user.validate().unwrap_err();
        validation_messages(&errors)
            .into_iter()
            .map(|(path, _)| path)
            .collect()
    }

    #[test]
    fn test_valid_user_passes() {
        assert!(valid_user().validate().is_ok());
    }

    #[test]
    fn test_username_rules() {
        let mut user = valid_user();
        user.username = "ab".into();
        assert_eq!(failing_paths(&user), ["username"]);

        user.username = "Ada Lovelace".into();
        assert_eq!(failing_paths(&user), ["username"]);
    }

    #[test]
    fn test_every_failing_field_is_reported() {
        let mut user = valid_user();
        user.email = "not-an-email".into();
        user.age = Some(9);
        user.profile.website = Some("nope".into());

        assert_eq!(failing_paths(&user), ["age", "email", "profile.website"]);
    }

    #[test]
    fn test_interests_must_be_distinct() {
        let mut user = valid_user();
        user.profile.interests = vec!["math".into(), "math".into()];
        assert_eq!(failing_paths(&user), ["profile.interests"]);

        user.profile.interests = vec![" ".into()];
        assert_eq!(failing_paths(&user), ["profile.interests"]);
    }

    #[test]
    fn test_role_defaults_to_reader() {
        let user: User =
            serde_json::from_value(serde_json::json!({ "username": "bob", "email": "b@x.io" }))
                .unwrap();
        assert_eq!(user.role, Role::Reader);
        assert_eq!(user.profile, Profile::default());
    }

    #[test]
    fn test_unknown_role_is_rejected_at_decode() {
        let result: Result<User, _> = serde_json::from_value(serde_json::json!({
            "username": "bob",
            "email": "b@x.io",
            "role": "owner"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_patch_sets_and_clears() {
        let mut user = valid_user();
        let patch: UserPatch = serde_json::from_value(serde_json::json!({
            "email": "new@example.com",
            "display_name": null
        }))
        .unwrap();
        patch.apply(&mut user);

        assert_eq!(user.email, "new@example.com");
        assert_eq!(user.display_name, None);
        assert_eq!(user.age, Some(36));
    }
}
