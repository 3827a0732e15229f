//! DTOs for user endpoints.

use serde::Deserialize;

use crate::api::dto::pagination::PaginationParams;
use crate::domain::entities::Role;

/// Query parameters of `GET /api/users`.
#[derive(Debug, Default, Deserialize)]
pub struct UserListParams {
    #[serde(flatten)]
    pub pagination: PaginationParams,

    pub role: Option<Role>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_and_pagination_parse_together() {
        let params: UserListParams =
            from_pairs(&[("role", "admin"), ("page", "2")]);
        assert_eq!(params.role, Some(Role::Admin));
        assert_eq!(params.pagination.page(), 2);
    }

    fn from_pairs(pairs: &[(&str, &str)]) -> UserListParams {
        let map: serde_json::Map<String, serde_json::Value> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect();
        serde_json::from_value(serde_json::Value::Object(map)).unwrap()
    }
}
