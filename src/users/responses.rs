use chrono::{DateTime, Utc};
use rocket_okapi::okapi::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::auth::jwt::DEFAULT_ROLE;
use crate::users::{RoleRecord, UserRecord};

/// Public projection of a user; never carries the password digest.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i32,
    pub email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl From<UserRecord> for UserResponse {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: user
                .role
                .filter(|role| !role.is_empty())
                .unwrap_or_else(|| DEFAULT_ROLE.to_string()),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoleResponse {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
}

impl From<RoleRecord> for RoleResponse {
    fn from(role: RoleRecord) -> Self {
        Self {
            id: role.id,
            name: role.name,
            description: role.description,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    /// Role name; defaults to `USER`.
    #[serde(default)]
    pub role: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(role: Option<&str>) -> UserRecord {
        UserRecord {
            id: 3,
            email: "map@example.com".into(),
            password_hash: "$2b$04$secretdigest".into(),
            role: role.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn user_response_defaults_missing_role() {
        assert_eq!(UserResponse::from(record(None)).role, "USER");
        assert_eq!(UserResponse::from(record(Some(""))).role, "USER");
        assert_eq!(UserResponse::from(record(Some("ADMIN"))).role, "ADMIN");
    }

    #[test]
    fn user_response_never_serializes_the_digest() {
        let json = serde_json::to_value(UserResponse::from(record(None))).expect("json");
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "map@example.com");
        assert!(json.get("createdAt").is_some());
    }
}
