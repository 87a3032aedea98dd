use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;
use validator::Validate;

use super::repo_types::{Role, User};

/// Request body for registration.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[serde(default)]
    #[validate(length(min = 3, max = 255))]
    pub username: String,
    #[serde(default)]
    #[validate(length(min = 6, max = 255))]
    pub password: String,
}

/// Request body for login. Only presence and the column limit are checked here;
/// anything else is a credential failure.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 255))]
    pub username: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 255))]
    pub password: String,
}

/// Request body for `PUT /api/user/update`. Empty strings count as absent.
///
/// `username`/`password` name and authenticate the target account when the
/// credential update policy is active; `new_*` and `role` are the changes.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(length(max = 255))]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(length(max = 255))]
    pub password: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(length(min = 3, max = 255))]
    pub new_username: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(length(min = 6, max = 255))]
    pub new_password: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

impl UpdateUserRequest {
    pub fn has_changes(&self) -> bool {
        self.new_username.is_some() || self.new_password.is_some() || self.role.is_some()
    }
}

fn empty_as_none<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(de)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub uuid: Uuid,
    pub username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            uuid: u.uuid,
            username: u.username,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

/// Response returned after login. `token` carries the scheme label.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub uuid: Uuid,
    pub username: String,
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_response_has_no_password() {
        let now = OffsetDateTime::now_utc();
        let response = UserResponse::from(User {
            id: 7,
            uuid: Uuid::new_v4(),
            username: "alice".into(),
            password_hash: "$argon2id$secret-hash".into(),
            role: Role::Admin,
            created_at: now,
            updated_at: now,
        });

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["username"], "alice");
        assert!(json.get("uuid").is_some());
        assert!(json.get("created_at").unwrap().is_string());
        assert!(json.get("password").is_none());
        assert!(json.get("password_hash").is_none());
        assert!(json.get("id").is_none());
        assert!(!json.to_string().contains("secret-hash"));
    }

    #[test]
    fn update_request_treats_empty_strings_as_absent() {
        let req: UpdateUserRequest =
            serde_json::from_str(r#"{"username":"","new_password":"","role":null}"#).unwrap();
        assert!(req.username.is_none());
        assert!(req.new_password.is_none());
        assert!(!req.has_changes());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn update_request_validates_present_fields() {
        let req: UpdateUserRequest =
            serde_json::from_str(r#"{"new_username":"ab","new_password":"123"}"#).unwrap();
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("new_username"));
        assert!(fields.contains_key("new_password"));
    }

    #[test]
    fn login_request_only_requires_presence() {
        let short = LoginRequest {
            username: "al".into(),
            password: "wrong".into(),
        };
        assert!(short.validate().is_ok());

        let empty = LoginRequest {
            username: String::new(),
            password: String::new(),
        };
        let errors = empty.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("username"));
        assert!(errors.field_errors().contains_key("password"));
    }

    #[test]
    fn update_target_credentials_skip_registration_minimums() {
        let req: UpdateUserRequest =
            serde_json::from_str(r#"{"username":"al","password":"pw","new_password":"secret2"}"#)
                .unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn register_request_bounds() {
        let ok = RegisterRequest {
            username: "alice".into(),
            password: "secret1".into(),
        };
        assert!(ok.validate().is_ok());

        let long = RegisterRequest {
            username: "a".repeat(256),
            password: "secret1".into(),
        };
        assert!(long.validate().is_err());
    }
}
