use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

/// Coarse authorization tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl Role {
    pub const fn code(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    pub const fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    /// Unknown or empty codes fall back to `User`.
    pub fn from_code(code: &str) -> Self {
        match code {
            "admin" => Role::Admin,
            "user" => Role::User,
            other => {
                warn!(role = %other, "unknown role code, treating as user");
                Role::User
            }
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A stored account. `password_hash` never holds plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,                    // internal sequence, storage only
    pub uuid: Uuid,                 // external identifier, immutable
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// A fully prepared account, ready to be inserted as-is.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub uuid: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl NewUser {
    /// Builds a new account around an already hashed password.
    pub fn new(username: String, password_hash: String, role: Role) -> anyhow::Result<Self> {
        anyhow::ensure!(!username.is_empty(), "username cannot be empty");
        anyhow::ensure!(!password_hash.is_empty(), "password hash cannot be empty");
        let now = OffsetDateTime::now_utc();
        Ok(Self {
            uuid: Uuid::new_v4(),
            username,
            password_hash,
            role,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Row as read from the `users` table.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub uuid: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            uuid: r.uuid,
            username: r.username,
            password_hash: r.password_hash,
            role: Role::from_code(&r.role),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}
