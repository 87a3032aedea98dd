use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{NewUser, User, UserRow};
use crate::error::AppError;

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("user not found")]
    NotFound,

    #[error("username already exists")]
    Conflict,

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => RepoError::Conflict,
            other => RepoError::Database(other),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => AppError::NotFound("user not found".into()),
            RepoError::Conflict => AppError::Conflict("username already exists".into()),
            RepoError::Database(e) => AppError::Internal(anyhow::Error::new(e).context("user store")),
        }
    }
}

/// Persistence for the `users` table.
///
/// `create` and `update` must enforce username uniqueness atomically and report
/// it as [`RepoError::Conflict`]; callers rely on that rather than on a prior lookup.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepoError>;

    async fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<User>, RepoError>;

    async fn create(&self, user: &NewUser) -> Result<User, RepoError>;

    /// Writes username, password hash, role and `updated_at` of the row with `user.uuid`.
    async fn update(&self, user: &User) -> Result<User, RepoError>;
}

#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, uuid, username, password_hash, role, created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(User::from))
    }

    async fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<User>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, uuid, username, password_hash, role, created_at, updated_at
            FROM users
            WHERE uuid = $1
            "#,
        )
        .bind(uuid)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(User::from))
    }

    async fn create(&self, user: &NewUser) -> Result<User, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (uuid, username, password_hash, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, uuid, username, password_hash, role, created_at, updated_at
            "#,
        )
        .bind(user.uuid)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.role.code())
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.db)
        .await?;
        Ok(row.into())
    }

    async fn update(&self, user: &User) -> Result<User, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users
               SET username = $2, password_hash = $3, role = $4, updated_at = $5
             WHERE uuid = $1
            RETURNING id, uuid, username, password_hash, role, created_at, updated_at
            "#,
        )
        .bind(user.uuid)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.role.code())
        .bind(user.updated_at)
        .fetch_optional(&self.db)
        .await?;
        row.map(User::from).ok_or(RepoError::NotFound)
    }
}
