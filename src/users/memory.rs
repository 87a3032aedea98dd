use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    repo::{RepoError, UserRepository},
    repo_types::{NewUser, User},
};

#[derive(Default)]
struct Inner {
    next_id: i64,
    by_uuid: HashMap<Uuid, User>,
}

/// Process-local store with the same uniqueness rules as the `users` table.
#[derive(Default)]
pub struct InMemoryUserRepository {
    inner: Mutex<Inner>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.inner.lock().await.by_uuid.len()
    }

    /// Number of stored accounts called `username`.
    pub async fn count_username(&self, username: &str) -> usize {
        self.inner
            .lock()
            .await
            .by_uuid
            .values()
            .filter(|u| u.username == username)
            .count()
    }
}

impl Inner {
    fn username_taken(&self, username: &str, except: Option<Uuid>) -> bool {
        self.by_uuid
            .values()
            .any(|u| u.username == username && Some(u.uuid) != except)
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .by_uuid
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<User>, RepoError> {
        Ok(self.inner.lock().await.by_uuid.get(&uuid).cloned())
    }

    async fn create(&self, user: &NewUser) -> Result<User, RepoError> {
        let mut inner = self.inner.lock().await;
        if inner.username_taken(&user.username, None) || inner.by_uuid.contains_key(&user.uuid) {
            return Err(RepoError::Conflict);
        }
        inner.next_id += 1;
        let stored = User {
            id: inner.next_id,
            uuid: user.uuid,
            username: user.username.clone(),
            password_hash: user.password_hash.clone(),
            role: user.role,
            created_at: user.created_at,
            updated_at: user.updated_at,
        };
        inner.by_uuid.insert(stored.uuid, stored.clone());
        Ok(stored)
    }

    async fn update(&self, user: &User) -> Result<User, RepoError> {
        let mut inner = self.inner.lock().await;
        if inner.username_taken(&user.username, Some(user.uuid)) {
            return Err(RepoError::Conflict);
        }
        let stored = inner.by_uuid.get_mut(&user.uuid).ok_or(RepoError::NotFound)?;
        stored.username = user.username.clone();
        stored.password_hash = user.password_hash.clone();
        stored.role = user.role;
        stored.updated_at = user.updated_at;
        Ok(stored.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::Role;

    fn new_user(name: &str) -> NewUser {
        NewUser::new(name.into(), "$argon2id$stub".into(), Role::User).expect("new user")
    }

    #[tokio::test]
    async fn create_assigns_sequential_ids() {
        let repo = InMemoryUserRepository::new();
        let a = repo.create(&new_user("alice")).await.unwrap();
        let b = repo.create(&new_user("bob")).await.unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(repo.len().await, 2);
    }

    #[tokio::test]
    async fn duplicate_username_is_conflict() {
        let repo = InMemoryUserRepository::new();
        repo.create(&new_user("alice")).await.unwrap();
        let err = repo.create(&new_user("alice")).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict));
        assert_eq!(repo.count_username("alice").await, 1);
    }

    #[tokio::test]
    async fn finds_by_username_and_uuid() {
        let repo = InMemoryUserRepository::new();
        let alice = repo.create(&new_user("alice")).await.unwrap();
        assert_eq!(repo.find_by_username("alice").await.unwrap(), Some(alice.clone()));
        assert_eq!(repo.find_by_uuid(alice.uuid).await.unwrap(), Some(alice));
        assert_eq!(repo.find_by_username("nobody").await.unwrap(), None);
        assert_eq!(repo.find_by_uuid(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn update_rejects_taken_username_and_unknown_user() {
        let repo = InMemoryUserRepository::new();
        repo.create(&new_user("alice")).await.unwrap();
        let mut bob = repo.create(&new_user("bob")).await.unwrap();

        bob.username = "alice".into();
        assert!(matches!(repo.update(&bob).await.unwrap_err(), RepoError::Conflict));

        let mut ghost = bob.clone();
        ghost.uuid = Uuid::new_v4();
        ghost.username = "ghost".into();
        assert!(matches!(repo.update(&ghost).await.unwrap_err(), RepoError::NotFound));
    }

    #[tokio::test]
    async fn update_keeps_identity_fields() {
        let repo = InMemoryUserRepository::new();
        let alice = repo.create(&new_user("alice")).await.unwrap();
        let mut changed = alice.clone();
        changed.username = "alicia".into();
        changed.role = Role::Admin;
        changed.id = 999;
        let stored = repo.update(&changed).await.unwrap();
        assert_eq!(stored.id, alice.id);
        assert_eq!(stored.uuid, alice.uuid);
        assert_eq!(stored.created_at, alice.created_at);
        assert_eq!(stored.username, "alicia");
        assert_eq!(stored.role, Role::Admin);
    }
}
