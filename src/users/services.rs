use std::sync::Arc;

use anyhow::Context;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use super::{
    dto::{LoginRequest, RegisterRequest, UpdateUserRequest},
    repo::{RepoError, UserRepository},
    repo_types::{NewUser, Role, User},
};
use crate::{
    auth::{password::PasswordHasher, AuthUser, JwtKeys},
    config::{PolicyConfig, RegistrationPolicy, UpdatePolicy},
    error::{AppError, AppResult},
};

const INVALID_CREDENTIALS: &str = "invalid username or password";

/// Register / login / profile / update rules over a [`UserRepository`].
#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    hasher: PasswordHasher,
    keys: JwtKeys,
    policy: PolicyConfig,
}

impl UserService {
    pub fn new(
        repo: Arc<dyn UserRepository>,
        hasher: PasswordHasher,
        keys: JwtKeys,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            repo,
            hasher,
            keys,
            policy,
        }
    }

    /// Creates a `user`-role account. Under the admin registration policy the
    /// caller must be an authenticated admin.
    #[instrument(skip(self, input), fields(username = %input.username))]
    pub async fn register(
        &self,
        caller: Option<&AuthUser>,
        input: RegisterRequest,
    ) -> AppResult<User> {
        if self.policy.registration == RegistrationPolicy::Admin {
            let caller = caller.ok_or_else(|| {
                AppError::Unauthorized("authorization header is required".into())
            })?;
            let acting = self.load_caller(caller).await?;
            if !acting.role.is_admin() {
                warn!(caller = %acting.uuid, "non-admin attempted to register a user");
                return Err(AppError::Forbidden("only admins can register users".into()));
            }
        }

        // Fast path only; the store's unique constraint settles races.
        if self.repo.find_by_username(&input.username).await?.is_some() {
            warn!("username already registered");
            return Err(AppError::Conflict("username already exists".into()));
        }

        let user = self.create(input.username, input.password, Role::User).await?;
        info!(user_uuid = %user.uuid, username = %user.username, "user registered");
        Ok(user)
    }

    /// Ensures an admin account called `username` exists. An existing account is left as is.
    #[instrument(skip(self, password))]
    pub async fn ensure_admin(&self, username: &str, password: &str) -> AppResult<()> {
        if self.repo.find_by_username(username).await?.is_some() {
            info!("bootstrap admin already present");
            return Ok(());
        }
        match self
            .create(username.to_string(), password.to_string(), Role::Admin)
            .await
        {
            Ok(user) => {
                info!(user_uuid = %user.uuid, "bootstrap admin created");
                Ok(())
            }
            Err(AppError::Conflict(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Verifies credentials and returns the user with a freshly signed token.
    #[instrument(skip(self, input), fields(username = %input.username))]
    pub async fn login(&self, input: LoginRequest) -> AppResult<(User, String)> {
        let user = self
            .authenticate(&input.username, input.password)
            .await?
            .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.into()))?;

        let token = self.keys.issue(user.uuid).context("sign session token")?;
        info!(user_uuid = %user.uuid, "user logged in");
        Ok((user, token))
    }

    #[instrument(skip(self))]
    pub async fn profile(&self, caller: &AuthUser) -> AppResult<User> {
        self.repo
            .find_by_uuid(caller.uuid)
            .await?
            .ok_or_else(|| AppError::NotFound("user not found".into()))
    }

    /// Applies an update according to the configured [`UpdatePolicy`].
    #[instrument(skip(self, input))]
    pub async fn update(&self, caller: &AuthUser, input: UpdateUserRequest) -> AppResult<User> {
        if !input.has_changes() {
            return Err(AppError::BadRequest("nothing to update".into()));
        }
        match self.policy.update {
            UpdatePolicy::SelfService => self.update_self(caller, input).await,
            UpdatePolicy::Credential => self.update_with_credentials(caller, input).await,
        }
    }

    async fn update_self(&self, caller: &AuthUser, input: UpdateUserRequest) -> AppResult<User> {
        let user = self.profile(caller).await?;
        if input.role.is_some() {
            warn!(user_uuid = %user.uuid, "attempt to change own role");
            return Err(AppError::Forbidden("you cannot change your own role".into()));
        }
        self.apply_changes(user, input.new_username, input.new_password, None)
            .await
    }

    async fn update_with_credentials(
        &self,
        caller: &AuthUser,
        input: UpdateUserRequest,
    ) -> AppResult<User> {
        let acting = self
            .repo
            .find_by_uuid(caller.uuid)
            .await?
            .ok_or_else(|| AppError::NotFound("user not found".into()))?;

        let (Some(username), Some(password)) = (input.username, input.password) else {
            return Err(AppError::BadRequest(
                "username and password of the account to update are required".into(),
            ));
        };

        let target = self
            .authenticate(&username, password)
            .await?
            .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.into()))?;

        if input.role.is_some() {
            if !acting.role.is_admin() {
                warn!(caller = %acting.uuid, target = %target.uuid, "non-admin attempted role change");
                return Err(AppError::Forbidden("only admins can change roles".into()));
            }
            if acting.uuid == target.uuid {
                warn!(caller = %acting.uuid, "admin attempted to change own role");
                return Err(AppError::Forbidden("you cannot change your own role".into()));
            }
        }

        self.apply_changes(target, input.new_username, input.new_password, input.role)
            .await
    }

    async fn apply_changes(
        &self,
        mut user: User,
        new_username: Option<String>,
        new_password: Option<String>,
        role: Option<Role>,
    ) -> AppResult<User> {
        if let Some(new_username) = new_username {
            if let Some(existing) = self.repo.find_by_username(&new_username).await? {
                if existing.uuid != user.uuid {
                    return Err(AppError::Conflict("username already exists".into()));
                }
            }
            if new_username == user.username {
                return Err(AppError::BadRequest(
                    "new username must be different from the current one".into(),
                ));
            }
            user.username = new_username;
        }

        if let Some(new_password) = new_password {
            if self.verify(new_password.clone(), user.password_hash.clone()).await? {
                return Err(AppError::BadRequest(
                    "new password must be different from the current one".into(),
                ));
            }
            user.password_hash = self.hash(new_password).await?;
        }

        if let Some(role) = role {
            user.role = role;
        }

        user.updated_at = OffsetDateTime::now_utc();
        let stored = self.repo.update(&user).await?;
        info!(user_uuid = %stored.uuid, username = %stored.username, role = %stored.role, "user updated");
        Ok(stored)
    }

    /// Hashes once and inserts. Duplicate usernames surface as `Conflict`.
    async fn create(&self, username: String, password: String, role: Role) -> AppResult<User> {
        let password_hash = self.hash(password).await?;
        let new_user = NewUser::new(username, password_hash, role)?;
        match self.repo.create(&new_user).await {
            Ok(user) => Ok(user),
            Err(RepoError::Conflict) => {
                Err(AppError::Conflict("username already exists".into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// `None` for an unknown user and for a wrong password alike.
    async fn authenticate(&self, username: &str, password: String) -> AppResult<Option<User>> {
        let Some(user) = self.repo.find_by_username(username).await? else {
            warn!("login unknown username");
            return Ok(None);
        };
        if !self.verify(password, user.password_hash.clone()).await? {
            warn!(user_uuid = %user.uuid, "login invalid password");
            return Ok(None);
        }
        Ok(Some(user))
    }

    async fn load_caller(&self, caller: &AuthUser) -> AppResult<User> {
        self.repo
            .find_by_uuid(caller.uuid)
            .await?
            .ok_or_else(|| AppError::Unauthorized("invalid or expired token".into()))
    }

    async fn hash(&self, password: String) -> AppResult<String> {
        let hasher = self.hasher.clone();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .context("password hashing task")??;
        Ok(hash)
    }

    async fn verify(&self, password: String, hash: String) -> AppResult<bool> {
        let hasher = self.hasher.clone();
        let ok = tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .context("password verification task")?;
        Ok(ok)
    }
}
