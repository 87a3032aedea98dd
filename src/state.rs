use std::sync::Arc;

use crate::{
    auth::{JwtKeys, PasswordHasher},
    config::AppConfig,
    db,
    users::{PgUserRepository, UserRepository, UserService},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub keys: JwtKeys,
    pub users: UserService,
}

impl AppState {
    /// Connects to Postgres, applies migrations and wires the production store.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let pool = db::connect(&config).await?;
        db::migrate(&pool).await?;
        let repo = Arc::new(PgUserRepository::new(pool)) as Arc<dyn UserRepository>;
        Self::from_parts(config, repo)
    }

    pub fn from_parts(config: Arc<AppConfig>, repo: Arc<dyn UserRepository>) -> anyhow::Result<Self> {
        let keys = JwtKeys::new(&config.jwt);
        let hasher = PasswordHasher::new(config.password)?;
        let users = UserService::new(repo, hasher, keys.clone(), config.policy);
        Ok(Self {
            config,
            keys,
            users,
        })
    }

    /// Creates the configured bootstrap admin, if any.
    pub async fn bootstrap(&self) -> anyhow::Result<()> {
        if let Some(admin) = &self.config.bootstrap_admin {
            self.users
                .ensure_admin(&admin.username, &admin.password)
                .await
                .map_err(|e| anyhow::anyhow!("bootstrap admin: {e}"))?;
        }
        Ok(())
    }
}
