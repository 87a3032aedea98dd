use std::{fmt, str::FromStr};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Argon2 cost factor. Defaults match `argon2::Params::DEFAULT_*`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

/// Who may create accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationPolicy {
    /// Anyone can register themselves.
    Open,
    /// Only an authenticated admin can create (invite) accounts.
    Admin,
}

/// How `PUT /api/user/update` picks and authorizes its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdatePolicy {
    /// The caller edits their own record.
    #[serde(rename = "self")]
    SelfService,
    /// The caller names a target and proves it with the target's current password.
    Credential,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PolicyConfig {
    pub registration: RegistrationPolicy,
    pub update: UpdatePolicy,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            registration: RegistrationPolicy::Admin,
            update: UpdatePolicy::Credential,
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
    pub policy: PolicyConfig,
    pub bootstrap_admin: Option<BootstrapAdmin>,
    pub host: String,
    pub port: u16,
}

/// Longest token lifetime accepted from configuration (one year).
pub const MAX_TOKEN_TTL_MINUTES: i64 = 365 * 24 * 60;

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source; `from_env` passes the process
    /// environment.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = match var("DATABASE_URL") {
            Some(url) => url,
            None => database_url_from_parts(&var)?,
        };

        // The variable is named in hours but has always been read as minutes.
        let ttl_minutes = parse(&var, "JWT_EXPIRATION_HOURS")?.unwrap_or(60);
        anyhow::ensure!(
            (1..=MAX_TOKEN_TTL_MINUTES).contains(&ttl_minutes),
            "JWT_EXPIRATION_HOURS must be between 1 and {MAX_TOKEN_TTL_MINUTES} minutes, got {ttl_minutes}"
        );
        let jwt = JwtConfig {
            secret: var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: var("JWT_ISSUER").unwrap_or_else(|| "user-accounts".into()),
            audience: var("JWT_AUDIENCE").unwrap_or_else(|| "user-accounts-api".into()),
            ttl_minutes,
        };

        let defaults = PasswordConfig::default();
        let password = PasswordConfig {
            memory_kib: parse(&var, "PASSWORD_HASH_MEMORY_KIB")?.unwrap_or(defaults.memory_kib),
            iterations: parse(&var, "PASSWORD_HASH_ITERATIONS")?.unwrap_or(defaults.iterations),
            parallelism: parse(&var, "PASSWORD_HASH_PARALLELISM")?
                .unwrap_or(defaults.parallelism),
        };

        let defaults = PolicyConfig::default();
        let policy = PolicyConfig {
            registration: parse(&var, "REGISTRATION_POLICY")?.unwrap_or(defaults.registration),
            update: parse(&var, "UPDATE_POLICY")?.unwrap_or(defaults.update),
        };

        let bootstrap_admin = match (
            var("BOOTSTRAP_ADMIN_USERNAME"),
            var("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Some(username), Some(password)) => Some(BootstrapAdmin { username, password }),
            (None, None) => None,
            _ => anyhow::bail!(
                "BOOTSTRAP_ADMIN_USERNAME and BOOTSTRAP_ADMIN_PASSWORD must be set together"
            ),
        };

        Ok(Self {
            database_url,
            db_max_connections: parse(&var, "DB_MAX_CONNECTIONS")?.unwrap_or(10),
            jwt,
            password,
            policy,
            bootstrap_admin,
            host: var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse(&var, "APP_PORT")?.unwrap_or(8080),
        })
    }
}

fn database_url_from_parts(var: &impl Fn(&str) -> Option<String>) -> anyhow::Result<String> {
    let required =
        |name: &str| var(name).with_context(|| format!("DATABASE_URL or {name} must be set"));
    Ok(format!(
        "postgres://{}:{}@{}:{}/{}",
        required("DB_USER")?,
        required("DB_PASSWORD")?,
        required("DB_HOST")?,
        var("DB_PORT").unwrap_or_else(|| "5432".into()),
        required("DB_NAME")?,
    ))
}

fn parse<T>(var: &impl Fn(&str) -> Option<String>, name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid value for {name}: {e}")),
        None => Ok(None),
    }
}

impl FromStr for RegistrationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown registration policy `{other}` (open|admin)")),
        }
    }
}

impl FromStr for UpdatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "self" => Ok(Self::SelfService),
            "credential" => Ok(Self::Credential),
            other => Err(format!("unknown update policy `{other}` (self|credential)")),
        }
    }
}
