//! Startup tasks: wait for the database, migrate, then seed roles and the
//! initial administrator. Every step is safe to repeat on each boot.

use std::time::Duration;

use rocket_db_pools::sqlx::{self, PgPool};
use thiserror::Error;

use crate::auth::jwt::DEFAULT_ROLE;
use crate::auth::responses::validate_credentials;
use crate::auth::service::normalize_identifier;
use crate::auth::{AuthError, AuthState};
use crate::users::{NewUser, RepositoryError};

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const DEFAULT_CONNECT_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 2000;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {key}: {reason}")]
    InvalidVar { key: &'static str, reason: String },
    #[error("database unreachable after {attempts} attempts: {source}")]
    Unreachable {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
}

#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub admin_email: String,
    pub admin_password: String,
    pub connect_retries: u32,
    pub retry_delay: Duration,
}

impl BootstrapConfig {
    pub fn from_env() -> Result<Self, BootstrapError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, BootstrapError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let admin_email = lookup("ADMIN_EMAIL")
            .map(|email| normalize_identifier(&email))
            .filter(|email| !email.is_empty())
            .ok_or(BootstrapError::MissingVar("ADMIN_EMAIL"))?;
        let admin_password = lookup("ADMIN_PASSWORD")
            .filter(|password| !password.is_empty())
            .ok_or(BootstrapError::MissingVar("ADMIN_PASSWORD"))?;

        validate_credentials(&admin_email, &admin_password).map_err(|reason| {
            BootstrapError::InvalidVar {
                key: "ADMIN_EMAIL/ADMIN_PASSWORD",
                reason,
            }
        })?;

        let connect_retries = parse_or("DB_CONNECT_RETRIES", &lookup, DEFAULT_CONNECT_RETRIES)?;
        let retry_delay_ms = parse_or("DB_CONNECT_RETRY_DELAY_MS", &lookup, DEFAULT_RETRY_DELAY_MS)?;

        Ok(Self {
            admin_email,
            admin_password,
            connect_retries: connect_retries.max(1),
            retry_delay: Duration::from_millis(retry_delay_ms),
        })
    }
}

fn parse_or<T, F>(key: &'static str, lookup: &F, default: T) -> Result<T, BootstrapError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map_err(|err: T::Err| BootstrapError::InvalidVar {
                    key,
                    reason: err.to_string(),
                })
        }
        _ => Ok(default),
    }
}

/// Poll the server with `SELECT 1` until it answers or `retries` attempts fail.
pub async fn wait_for_database(
    pool: &PgPool,
    retries: u32,
    delay: Duration,
) -> Result<(), BootstrapError> {
    let mut attempt = 1;
    loop {
        match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => {
                log::info!("database reachable (attempt {}/{})", attempt, retries);
                return Ok(());
            }
            Err(err) if attempt < retries => {
                log::warn!(
                    "database not reachable (attempt {}/{}): {}; retrying in {}ms",
                    attempt,
                    retries,
                    err,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                return Err(BootstrapError::Unreachable {
                    attempts: attempt,
                    source: err,
                });
            }
        }
    }
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), BootstrapError> {
    MIGRATOR.run(pool).await?;
    Ok(())
}

/// Make sure the admin and default roles exist, then create the configured
/// administrator if no account with that email exists yet.
pub async fn seed(state: &AuthState, config: &BootstrapConfig) -> Result<(), BootstrapError> {
    let admin_role = state.config.admin_role.as_str();
    let mut roles = vec![(admin_role, "Administrator")];
    if admin_role != DEFAULT_ROLE {
        roles.push((DEFAULT_ROLE, "Standard user"));
    }
    state.users.ensure_roles(&roles).await?;

    if state.users.email_exists(&config.admin_email).await? {
        log::debug!("admin account {} already present", config.admin_email);
        return Ok(());
    }

    let password_hash = state
        .password_service
        .hash_password_blocking(config.admin_password.clone())
        .await?;

    match state
        .users
        .create_user(NewUser {
            email: config.admin_email.clone(),
            password_hash,
            role: Some(admin_role.to_string()),
        })
        .await
    {
        Ok(user) => {
            log::info!("seeded admin account {} (id {})", user.email, user.id);
            Ok(())
        }
        // Another instance won the race.
        Err(RepositoryError::DuplicateEmail(_)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}
