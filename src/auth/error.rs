use rocket::http::Status;
use thiserror::Error;

use crate::users::RepositoryError;

pub type AuthResult<T> = Result<T, AuthError>;

/// Internal auth failure taxonomy.
///
/// Variants carry enough detail for server-side diagnostics. Only
/// [`AuthError::status`] and [`AuthError::public_message`] ever reach a client,
/// and both collapse the token variants into one generic answer.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("token expired")]
    TokenExpired,
    #[error("token invalid: {0}")]
    TokenInvalid(&'static str),
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("forbidden")]
    Forbidden,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("argon2 parameter error: {0}")]
    Argon2(String),
    #[error("password hashing error: {0}")]
    PasswordHash(String),
    #[error("bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl AuthError {
    pub fn status(&self) -> Status {
        match self {
            AuthError::InvalidCredentials
            | AuthError::TokenExpired
            | AuthError::TokenInvalid(_)
            | AuthError::Unauthenticated => Status::Unauthorized,
            AuthError::Forbidden => Status::Forbidden,
            AuthError::Config(_)
            | AuthError::Repository(_)
            | AuthError::Jwt(_)
            | AuthError::Argon2(_)
            | AuthError::PasswordHash(_)
            | AuthError::Bcrypt(_)
            | AuthError::Join(_) => Status::InternalServerError,
        }
    }

    /// Message safe to serialise into a response body.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "Invalid credentials",
            AuthError::TokenExpired | AuthError::TokenInvalid(_) | AuthError::Unauthenticated => {
                "Unauthorized"
            }
            AuthError::Forbidden => "Forbidden",
            _ => "Internal server error",
        }
    }

    /// True for the negative outcomes the auth core expects during normal operation.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials
                | AuthError::TokenExpired
                | AuthError::TokenInvalid(_)
                | AuthError::Unauthenticated
                | AuthError::Forbidden
        )
    }
}

impl From<argon2::Error> for AuthError {
    fn from(err: argon2::Error) -> Self {
        AuthError::Argon2(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::PasswordHash(err.to_string())
    }
}
