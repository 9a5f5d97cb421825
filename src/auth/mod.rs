//! Authentication module: configuration, credential handling, token minting,
//! route policies, Rocket request guards, and HTTP route handlers.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod guards;
pub mod jwt;
pub mod passwords;
pub mod policy;
pub mod responses;
pub mod routes;
pub mod service;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use guards::{AccessContext, CurrentUser};
pub use jwt::{IdentityClaims, JwtService};
pub use passwords::PasswordService;
pub use policy::{RoutePolicies, RoutePolicy};

use crate::users::UserRepository;

/// Shared, read-only auth collaborators managed by Rocket.
#[derive(Clone)]
pub struct AuthState {
    pub config: AuthConfig,
    pub password_service: Arc<PasswordService>,
    pub jwt_service: Arc<JwtService>,
    pub users: Arc<dyn UserRepository>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        password_service: PasswordService,
        jwt_service: JwtService,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            config,
            password_service: Arc::new(password_service),
            jwt_service: Arc::new(jwt_service),
            users,
        }
    }

    /// Build every collaborator from a validated configuration.
    pub fn from_config(config: AuthConfig, users: Arc<dyn UserRepository>) -> AuthResult<Self> {
        let password_service = PasswordService::new(config.password_scheme, config.bcrypt_cost)?;
        let jwt_service = JwtService::from_config(&config)?;
        Ok(Self::new(config, password_service, jwt_service, users))
    }
}
