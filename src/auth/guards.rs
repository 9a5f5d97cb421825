use chrono::Utc;
use okapi::openapi3::{Object, Responses, SecurityRequirement, SecurityScheme, SecuritySchemeData};
use rocket::Request;
use rocket::State;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};

use crate::auth::jwt::{IdentityClaims, JwtService, TokenKind};
use crate::auth::policy::{RoutePolicies, RoutePolicy};
use crate::auth::{AuthError, AuthState};
use crate::error::error_responses;

const BEARER_SCHEME: &str = "Bearer";
const SECURITY_SCHEME_NAME: &str = "BearerAuth";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Unauthenticated,
    Forbidden,
    /// Auth state was not managed; a deployment error rather than a client one.
    Unavailable,
}

impl Denial {
    pub fn into_error(self) -> AuthError {
        match self {
            Denial::Unauthenticated => AuthError::Unauthenticated,
            Denial::Forbidden => AuthError::Forbidden,
            Denial::Unavailable => AuthError::Config("auth state is not managed".into()),
        }
    }
}

/// Terminal state of one access-guard evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// `None` for public routes, where no token is looked at.
    Allowed(Option<IdentityClaims>),
    Denied(Denial),
}

/// Stateless per-request authorization check.
pub struct AccessGuard<'a> {
    jwt_service: &'a JwtService,
    admin_role: &'a str,
}

impl<'a> AccessGuard<'a> {
    pub fn new(jwt_service: &'a JwtService, admin_role: &'a str) -> Self {
        Self {
            jwt_service,
            admin_role,
        }
    }

    /// Decide whether a request carrying `authorization` may reach a route
    /// guarded by `policy`, as of `now` (unix seconds).
    pub fn evaluate(&self, policy: RoutePolicy, authorization: Option<&str>, now: i64) -> Decision {
        if policy == RoutePolicy::Public {
            log::debug!("public endpoint accessed, bypassing token validation");
            return Decision::Allowed(None);
        }

        let Some(token) = bearer_token(authorization) else {
            log::warn!("no bearer token provided in Authorization header");
            return Decision::Denied(Denial::Unauthenticated);
        };

        let claims = match self.jwt_service.decode_at(TokenKind::Access, token, now) {
            Ok(claims) => claims,
            Err(err) => {
                log::warn!("access token rejected: {}", err);
                return Decision::Denied(Denial::Unauthenticated);
            }
        };

        if policy == RoutePolicy::AdminOnly && claims.role != self.admin_role {
            log::warn!(
                "user {} with role {} attempted to access an admin-only endpoint",
                claims.identifier,
                claims.role
            );
            return Decision::Denied(Denial::Forbidden);
        }

        log::debug!(
            "access token accepted for user {} with role {}",
            claims.identifier,
            claims.role
        );
        Decision::Allowed(Some(claims))
    }
}

/// Extract the token from `Bearer <token>`; the scheme literal is case-sensitive.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let (scheme, token) = header?.split_once(' ')?;
    if scheme == BEARER_SCHEME && !token.is_empty() && !token.contains(char::is_whitespace) {
        Some(token)
    } else {
        None
    }
}

/// Guard outcome memoised in the request-local cache.
#[derive(Debug, Clone)]
pub struct GuardVerdict {
    pub policy: RoutePolicy,
    pub decision: Decision,
}

impl GuardVerdict {
    pub fn label(&self) -> &'static str {
        match &self.decision {
            Decision::Allowed(None) => "public",
            Decision::Allowed(Some(_)) => "allowed",
            Decision::Denied(Denial::Unauthenticated) => "unauthenticated",
            Decision::Denied(Denial::Forbidden) => "forbidden",
            Decision::Denied(Denial::Unavailable) => "unavailable",
        }
    }
}

async fn evaluate_request(request: &Request<'_>) -> GuardVerdict {
    let route_name = request.route().and_then(|route| route.name.as_deref());
    let policy = match request.rocket().state::<RoutePolicies>() {
        Some(policies) => policies.resolve(route_name),
        None => RoutePolicy::Authenticated,
    };

    let Some(auth_state) = request.guard::<&State<AuthState>>().await.succeeded() else {
        log::error!("AuthState missing from managed state");
        return GuardVerdict {
            policy,
            decision: Decision::Denied(Denial::Unavailable),
        };
    };

    let guard = AccessGuard::new(&auth_state.jwt_service, &auth_state.config.admin_role);
    let decision = guard.evaluate(
        policy,
        request.headers().get_one("Authorization"),
        Utc::now().timestamp(),
    );

    GuardVerdict { policy, decision }
}

/// Result of running the matched route's access policy.
///
/// Handlers receive the decoded identity through this value rather than
/// reading it back off the request.
#[derive(Debug, Clone)]
pub struct AccessContext {
    pub policy: RoutePolicy,
    pub identity: Option<IdentityClaims>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AccessContext {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let verdict = request
            .local_cache_async(async { Some(evaluate_request(request).await) })
            .await;

        match verdict {
            Some(GuardVerdict {
                policy,
                decision: Decision::Allowed(identity),
            }) => Outcome::Success(AccessContext {
                policy: *policy,
                identity: identity.clone(),
            }),
            Some(GuardVerdict {
                decision: Decision::Denied(denial),
                ..
            }) => {
                let err = denial.into_error();
                Outcome::Error((err.status(), err))
            }
            None => {
                let err = Denial::Unavailable.into_error();
                Outcome::Error((err.status(), err))
            }
        }
    }
}

/// Authenticated caller; fails with 401 when the route yielded no identity.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub IdentityClaims);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CurrentUser {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match AccessContext::from_request(request).await {
            Outcome::Success(AccessContext {
                identity: Some(claims),
                ..
            }) => Outcome::Success(CurrentUser(claims)),
            Outcome::Success(_) => {
                Outcome::Error((Status::Unauthorized, AuthError::Unauthenticated))
            }
            Outcome::Error(err) => Outcome::Error(err),
            Outcome::Forward(_) => {
                Outcome::Error((Status::Unauthorized, AuthError::Unauthenticated))
            }
        }
    }
}

fn bearer_security_input() -> RequestHeaderInput {
    let scheme = SecurityScheme {
        description: Some("Access token issued by `POST /auth/login`.".to_owned()),
        data: SecuritySchemeData::Http {
            scheme: "bearer".to_owned(),
            bearer_format: Some("JWT".to_owned()),
        },
        extensions: Object::default(),
    };
    let mut requirement = SecurityRequirement::new();
    requirement.insert(SECURITY_SCHEME_NAME.to_owned(), Vec::new());
    RequestHeaderInput::Security(SECURITY_SCHEME_NAME.to_owned(), scheme, requirement)
}

impl<'a> OpenApiFromRequest<'a> for AccessContext {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(bearer_security_input())
    }

    fn get_responses(generator: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        error_responses(generator, &[401, 403])
    }
}

impl<'a> OpenApiFromRequest<'a> for CurrentUser {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(bearer_security_input())
    }

    fn get_responses(generator: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        error_responses(generator, &[401, 403])
    }
}
