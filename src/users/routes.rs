use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;

use crate::auth::jwt::DEFAULT_ROLE;
use crate::auth::policy::RoutePolicy;
use crate::auth::responses::validate_credentials;
use crate::auth::service::normalize_identifier;
use crate::auth::{AccessContext, AuthState, CurrentUser};
use crate::error::ApiError;
use crate::models::{ApiResponse, PaginatedResult, PaginationParams};
use crate::users::NewUser;
use crate::users::responses::{CreateUserRequest, RoleResponse, UserResponse};

pub const ROUTE_POLICIES: &[(&str, RoutePolicy)] = &[
    ("get_me", RoutePolicy::Authenticated),
    ("list_users", RoutePolicy::AdminOnly),
    ("create_user", RoutePolicy::AdminOnly),
    ("list_roles", RoutePolicy::AdminOnly),
];

/// Profile of the authenticated caller.
#[openapi(tag = "Users")]
#[get("/user/me")]
pub async fn get_me(
    state: &State<AuthState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let record = state
        .users
        .find_by_id(user.0.subject_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(ApiResponse::ok(UserResponse::from(record))))
}

/// List users, ordered by id.
#[openapi(tag = "Users")]
#[get("/users?<params..>")]
pub async fn list_users(
    _access: AccessContext,
    state: &State<AuthState>,
    params: Option<PaginationParams>,
) -> Result<Json<ApiResponse<PaginatedResult<UserResponse>>>, ApiError> {
    let params = params.unwrap_or_default();
    let (users, total) = state.users.list_users(params.window()).await?;

    let items = users.into_iter().map(UserResponse::from).collect();
    Ok(Json(ApiResponse::ok(PaginatedResult::new(items, total, &params))))
}

/// Create a user with a named role.
#[openapi(tag = "Users")]
#[post("/users", data = "<payload>")]
pub async fn create_user(
    access: AccessContext,
    state: &State<AuthState>,
    payload: Json<CreateUserRequest>,
) -> Result<status::Custom<Json<ApiResponse<UserResponse>>>, ApiError> {
    let payload = payload.into_inner();
    validate_credentials(&payload.email, &payload.password).map_err(ApiError::BadRequest)?;

    let email = normalize_identifier(&payload.email);
    if state.users.email_exists(&email).await? {
        return Err(ApiError::Conflict("Email already in use".to_string()));
    }

    let password_hash = state
        .password_service
        .hash_password_blocking(payload.password)
        .await?;
    let role = payload
        .role
        .map(|role| role.trim().to_string())
        .filter(|role| !role.is_empty())
        .unwrap_or_else(|| DEFAULT_ROLE.to_string());

    let record = state
        .users
        .create_user(NewUser {
            email,
            password_hash,
            role: Some(role),
        })
        .await?;

    if let Some(admin) = access.identity.as_ref() {
        log::info!("user {} created by {}", record.email, admin.identifier);
    }

    Ok(status::Custom(
        Status::Created,
        Json(ApiResponse::created(UserResponse::from(record))),
    ))
}

/// List the roles a user can be assigned.
#[openapi(tag = "Users")]
#[get("/roles")]
pub async fn list_roles(
    _access: AccessContext,
    state: &State<AuthState>,
) -> Result<Json<ApiResponse<Vec<RoleResponse>>>, ApiError> {
    let roles = state.users.list_roles().await?;
    Ok(Json(ApiResponse::ok(
        roles.into_iter().map(RoleResponse::from).collect(),
    )))
}
