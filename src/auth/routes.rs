use rocket::serde::json::Json;
use rocket::{State, post};
use rocket_okapi::openapi;

use crate::auth::AuthState;
use crate::auth::policy::RoutePolicy;
use crate::auth::responses::{LoginRequest, LoginResponse, RefreshRequest, RefreshResponse};
use crate::error::ApiError;
use crate::models::ApiResponse;

/// Access policy for each handler in this module, keyed by route name.
pub const ROUTE_POLICIES: &[(&str, RoutePolicy)] = &[
    ("login", RoutePolicy::Public),
    ("refresh", RoutePolicy::Public),
];

/// Exchange credentials for an access/refresh token pair.
#[openapi(tag = "Auth")]
#[post("/auth/login", data = "<payload>")]
pub async fn login(
    state: &State<AuthState>,
    payload: Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    payload.validate().map_err(ApiError::BadRequest)?;

    let pair = state.sign_in(&payload.email, &payload.password).await?;

    Ok(Json(ApiResponse::ok(LoginResponse {
        access_token: pair.access_token.token,
        refresh_token: pair.refresh_token.token,
        access_token_expires_at: pair.access_token.expires_at,
        refresh_token_expires_at: pair.refresh_token.expires_at,
    })))
}

/// Exchange a refresh token for a new access token.
#[openapi(tag = "Auth")]
#[post("/auth/refresh", data = "<payload>")]
pub async fn refresh(
    state: &State<AuthState>,
    payload: Json<RefreshRequest>,
) -> Result<Json<ApiResponse<RefreshResponse>>, ApiError> {
    payload.validate().map_err(ApiError::BadRequest)?;

    let refreshed = state.refresh(payload.refresh_token.trim()).await?;

    Ok(Json(ApiResponse::ok(RefreshResponse {
        access_token: refreshed.access_token.token,
        refresh_token: refreshed.refresh_token,
        access_token_expires_at: refreshed.access_token.expires_at,
    })))
}
