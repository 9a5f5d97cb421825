use std::io::Cursor;

use rocket::http::{ContentType, Status};
use rocket::response::{self, Responder, status};
use rocket::serde::json::Json;
use rocket::{Request, Response};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::Responses;
use rocket_okapi::response::OpenApiResponderInner;
use rocket_okapi::util::add_schema_response;

use crate::auth::AuthError;
use crate::models::ErrorResponse;
use crate::users::RepositoryError;

const INTERNAL_ERROR: &str = "Internal server error";

#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    Repository(RepositoryError),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    InternalError(String),
}

impl ApiError {
    /// Status plus the message that is safe to put on the wire.
    fn status_and_message(&self) -> (Status, String) {
        match self {
            ApiError::Auth(err) => (err.status(), err.public_message().to_string()),
            ApiError::Repository(RepositoryError::UnknownRole(role)) => {
                (Status::BadRequest, format!("Role '{role}' does not exist"))
            }
            ApiError::Repository(RepositoryError::DuplicateEmail(_)) => {
                (Status::Conflict, "Email already in use".to_string())
            }
            ApiError::Repository(RepositoryError::Database(_)) => {
                (Status::InternalServerError, INTERNAL_ERROR.to_string())
            }
            ApiError::NotFound(msg) => (Status::NotFound, msg.clone()),
            ApiError::BadRequest(msg) => (Status::BadRequest, msg.clone()),
            ApiError::Conflict(msg) => (Status::Conflict, msg.clone()),
            ApiError::InternalError(_) => (Status::InternalServerError, INTERNAL_ERROR.to_string()),
        }
    }

    fn log(&self) {
        match self {
            ApiError::Auth(err) if err.is_rejection() => log::warn!("request rejected: {}", err),
            ApiError::Auth(err) => log::error!("auth failure: {}", err),
            ApiError::Repository(RepositoryError::Database(err)) => {
                log::error!("database error: {}", err)
            }
            ApiError::Repository(err) => log::debug!("repository rejected request: {}", err),
            ApiError::NotFound(msg) => log::debug!("not found: {}", msg),
            ApiError::BadRequest(msg) => log::debug!("bad request: {}", msg),
            ApiError::Conflict(msg) => log::debug!("conflict: {}", msg),
            ApiError::InternalError(msg) => log::error!("internal error: {}", msg),
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        self.log();
        let (status, message) = self.status_and_message();

        let json = serde_json::to_string(&ErrorResponse::new(status, message)).unwrap_or_else(|_| {
            format!(
                r#"{{"success":false,"statusCode":{},"error":"{}"}}"#,
                status.code, INTERNAL_ERROR
            )
        });

        Response::build()
            .status(status)
            .header(ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json))
            .ok()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Repository(inner) => ApiError::Repository(inner),
            other => ApiError::Auth(other),
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        ApiError::Repository(err)
    }
}

/// Document the error envelope under each of `codes`.
pub fn error_responses(
    generator: &mut OpenApiGenerator,
    codes: &[u16],
) -> rocket_okapi::Result<Responses> {
    let mut responses = Responses::default();
    let schema = generator.json_schema::<ErrorResponse>();
    for code in codes {
        add_schema_response(&mut responses, *code, "application/json", schema.clone())?;
    }
    Ok(responses)
}

impl OpenApiResponderInner for ApiError {
    fn responses(generator: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        error_responses(generator, &[400, 401, 404, 409, 500])
    }
}

fn generic_message(status: Status) -> &'static str {
    match status.code {
        400 => "Bad request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not found",
        409 => "Conflict",
        422 => "Unprocessable entity",
        500..=599 => INTERNAL_ERROR,
        _ => status.reason().unwrap_or(INTERNAL_ERROR),
    }
}

/// Renders any uncaught status, including guard failures, in the error envelope.
#[catch(default)]
pub fn default_catcher(status: Status, _request: &Request<'_>) -> status::Custom<Json<ErrorResponse>> {
    status::Custom(status, Json(ErrorResponse::new(status, generic_message(status))))
}
