//! Response envelopes and query types shared by every route module.

use rocket::http::Status;
use rocket_okapi::okapi::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::users::Page;

const fn default_page() -> i64 {
    1
}

const fn default_limit() -> i64 {
    10
}

const MAX_PAGE_SIZE: i64 = 100;

/// Success envelope.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub status_code: u16,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn with_status(status: Status, data: T) -> Self {
        Self {
            success: true,
            status_code: status.code,
            data,
        }
    }

    pub fn ok(data: T) -> Self {
        Self::with_status(Status::Ok, data)
    }

    pub fn created(data: T) -> Self {
        Self::with_status(Status::Created, data)
    }
}

/// Failure envelope. `error` is always a generic, client-safe message.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub status_code: u16,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(status: Status, error: impl Into<String>) -> Self {
        Self {
            success: false,
            status_code: status.code,
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl<T> PaginatedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &PaginationParams) -> Self {
        let limit = params.limit();
        Self {
            items,
            total,
            page: params.page(),
            limit,
            total_pages: (total + limit - 1) / limit,
        }
    }
}

/// Pagination query parameters for list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, rocket::form::FromForm)]
pub struct PaginationParams {
    /// One-based page index (defaults to the first page).
    #[field(default = 1)]
    #[serde(default = "default_page")]
    pub page: i64,
    /// Items per page (clamped between 1 and 100, default 10).
    #[field(default = 10)]
    #[serde(default = "default_limit")]
    pub limit: i64,
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl PaginationParams {
    pub fn page(&self) -> i64 {
        self.page.max(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn window(&self) -> Page {
        Page {
            offset: (self.page() - 1).saturating_mul(self.limit()),
            limit: self.limit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_clamps_out_of_range_values() {
        let params = PaginationParams { page: 0, limit: 500 };
        assert_eq!(params.page(), 1);
        assert_eq!(params.limit(), MAX_PAGE_SIZE);
        assert_eq!(params.window(), Page { offset: 0, limit: 100 });

        let params = PaginationParams { page: 3, limit: 0 };
        assert_eq!(params.window(), Page { offset: 2, limit: 1 });
    }

    #[test]
    fn paginated_result_rounds_total_pages_up() {
        let params = PaginationParams { page: 2, limit: 10 };
        let result = PaginatedResult::new(vec![1, 2, 3], 21, &params);
        assert_eq!(result.total_pages, 3);
        assert_eq!(result.page, 2);

        let empty: PaginatedResult<i32> = PaginatedResult::new(Vec::new(), 0, &params);
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn envelopes_serialize_in_camel_case() {
        let json = serde_json::to_value(ApiResponse::created("x")).expect("json");
        assert_eq!(json["success"], true);
        assert_eq!(json["statusCode"], 201);

        let json = serde_json::to_value(ErrorResponse::new(Status::Forbidden, "Forbidden"))
            .expect("json");
        assert_eq!(json["success"], false);
        assert_eq!(json["statusCode"], 403);
        assert_eq!(json["error"], "Forbidden");
    }
}
