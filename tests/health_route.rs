use auth_api::models::ApiResponse;
use auth_api::routes::health::{HealthResponse, health_check};
use auth_api::test_support::TestRocketBuilder;
use rocket::http::Status;
use rocket::routes;

#[test]
fn health_endpoint_returns_ok() {
    let client = TestRocketBuilder::new()
        .mount_api_routes(routes![health_check])
        .blocking_client();

    let response = client.get("/api/v1/health").dispatch();
    assert_eq!(response.status(), Status::Ok);

    let payload: ApiResponse<HealthResponse> = response.into_json().expect("valid JSON payload");
    assert!(payload.success);
    assert_eq!(payload.status_code, 200);
    assert_eq!(payload.data.status, "ok");
}

#[test]
fn health_endpoint_needs_no_auth_state() {
    // Public routes must not consult the token machinery at all.
    let client = TestRocketBuilder::new()
        .mount_api_routes(routes![health_check])
        .blocking_client();

    let response = client
        .get("/api/v1/health")
        .header(rocket::http::Header::new("Authorization", "Bearer garbage"))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
}
