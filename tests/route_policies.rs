mod common;

use auth_api::auth::policy::RoutePolicy;
use auth_api::{API_BASE, OPENAPI_ROUTE_NAME, api_routes, route_policies};
use rocket::http::Status;
use serde_json::Value;

#[test]
fn every_api_route_has_a_registered_policy() {
    let (routes, _) = api_routes();
    let policies = route_policies().expect("route policy table is valid");

    assert_eq!(policies.unregistered(&routes), Vec::<String>::new());
    assert_eq!(policies.len(), routes.len());
}

#[test]
fn openapi_document_is_registered_public() {
    let (routes, _) = api_routes();
    let policies = route_policies().expect("route policy table is valid");

    let document = routes
        .iter()
        .find(|route| route.name.as_deref() == Some(OPENAPI_ROUTE_NAME))
        .expect("OpenAPI document route is mounted");
    assert_eq!(
        policies.resolve(document.name.as_deref()),
        RoutePolicy::Public
    );
}

#[test]
fn guarded_routes_reject_anonymous_requests() {
    let h = common::harness();
    let (routes, _) = api_routes();
    let policies = route_policies().expect("route policy table is valid");

    let mut checked = 0;
    for route in &routes {
        let policy = policies.resolve(route.name.as_deref());
        if policy == RoutePolicy::Public {
            continue;
        }

        let uri = format!("{}{}", API_BASE, route.uri.path());
        let response = h.client.req(route.method, uri.as_str()).dispatch();
        assert_eq!(
            response.status(),
            Status::Unauthorized,
            "{} {} ({:?}) answered without credentials",
            route.method,
            uri,
            policy
        );
        let body: Value = response.into_json().expect("json body");
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Unauthorized");
        checked += 1;
    }

    assert_eq!(checked, 4);
}

#[test]
fn public_routes_answer_anonymous_requests() {
    let h = common::harness();

    let response = h.client.get(format!("{API_BASE}/health")).dispatch();
    assert_eq!(response.status(), Status::Ok);

    let response = h.client.get(format!("{API_BASE}/openapi.json")).dispatch();
    assert_eq!(response.status(), Status::Ok);
}
