use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Data, Request, Response};
use std::time::Instant;

use crate::auth::guards::GuardVerdict;

/// Fairing that logs one line per HTTP request with timing and the
/// access guard's verdict (`-` when the route ran no guard).
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        request.local_cache(Instant::now);
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let duration = request.local_cache(Instant::now).elapsed();
        let access = request
            .local_cache(|| None::<GuardVerdict>)
            .as_ref()
            .map(|verdict| format!("{}:{}", verdict.policy.label(), verdict.label()))
            .unwrap_or_else(|| "-".to_string());

        log::info!(
            "{} {} -> {} [{}] ({:.2}ms)",
            request.method(),
            request.uri(),
            response.status().code,
            access,
            duration.as_secs_f64() * 1000.0
        );
    }
}
