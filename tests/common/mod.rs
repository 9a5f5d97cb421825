#![allow(dead_code)]

use std::sync::Arc;

use auth_api::auth::passwords::{PasswordScheme, PasswordService};
use auth_api::test_support::{InMemoryUserRepository, TestRocketBuilder};
use rocket::http::{ContentType, Header, Status};
use rocket::local::blocking::Client;
use serde_json::{Value, json};

pub const PASSWORD: &str = "correct-horse-battery";

pub struct Harness {
    pub client: Client,
    pub users: Arc<InMemoryUserRepository>,
    pub admin_id: i32,
    pub user_id: i32,
}

pub fn harness() -> Harness {
    let users = Arc::new(InMemoryUserRepository::default());
    let hasher = PasswordService::new(PasswordScheme::Bcrypt, 4).expect("password service");
    let hash = hasher.hash_password(PASSWORD).expect("hash");
    let admin_id = users.insert("admin@example.com", &hash, Some("ADMIN"));
    let user_id = users.insert("user@example.com", &hash, Some("USER"));

    let client = TestRocketBuilder::new()
        .with_users(users.clone())
        .mount_all_api_routes()
        .blocking_client();

    Harness {
        client,
        users,
        admin_id,
        user_id,
    }
}

pub fn bearer(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {token}"))
}

pub fn login(client: &Client, email: &str, password: &str) -> (Status, Value) {
    let response = client
        .post("/api/v1/auth/login")
        .header(ContentType::JSON)
        .body(json!({ "email": email, "password": password }).to_string())
        .dispatch();
    let status = response.status();
    (status, response.into_json().expect("json body"))
}

pub fn access_token(client: &Client, email: &str) -> String {
    let (status, body) = login(client, email, PASSWORD);
    assert_eq!(status, Status::Ok, "login failed: {body}");
    body["data"]["accessToken"]
        .as_str()
        .expect("access token")
        .to_string()
}

