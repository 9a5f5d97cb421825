use std::sync::Arc;
use std::time::Duration;

use auth_api::auth::AuthState;
use auth_api::bootstrap::{self, BootstrapConfig};
use auth_api::test_support::{TestDatabase, TestDatabaseError, test_auth_config};
use auth_api::users::{NewUser, Page, PgUserRepository, RepositoryError, UserRepository};

async fn database() -> Option<TestDatabase> {
    match TestDatabase::new().await {
        Ok(db) => Some(db),
        Err(TestDatabaseError::MissingUrl) => {
            eprintln!("skipping repository test: no test database available");
            None
        }
        Err(err) => panic!("failed to provision test database: {err:?}"),
    }
}

fn new_user(email: &str, role: Option<&str>) -> NewUser {
    NewUser {
        email: email.to_string(),
        password_hash: "$2b$04$notarealdigestbutlongenoughforthecolumn".to_string(),
        role: role.map(str::to_string),
    }
}

#[tokio::test]
async fn creates_and_finds_users_with_joined_role() {
    let Some(test_db) = database().await else {
        return;
    };
    let repo = PgUserRepository::new(test_db.pool_clone());
    repo.ping().await.expect("ping");

    repo.ensure_roles(&[("ADMIN", "Administrator"), ("USER", "Standard user")])
        .await
        .expect("roles");

    let created = repo
        .create_user(new_user("someone@example.com", Some("ADMIN")))
        .await
        .expect("create");
    assert_eq!(created.role.as_deref(), Some("ADMIN"));

    let by_email = repo
        .find_by_email("SomeOne@Example.com")
        .await
        .expect("query")
        .expect("found");
    assert_eq!(by_email.id, created.id);

    let by_id = repo.find_by_id(created.id).await.expect("query").expect("found");
    assert_eq!(by_id.email, "someone@example.com");

    assert!(repo.email_exists("someone@example.com").await.expect("query"));
    assert!(repo.find_by_id(created.id + 100).await.expect("query").is_none());

    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn rejects_unknown_roles_and_duplicate_emails() {
    let Some(test_db) = database().await else {
        return;
    };
    let repo = PgUserRepository::new(test_db.pool_clone());
    repo.ensure_roles(&[("USER", "Standard user")]).await.expect("roles");

    let err = repo
        .create_user(new_user("a@example.com", Some("ROOT")))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::UnknownRole(role) if role == "ROOT"));

    repo.create_user(new_user("a@example.com", Some("USER")))
        .await
        .expect("first insert");
    let err = repo
        .create_user(new_user("A@example.com", None))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::DuplicateEmail(_)));

    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn lists_users_in_pages() {
    let Some(test_db) = database().await else {
        return;
    };
    let repo = PgUserRepository::new(test_db.pool_clone());

    for idx in 0..5 {
        repo.create_user(new_user(&format!("user{idx}@example.com"), None))
            .await
            .expect("insert");
    }

    let (page, total) = repo
        .list_users(Page { offset: 2, limit: 2 })
        .await
        .expect("list");
    assert_eq!(total, 5);
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].email, "user2@example.com");
    assert!(page.iter().all(|user| user.role.is_none()));

    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn bootstrap_seeds_roles_and_admin_once() {
    let Some(test_db) = database().await else {
        return;
    };
    let pool = test_db.pool_clone();
    let users = Arc::new(PgUserRepository::new(pool.clone()));
    let state = AuthState::from_config(test_auth_config(), users.clone()).expect("auth state");
    let config = BootstrapConfig {
        admin_email: "admin@example.com".into(),
        admin_password: "change-me-now".into(),
        connect_retries: 2,
        retry_delay: Duration::from_millis(10),
    };

    bootstrap::wait_for_database(&pool, config.connect_retries, config.retry_delay)
        .await
        .expect("database reachable");
    bootstrap::seed(&state, &config).await.expect("first seed");
    bootstrap::seed(&state, &config).await.expect("second seed");

    let roles = users.list_roles().await.expect("roles");
    let names: Vec<_> = roles.iter().map(|role| role.name.as_str()).collect();
    assert_eq!(names, vec!["ADMIN", "USER"]);

    let (all, total) = users
        .list_users(Page { offset: 0, limit: 10 })
        .await
        .expect("list");
    assert_eq!(total, 1);
    assert_eq!(all[0].role.as_deref(), Some("ADMIN"));

    let pair = state
        .sign_in("admin@example.com", "change-me-now")
        .await
        .expect("seeded admin can sign in");
    assert!(!pair.access_token.token.is_empty());

    test_db.close().await.expect("failed to drop test database");
}
