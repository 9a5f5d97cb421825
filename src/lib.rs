#[macro_use]
extern crate rocket;

pub mod auth;
pub mod bootstrap;
pub mod db;
pub mod error;
pub mod models;
pub mod request_logger;
pub mod routes;
pub mod users;

use crate::auth::policy::RoutePolicy;
use crate::auth::{AuthConfig, AuthResult, AuthState, RoutePolicies};
use crate::bootstrap::BootstrapConfig;
use crate::db::AuthDb;
use crate::request_logger::RequestLogger;
use crate::users::PgUserRepository;
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::{Build, Rocket, Route};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_db_pools::Database;
use rocket_okapi::okapi::openapi3::OpenApi;
use rocket_okapi::settings::OpenApiSettings;
use rocket_okapi::{
    get_openapi_route, openapi_get_routes_spec,
    rapidoc::{GeneralConfig, HideShowConfig, RapiDocConfig, make_rapidoc},
    settings::UrlObject,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};
use std::sync::{Arc, Once};

static LOGGER: Once = Once::new();

const DEFAULT_API_TITLE: &str = "Auth API";
const DEFAULT_API_DESCRIPTION: &str = "JWT authentication and user management";

/// Mount point of every route in [`api_routes`].
pub const API_BASE: &str = "/api/v1";

/// Route name given to the generated OpenAPI document.
pub const OPENAPI_ROUTE_NAME: &str = "openapi_document";

const OPENAPI_ROUTE_POLICIES: &[(&str, RoutePolicy)] =
    &[(OPENAPI_ROUTE_NAME, RoutePolicy::Public)];

fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

/// Access policy table covering every route mounted by [`rocket`].
pub fn route_policies() -> AuthResult<RoutePolicies> {
    RoutePolicies::builder()
        .register_all(routes::health::ROUTE_POLICIES)
        .register_all(auth::routes::ROUTE_POLICIES)
        .register_all(users::routes::ROUTE_POLICIES)
        .register_all(OPENAPI_ROUTE_POLICIES)
        .build()
}

/// API routes plus their generated OpenAPI document.
pub fn api_routes() -> (Vec<Route>, OpenApi) {
    let settings = OpenApiSettings::default();
    let (mut routes, mut spec) = openapi_get_routes_spec![
        settings:
        // Health routes
        routes::health::health_check,
        // Auth routes
        auth::routes::login,
        auth::routes::refresh,
        // User routes
        users::routes::get_me,
        users::routes::list_users,
        users::routes::create_user,
        users::routes::list_roles,
    ];

    spec.info.title =
        std::env::var("SWAGGER_TITLE").unwrap_or_else(|_| DEFAULT_API_TITLE.to_string());
    spec.info.description = Some(
        std::env::var("SWAGGER_DESCRIPTION")
            .unwrap_or_else(|_| DEFAULT_API_DESCRIPTION.to_string()),
    );
    spec.info.version = env!("CARGO_PKG_VERSION").to_string();

    let mut document = get_openapi_route(spec.clone(), &settings);
    document.name = Some(OPENAPI_ROUTE_NAME.into());
    routes.push(document);
    (routes, spec)
}

pub fn rocket() -> Rocket<Build> {
    let _ = dotenvy::dotenv();
    init_logger();

    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![Method::Get, Method::Post, Method::Put, Method::Delete, Method::Patch]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allow_credentials(true)
        .to_cors()
        .expect("Error creating CORS");

    let (api_routes, _) = api_routes();

    rocket::build()
        .attach(RequestLogger)
        .attach(AuthDb::init())
        .attach(cors)
        .attach(AdHoc::try_on_ignite("Route Policies", |rocket| async move {
            let checked = route_policies().and_then(|policies| {
                policies
                    .ensure_covers(
                        rocket
                            .routes()
                            .filter(|route| route.uri.as_str().starts_with(API_BASE)),
                    )
                    .map(|()| policies)
            });
            match checked {
                Ok(policies) => {
                    log::info!("registered access policies for {} routes", policies.len());
                    Ok(rocket.manage(policies))
                }
                Err(err) => {
                    log::error!("invalid route policy table: {}", err);
                    Err(rocket)
                }
            }
        }))
        // Wait for the database, then run migrations on startup
        .attach(AdHoc::try_on_ignite("Run Migrations", |rocket| async move {
            let config = match BootstrapConfig::from_env() {
                Ok(config) => config,
                Err(err) => {
                    log::error!("invalid bootstrap configuration: {}", err);
                    return Err(rocket);
                }
            };
            let Some(db) = AuthDb::fetch(&rocket) else {
                log::error!("database pool not available for migrations");
                return Err(rocket);
            };
            let pool = (**db).clone();

            if let Err(err) =
                bootstrap::wait_for_database(&pool, config.connect_retries, config.retry_delay)
                    .await
            {
                log::error!("{}", err);
                return Err(rocket);
            }
            match bootstrap::run_migrations(&pool).await {
                Ok(()) => {
                    log::info!("database migrations successful");
                    Ok(rocket.manage(config))
                }
                Err(err) => {
                    log::error!("database migrations failed: {}", err);
                    Err(rocket)
                }
            }
        }))
        .attach(AdHoc::try_on_ignite("Auth State", |rocket| async move {
            let Some(db) = AuthDb::fetch(&rocket) else {
                return Err(rocket);
            };
            let users = Arc::new(PgUserRepository::new((**db).clone()));

            let state = match AuthConfig::from_env()
                .and_then(|config| AuthState::from_config(config, users))
            {
                Ok(state) => state,
                Err(err) => {
                    log::error!("invalid auth configuration: {}", err);
                    return Err(rocket);
                }
            };

            if let Some(config) = rocket.state::<BootstrapConfig>().cloned() {
                if let Err(err) = bootstrap::seed(&state, &config).await {
                    log::error!("seeding failed: {}", err);
                    return Err(rocket);
                }
            }

            Ok(rocket.manage(state))
        }))
        .mount(API_BASE, api_routes)
        .register("/", catchers![error::default_catcher])
        .mount(
            "/api/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../../v1/openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .mount(
            "/api/docs/rapidoc/",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("Auth API", "../../v1/openapi.json")],
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use std::sync::Arc;

    use chrono::Utc;
    use parking_lot::RwLock;
    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket, Route};

    use crate::auth::passwords::PasswordScheme;
    use crate::auth::{AuthConfig, AuthState, RoutePolicies};
    use crate::users::{
        NewUser, Page, RepositoryError, RoleRecord, UserRecord, UserRepository,
    };

    pub use database::{TestDatabase, TestDatabaseError};

    pub const TEST_JWT_SECRET: &str = "integration-test-secret";

    /// Auth configuration with a cheap bcrypt cost for tests.
    pub fn test_auth_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: TEST_JWT_SECRET.to_string(),
            jwt_refresh_secret: None,
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 7 * 24 * 3600,
            admin_role: "ADMIN".to_string(),
            password_scheme: PasswordScheme::Bcrypt,
            bcrypt_cost: 4,
        }
    }

    #[derive(Default)]
    struct Store {
        users: Vec<UserRecord>,
        roles: Vec<RoleRecord>,
    }

    impl Store {
        fn ensure_role(&mut self, name: &str, description: Option<&str>) -> bool {
            if self.roles.iter().any(|role| role.name == name) {
                return false;
            }
            let id = self.roles.len() as i32 + 1;
            self.roles.push(RoleRecord {
                id,
                name: name.to_string(),
                description: description.map(str::to_string),
            });
            true
        }

        fn push_user(&mut self, email: &str, password_hash: &str, role: Option<&str>) -> UserRecord {
            let id = self.users.iter().map(|user| user.id).max().unwrap_or(0) + 1;
            let record = UserRecord {
                id,
                email: email.to_string(),
                password_hash: password_hash.to_string(),
                role: role.map(str::to_string),
                created_at: Utc::now(),
            };
            self.users.push(record.clone());
            record
        }
    }

    /// [`UserRepository`] backed by process memory, for tests that do not
    /// need Postgres.
    #[derive(Default)]
    pub struct InMemoryUserRepository {
        store: RwLock<Store>,
    }

    impl InMemoryUserRepository {
        /// Insert a user directly, creating its role if needed. Returns the id.
        pub fn insert(&self, email: &str, password_hash: &str, role: Option<&str>) -> i32 {
            let mut store = self.store.write();
            if let Some(role) = role {
                store.ensure_role(role, None);
            }
            store.push_user(email, password_hash, role).id
        }

        pub fn set_role(&self, id: i32, role: Option<&str>) {
            let mut store = self.store.write();
            if let Some(user) = store.users.iter_mut().find(|user| user.id == id) {
                user.role = role.map(str::to_string);
            }
        }

        pub fn remove(&self, id: i32) {
            self.store.write().users.retain(|user| user.id != id);
        }

        pub fn role_names(&self) -> Vec<String> {
            self.store
                .read()
                .roles
                .iter()
                .map(|role| role.name.clone())
                .collect()
        }

        pub fn user_count(&self) -> usize {
            self.store.read().users.len()
        }
    }

    #[rocket::async_trait]
    impl UserRepository for InMemoryUserRepository {
        async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepositoryError> {
            Ok(self
                .store
                .read()
                .users
                .iter()
                .find(|user| user.email.eq_ignore_ascii_case(email))
                .cloned())
        }

        async fn find_by_id(&self, id: i32) -> Result<Option<UserRecord>, RepositoryError> {
            Ok(self
                .store
                .read()
                .users
                .iter()
                .find(|user| user.id == id)
                .cloned())
        }

        async fn email_exists(&self, email: &str) -> Result<bool, RepositoryError> {
            Ok(self.find_by_email(email).await?.is_some())
        }

        async fn create_user(&self, user: NewUser) -> Result<UserRecord, RepositoryError> {
            let mut store = self.store.write();
            if let Some(role) = user.role.as_deref() {
                if !store.roles.iter().any(|known| known.name == role) {
                    return Err(RepositoryError::UnknownRole(role.to_string()));
                }
            }
            if store
                .users
                .iter()
                .any(|existing| existing.email.eq_ignore_ascii_case(&user.email))
            {
                return Err(RepositoryError::DuplicateEmail(user.email));
            }
            Ok(store.push_user(&user.email, &user.password_hash, user.role.as_deref()))
        }

        async fn list_users(&self, page: Page) -> Result<(Vec<UserRecord>, i64), RepositoryError> {
            let store = self.store.read();
            let mut users = store.users.clone();
            users.sort_by_key(|user| user.id);
            let total = users.len() as i64;
            let items = users
                .into_iter()
                .skip(page.offset.max(0) as usize)
                .take(page.limit.max(0) as usize)
                .collect();
            Ok((items, total))
        }

        async fn list_roles(&self) -> Result<Vec<RoleRecord>, RepositoryError> {
            Ok(self.store.read().roles.clone())
        }

        async fn ensure_roles(&self, roles: &[(&str, &str)]) -> Result<(), RepositoryError> {
            let mut store = self.store.write();
            for (name, description) in roles {
                store.ensure_role(name, Some(description));
            }
            Ok(())
        }
    }

    pub mod database {
        use log::LevelFilter;
        use rocket_db_pools::sqlx::postgres::{PgConnectOptions, PgPoolOptions};
        use rocket_db_pools::sqlx::{self, ConnectOptions, PgPool};
        use testcontainers::{GenericImage, ImageExt, core::WaitFor};
        use testcontainers_modules::testcontainers::{
            ContainerAsync, core::error::TestcontainersError, runners::AsyncRunner,
        };
        use thiserror::Error;
        use tokio::runtime::Handle;
        use uuid::Uuid;

        use crate::bootstrap::MIGRATOR;

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("TEST_DATABASE_URL not set and no container runtime available")]
            MissingUrl,
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("migration error: {0}")]
            Migration(#[from] sqlx::migrate::MigrateError),
            #[error("container error: {0}")]
            Container(#[from] TestcontainersError),
        }

        /// Ephemeral, migrated database for integration tests.
        pub struct TestDatabase {
            pool: Option<PgPool>,
            admin_options: PgConnectOptions,
            database_name: String,
            container: Option<ContainerAsync<GenericImage>>,
        }

        impl TestDatabase {
            /// Use `TEST_DATABASE_URL` when set, otherwise start a disposable
            /// Postgres container.
            pub async fn new() -> Result<Self, TestDatabaseError> {
                match std::env::var("TEST_DATABASE_URL") {
                    Ok(url) if !url.trim().is_empty() => Self::from_url(&url, None).await,
                    _ => Self::from_container().await,
                }
            }

            async fn from_container() -> Result<Self, TestDatabaseError> {
                let request = GenericImage::new("postgres", "16-alpine")
                    .with_wait_for(WaitFor::message_on_stderr(
                        "database system is ready to accept connections",
                    ))
                    .with_env_var("POSTGRES_DB", "postgres")
                    .with_env_var("POSTGRES_USER", "postgres")
                    .with_env_var("POSTGRES_PASSWORD", "postgres");

                let container = match request.start().await {
                    Ok(container) => container,
                    Err(err) => {
                        log::warn!("could not start postgres container: {}", err);
                        return Err(TestDatabaseError::MissingUrl);
                    }
                };

                let host = container.get_host().await?.to_string();
                let port = container.get_host_port_ipv4(5432).await?;
                let url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

                Self::from_url(&url, Some(container)).await
            }

            async fn from_url(
                url: &str,
                container: Option<ContainerAsync<GenericImage>>,
            ) -> Result<Self, TestDatabaseError> {
                let base_options: PgConnectOptions = url.parse().map_err(TestDatabaseError::Sqlx)?;
                let base_options = base_options.log_statements(LevelFilter::Off);

                let base_name = base_options
                    .get_database()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "postgres".to_string());

                let admin_options = base_options.clone().database("postgres");
                let admin_pool = PgPoolOptions::new()
                    .max_connections(1)
                    .connect_with(admin_options.clone())
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                let new_db_name = format!("{}_{}", base_name, Uuid::new_v4().simple());
                let create_sql = format!("CREATE DATABASE \"{}\" TEMPLATE template0", new_db_name);
                sqlx::query(&create_sql)
                    .execute(&admin_pool)
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;
                admin_pool.close().await;

                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect_with(base_options.clone().database(&new_db_name))
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                MIGRATOR.run(&pool).await?;

                Ok(Self {
                    pool: Some(pool),
                    admin_options,
                    database_name: new_db_name,
                    container,
                })
            }

            pub fn pool(&self) -> &PgPool {
                self.pool.as_ref().expect("test database pool is available")
            }

            pub fn pool_clone(&self) -> PgPool {
                self.pool().clone()
            }

            /// Close pool connections and drop the ephemeral database.
            pub async fn close(mut self) -> Result<(), TestDatabaseError> {
                if let Some(pool) = self.pool.take() {
                    pool.close().await;
                }

                drop_database_with_fallback(self.admin_options.clone(), &self.database_name)
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                if let Some(container) = self.container.take() {
                    drop(container);
                }

                Ok(())
            }
        }

        async fn drop_database_with_fallback(
            admin_options: PgConnectOptions,
            database_name: &str,
        ) -> Result<(), sqlx::Error> {
            let admin_pool = PgPoolOptions::new()
                .max_connections(1)
                .connect_with(admin_options)
                .await?;

            let drop_force = format!("DROP DATABASE \"{}\" WITH (FORCE)", database_name);
            match sqlx::query(&drop_force).execute(&admin_pool).await {
                Ok(_) => Ok(()),
                Err(err) if force_drop_unsupported(&err) => {
                    let drop_sql = format!("DROP DATABASE \"{}\"", database_name);
                    sqlx::query(&drop_sql).execute(&admin_pool).await?;
                    Ok(())
                }
                Err(err) => Err(err),
            }
        }

        fn force_drop_unsupported(err: &sqlx::Error) -> bool {
            matches!(
                err,
                sqlx::Error::Database(db_err)
                    if db_err
                        .code()
                        .map(|code| code == "42601" || code == "0A000")
                        .unwrap_or(false)
            )
        }

        impl Drop for TestDatabase {
            fn drop(&mut self) {
                if let Some(pool) = self.pool.take() {
                    let admin_options = self.admin_options.clone();
                    let db_name = self.database_name.clone();
                    if let Ok(handle) = Handle::try_current() {
                        handle.spawn(async move {
                            pool.close().await;
                            let _ = drop_database_with_fallback(admin_options, &db_name).await;
                        });
                    } else {
                        std::thread::spawn(move || {
                            if let Ok(rt) = tokio::runtime::Runtime::new() {
                                rt.block_on(async move {
                                    pool.close().await;
                                    let _ =
                                        drop_database_with_fallback(admin_options, &db_name).await;
                                });
                            }
                        });
                    }
                }

                if let Some(container) = self.container.take() {
                    drop(container);
                }
            }
        }
    }

    /// Builder for constructing Rocket instances tailored for integration tests.
    ///
    /// Every built instance manages the full route policy table and renders
    /// errors through the same catcher as production.
    #[derive(Default)]
    pub struct TestRocketBuilder {
        figment: Figment,
        mounts: Vec<(String, Vec<Route>)>,
        auth_state: Option<AuthState>,
    }

    impl TestRocketBuilder {
        /// Start a builder with sensible defaults: random port, logging disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                mounts: Vec::new(),
                auth_state: None,
            }
        }

        /// Mount routes under `/api/v1`.
        pub fn mount_api_routes(mut self, routes: Vec<Route>) -> Self {
            self.mounts.push((crate::API_BASE.to_string(), routes));
            self
        }

        /// Mount every API route, as production does.
        pub fn mount_all_api_routes(self) -> Self {
            let (routes, _) = crate::api_routes();
            self.mount_api_routes(routes)
        }

        pub fn manage_auth_state(mut self, state: AuthState) -> Self {
            self.auth_state = Some(state);
            self
        }

        /// Manage an [`AuthState`] over `users` built from [`test_auth_config`].
        pub fn with_users(self, users: Arc<dyn UserRepository>) -> Self {
            let state = AuthState::from_config(test_auth_config(), users)
                .expect("test auth configuration is valid");
            self.manage_auth_state(state)
        }

        /// Finish building the Rocket instance.
        pub fn build(self) -> Rocket<Build> {
            let policies: RoutePolicies =
                crate::route_policies().expect("route policy table is valid");
            let mut rocket = rocket::custom(self.figment)
                .attach(crate::request_logger::RequestLogger)
                .manage(policies)
                .register("/", catchers![crate::error::default_catcher]);

            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }

            if let Some(state) = self.auth_state {
                rocket = rocket.manage(state);
            }

            rocket
        }

        /// Convenience helper to produce a blocking local client.
        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }

        /// Convenience helper to produce an asynchronous local client.
        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}
