use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::{self, FromRow, PgPool};
use thiserror::Error;

/// Postgres SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("role '{0}' does not exist")]
    UnknownRole(String),
    #[error("a user with email '{0}' already exists")]
    DuplicateEmail(String),
}

/// A stored user with its role name joined in.
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: i32,
    pub email: String,
    pub password_hash: String,
    pub role: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RoleRecord {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    /// Already normalized (trimmed and lowercased).
    pub email: String,
    pub password_hash: String,
    pub role: Option<String>,
}

/// Offset window over an ordered listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

#[rocket::async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepositoryError>;

    async fn find_by_id(&self, id: i32) -> Result<Option<UserRecord>, RepositoryError>;

    async fn email_exists(&self, email: &str) -> Result<bool, RepositoryError>;

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, RepositoryError>;

    /// Users ordered by id, plus the total count.
    async fn list_users(&self, page: Page) -> Result<(Vec<UserRecord>, i64), RepositoryError>;

    async fn list_roles(&self) -> Result<Vec<RoleRecord>, RepositoryError>;

    /// Insert any of `roles` (name, description) that are missing.
    async fn ensure_roles(&self, roles: &[(&str, &str)]) -> Result<(), RepositoryError>;
}

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Round-trip a trivial query to confirm the pool can reach the server.
    pub async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

const USER_COLUMNS: &str = r#"u.id, u.email, u.password_hash, r.name AS role, u.created_at
     FROM users u
     LEFT JOIN roles r ON r.id = u.role_id"#;

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION)
    )
}

#[rocket::async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepositoryError> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} WHERE lower(u.email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<UserRecord>, RepositoryError> {
        let user =
            sqlx::query_as::<_, UserRecord>(&format!("SELECT {USER_COLUMNS} WHERE u.id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    async fn email_exists(&self, email: &str) -> Result<bool, RepositoryError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM users WHERE lower(email) = lower($1))",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let role_id: Option<i32> = match user.role.as_deref() {
            Some(name) => {
                let id: Option<i32> = sqlx::query_scalar("SELECT id FROM roles WHERE name = $1")
                    .bind(name)
                    .fetch_optional(&mut *tx)
                    .await?;
                Some(id.ok_or_else(|| RepositoryError::UnknownRole(name.to_string()))?)
            }
            None => None,
        };

        let id: i32 = sqlx::query_scalar(
            r#"INSERT INTO users (email, password_hash, role_id)
               VALUES ($1, $2, $3)
               RETURNING id"#,
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(role_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                RepositoryError::DuplicateEmail(user.email.clone())
            } else {
                RepositoryError::Database(err)
            }
        })?;

        let record =
            sqlx::query_as::<_, UserRecord>(&format!("SELECT {USER_COLUMNS} WHERE u.id = $1"))
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;
        Ok(record)
    }

    async fn list_users(&self, page: Page) -> Result<(Vec<UserRecord>, i64), RepositoryError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        let users = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} ORDER BY u.id ASC LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((users, total))
    }

    async fn list_roles(&self) -> Result<Vec<RoleRecord>, RepositoryError> {
        let roles = sqlx::query_as::<_, RoleRecord>(
            "SELECT id, name, description FROM roles ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }

    async fn ensure_roles(&self, roles: &[(&str, &str)]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for (name, description) in roles {
            let inserted = sqlx::query(
                r#"INSERT INTO roles (name, description)
                   VALUES ($1, $2)
                   ON CONFLICT (name) DO NOTHING"#,
            )
            .bind(name)
            .bind(description)
            .execute(&mut *tx)
            .await?;
            if inserted.rows_affected() > 0 {
                log::info!("seeded role {}", name);
            }
        }
        tx.commit().await?;
        Ok(())
    }
}
