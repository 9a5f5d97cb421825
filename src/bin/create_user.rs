use std::io::{self, Write};

use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use auth_api::auth::config::DEFAULT_BCRYPT_COST;
use auth_api::auth::passwords::{PasswordScheme, PasswordService};
use auth_api::auth::responses::validate_credentials;
use auth_api::auth::service::normalize_identifier;
use auth_api::users::{NewUser, PgUserRepository, RepositoryError, UserRepository};

#[derive(Parser, Debug)]
#[command(name = "create_user", about = "Create a user account with a named role")]
struct Args {
    /// Email address for the account (case insensitive).
    #[arg(long)]
    email: String,

    /// Plaintext password to hash and store for this user.
    #[arg(long)]
    password: String,

    /// Role name to assign; must already exist.
    #[arg(long, default_value = "USER")]
    role: String,
}

fn fail(message: impl std::fmt::Display) -> ! {
    let _ = writeln!(io::stderr(), "error: {message}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let email = normalize_identifier(&args.email);
    if let Err(reason) = validate_credentials(&email, &args.password) {
        fail(reason);
    }
    let role = args.role.trim().to_string();
    if role.is_empty() {
        fail("role must not be empty");
    }

    let scheme = match std::env::var("PASSWORD_HASH_SCHEME") {
        Ok(value) => value.parse::<PasswordScheme>()?,
        Err(_) => PasswordScheme::Bcrypt,
    };
    let cost = match std::env::var("BCRYPT_SALT_ROUNDS") {
        Ok(value) => value.trim().parse::<u32>()?,
        Err(_) => DEFAULT_BCRYPT_COST,
    };
    let password_hash = PasswordService::new(scheme, cost)?.hash_password(&args.password)?;

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await?;
    let users = PgUserRepository::new(pool);

    match users
        .create_user(NewUser {
            email: email.clone(),
            password_hash,
            role: Some(role.clone()),
        })
        .await
    {
        Ok(user) => {
            println!("Created {role} user '{}' with id {}", user.email, user.id);
            Ok(())
        }
        Err(RepositoryError::DuplicateEmail(_)) => {
            fail(format!("a user with email '{email}' already exists."))
        }
        Err(RepositoryError::UnknownRole(_)) => fail(format!("role '{role}' does not exist.")),
        Err(err) => Err(err.into()),
    }
}
