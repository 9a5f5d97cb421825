//! User accounts and roles: persistence, DTOs and admin endpoints.

pub mod repository;
pub mod responses;
pub mod routes;

pub use repository::{
    NewUser, Page, PgUserRepository, RepositoryError, RoleRecord, UserRecord, UserRepository,
};
