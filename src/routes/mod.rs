//! Route handlers that belong to no particular resource.
//!
//! Resource handlers live beside their domain (`auth::routes`,
//! `users::routes`); every module exports a `ROUTE_POLICIES` table that
//! `crate::route_policies` folds into the guard's lookup table.

pub mod health;
