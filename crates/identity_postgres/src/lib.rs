//! PostgreSQL adapter for identity reconciliation.
//!
//! Implements the `identity_core` storage ports against a `contacts` table.
//! All SQL is runtime-checked (sqlx::query, not sqlx::query!) so the crate
//! builds without a live database.

pub mod database;
pub mod errors;
pub mod locks;
pub mod sqlx_types;
pub mod store;

pub use database::{DatabaseConfig, DatabaseManager};
pub use store::{PgContactStore, PgContactTx};
