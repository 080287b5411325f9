//! Identity reconciliation service
//!
//! HTTP surface over `identity_core`: request validation, configuration and
//! the axum router. Storage is chosen at startup (`identity_postgres` or the
//! in-memory store).

pub mod api;
pub mod config;
pub mod validation;

pub use api::build_router;
pub use config::{ServiceConfig, StorageBackend};
