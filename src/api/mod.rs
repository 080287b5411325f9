//! REST API module for identity reconciliation

pub mod error;
pub mod identify_routes;

pub use error::AppError;
pub use identify_routes::{build_router, identify_with_retry, RetryPolicy};
