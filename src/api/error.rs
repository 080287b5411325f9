//! HTTP error mapping.
//!
//! Validation failures echo their message; storage and integrity failures
//! are logged and answered with a generic body so internals never leak.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use identity_core::IdentityError;
use serde_json::json;
use tracing::{error, warn};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Body was not a JSON object we could read
    #[error("malformed request body: {0}")]
    MalformedBody(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Identity(err) => {
                StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::MalformedBody(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Identity(IdentityError::InvalidInput(msg)) => msg.clone(),
            Self::Identity(IdentityError::StorageUnavailable(_)) => {
                "Service temporarily unavailable".to_string()
            }
            Self::Identity(_) => "Internal Server Error".to_string(),
            Self::MalformedBody(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Error in /identify: {}", self);
        } else {
            warn!("Rejected request: {}", self);
        }
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}
