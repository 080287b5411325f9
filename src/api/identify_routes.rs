//! Identity reconciliation API endpoints
//!
//! ## Endpoints
//!
//! - `GET /` - liveness text
//! - `GET /health` - store connectivity check
//! - `POST /identify` - reconcile an email / phone pair into its cluster

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use identity_core::{IdentifyRequest, IdentifyResponse, IdentityError, IdentityService};
use serde_json::{json, Value};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{debug, warn};

use crate::api::error::AppError;
use crate::config::ServiceConfig;
use crate::validation::{normalize, IdentifyBody};

pub const BANNER: &str = "Identity Reconciliation Service is running!";

/// How often a transient storage failure is retried by the handler
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.pow(attempt.saturating_sub(1).min(6))
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn build_router(service: Arc<IdentityService>, config: &ServiceConfig) -> Router {
    let retry = RetryPolicy {
        max_retries: config.max_retries,
        base_delay: Duration::from_millis(25),
    };

    Router::new()
        .route("/", get(banner))
        .route("/health", get(health))
        .route("/identify", post(identify))
        .layer(Extension(service))
        .layer(Extension(retry))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(config.request_timeout))
}

// ============================================================================
// Handlers
// ============================================================================

async fn banner() -> &'static str {
    BANNER
}

/// GET /health
async fn health(Extension(service): Extension<Arc<IdentityService>>) -> (StatusCode, Json<Value>) {
    match service.store().ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(err) => {
            warn!("Health check failed: {}", err);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
        }
    }
}

/// POST /identify
///
/// Normalizes the body, then runs one reconciliation unit of work,
/// re-running it while the failure is retryable.
async fn identify(
    Extension(service): Extension<Arc<IdentityService>>,
    Extension(retry): Extension<RetryPolicy>,
    payload: Result<Json<IdentifyBody>, JsonRejection>,
) -> Result<Json<IdentifyResponse>, AppError> {
    let Json(body) = payload.map_err(|e| AppError::MalformedBody(e.body_text()))?;
    let request = normalize(&body)?;
    debug!(?request, "identify request");

    let response = identify_with_retry(&service, &request, retry).await?;
    Ok(Json(response))
}

pub async fn identify_with_retry(
    service: &IdentityService,
    request: &IdentifyRequest,
    retry: RetryPolicy,
) -> Result<IdentifyResponse, IdentityError> {
    let mut attempt = 0;
    loop {
        match service.identify(request).await {
            Err(err) if err.is_retryable() && attempt < retry.max_retries => {
                attempt += 1;
                warn!(
                    attempt,
                    max_retries = retry.max_retries,
                    "Retrying identify after transient failure: {}",
                    err
                );
                tokio::time::sleep(retry.delay(attempt)).await;
            }
            outcome => return outcome,
        }
    }
}
