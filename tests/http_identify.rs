//! HTTP-level tests for the identity reconciliation server.
//!
//! Drive the axum router with `oneshot` against the in-memory store, so no
//! database is needed.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use http_body_util::BodyExt;
use hyper::{Request, StatusCode};
use identity_core::ports::Result;
use identity_core::{
    ContactFilter, ContactPatch, ContactRecord, ContactStore, ContactTx, IdentityError,
    IdentityService, LinkPrecedence, LockKey, MemoryContactStore, NewContact,
};
use identity_service::{build_router, ServiceConfig};
use serde_json::{json, Value};
use tower::ServiceExt;

// ── Test app builder ───────────────────────────────────────────

fn app_with(store: Arc<dyn ContactStore>, config: ServiceConfig) -> axum::Router {
    build_router(Arc::new(IdentityService::new(store)), &config)
}

fn app(store: &MemoryContactStore) -> axum::Router {
    app_with(Arc::new(store.clone()), ServiceConfig::default())
}

async fn post_identify(app: axum::Router, body: Value) -> (StatusCode, Value) {
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/identify")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    (status, body_json(resp).await)
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| json!({ "raw": String::from_utf8_lossy(&bytes).to_string() }))
}

// ── Tests ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_root_banner() {
    let resp = app(&MemoryContactStore::new())
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        body_json(resp).await,
        json!({ "raw": "Identity Reconciliation Service is running!" })
    );
}

#[tokio::test]
async fn test_health_ok_on_memory_store() {
    let resp = app(&MemoryContactStore::new())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_identify_creates_then_links() {
    let store = MemoryContactStore::new();

    let (status, first) = post_identify(
        app(&store),
        json!({ "email": "lorraine@hillvalley.edu", "phoneNumber": "123456" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        first,
        json!({
            "primaryContactId": 1,
            "emails": ["lorraine@hillvalley.edu"],
            "phoneNumbers": ["123456"],
            "secondaryContactIds": [],
        })
    );

    let (status, second) = post_identify(
        app(&store),
        json!({ "email": "mcfly@hillvalley.edu", "phoneNumber": "123456" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        second,
        json!({
            "primaryContactId": 1,
            "emails": ["lorraine@hillvalley.edu", "mcfly@hillvalley.edu"],
            "phoneNumbers": ["123456"],
            "secondaryContactIds": [2],
        })
    );
}

#[tokio::test]
async fn test_identify_normalizes_input() {
    let store = MemoryContactStore::new();
    post_identify(app(&store), json!({ "email": "doc@hv.io", "phoneNumber": "555010" })).await;

    let (status, body) = post_identify(
        app(&store),
        json!({ "email": "  DOC@HV.IO ", "phoneNumber": 555010 }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["secondaryContactIds"], json!([]));
    assert_eq!(store.snapshot().await.len(), 1);
}

#[tokio::test]
async fn test_identify_merges_primaries() {
    let store = MemoryContactStore::new();
    post_identify(app(&store), json!({ "email": "george@hv.io", "phoneNumber": "919191" })).await;
    post_identify(app(&store), json!({ "email": "biff@hv.io", "phoneNumber": "717171" })).await;

    let (status, body) = post_identify(
        app(&store),
        json!({ "email": "george@hv.io", "phoneNumber": "717171" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "primaryContactId": 1,
            "emails": ["george@hv.io", "biff@hv.io"],
            "phoneNumbers": ["919191", "717171"],
            "secondaryContactIds": [2],
        })
    );
}

#[tokio::test]
async fn test_identify_requires_a_value() {
    let (status, body) = post_identify(
        app(&MemoryContactStore::new()),
        json!({ "email": null, "phoneNumber": "" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({ "error": "Either email or phoneNumber must be provided." })
    );
}

#[tokio::test]
async fn test_identify_rejects_bad_formats() {
    let (status, body) =
        post_identify(app(&MemoryContactStore::new()), json!({ "email": "nope" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid email format." }));

    let (status, body) =
        post_identify(app(&MemoryContactStore::new()), json!({ "phoneNumber": "12-34" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid phone number format." }));
}

#[tokio::test]
async fn test_identify_rejects_malformed_json() {
    let resp = app(&MemoryContactStore::new())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/identify")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(resp).await["error"].is_string());
}

// ── Storage failures ───────────────────────────────────────────

/// Fails the first `failures` calls to `begin`, then delegates.
struct FlakyStore {
    inner: MemoryContactStore,
    failures: AtomicU32,
}

impl FlakyStore {
    fn new(inner: MemoryContactStore, failures: u32) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl ContactStore for FlakyStore {
    async fn begin(&self) -> Result<Box<dyn ContactTx>> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(IdentityError::StorageUnavailable("connection refused".into()));
        }
        self.inner.begin().await
    }

    async fn ping(&self) -> Result<()> {
        if self.failures.load(Ordering::SeqCst) > 0 {
            return Err(IdentityError::StorageUnavailable("connection refused".into()));
        }
        self.inner.ping().await
    }
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let store = MemoryContactStore::new();
    let flaky = Arc::new(FlakyStore::new(store.clone(), 2));

    let (status, body) = post_identify(
        app_with(flaky, ServiceConfig::default()),
        json!({ "email": "retry@hv.io" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["primaryContactId"], json!(1));
    assert_eq!(store.snapshot().await.len(), 1);
}

#[tokio::test]
async fn test_exhausted_retries_return_503() {
    let store = MemoryContactStore::new();
    let flaky = Arc::new(FlakyStore::new(store.clone(), 5));
    let config = ServiceConfig {
        max_retries: 1,
        ..ServiceConfig::default()
    };

    let (status, body) =
        post_identify(app_with(flaky, config), json!({ "email": "retry@hv.io" })).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({ "error": "Service temporarily unavailable" }));
    assert!(store.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_health_reports_unavailable_store() {
    let flaky = Arc::new(FlakyStore::new(MemoryContactStore::new(), 1));
    let resp = app_with(flaky, ServiceConfig::default())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_integrity_fault_is_500_without_detail() {
    let store = MemoryContactStore::new();
    let (status, _) = post_identify(app(&store), json!({ "email": "orphan@hv.io" })).await;
    assert_eq!(status, StatusCode::OK);

    // strip the cluster of its only primary
    let mut rows = store.snapshot().await;
    rows[0].link_precedence = LinkPrecedence::Secondary;
    store.seed(rows).await;

    let (status, body) =
        post_identify(app(&store), json!({ "email": "orphan@hv.io", "phoneNumber": "999999" }))
            .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Internal Server Error" }));
}

// ── Request timeout ────────────────────────────────────────────

/// Stalls every insert long enough to trip the request timeout.
struct StallingStore {
    inner: MemoryContactStore,
}

struct StallingTx {
    inner: Box<dyn ContactTx>,
}

#[async_trait]
impl ContactStore for StallingStore {
    async fn begin(&self) -> Result<Box<dyn ContactTx>> {
        Ok(Box::new(StallingTx {
            inner: self.inner.begin().await?,
        }))
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }
}

#[async_trait]
impl ContactTx for StallingTx {
    async fn acquire_locks(&mut self, keys: &[LockKey]) -> Result<()> {
        self.inner.acquire_locks(keys).await
    }

    async fn acquire_cluster_locks(&mut self, keys: &[LockKey]) -> Result<()> {
        self.inner.acquire_cluster_locks(keys).await
    }

    async fn find_many(&mut self, filter: &ContactFilter) -> Result<Vec<ContactRecord>> {
        self.inner.find_many(filter).await
    }

    async fn create(&mut self, contact: NewContact) -> Result<ContactRecord> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        self.inner.create(contact).await
    }

    async fn update_many(&mut self, filter: &ContactFilter, patch: ContactPatch) -> Result<u64> {
        self.inner.update_many(filter, patch).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.inner.rollback().await
    }
}

#[tokio::test]
async fn test_timed_out_request_rolls_back() {
    let store = MemoryContactStore::new();
    post_identify(app(&store), json!({ "email": "george@hv.io", "phoneNumber": "919191" })).await;
    post_identify(app(&store), json!({ "email": "biff@hv.io", "phoneNumber": "717171" })).await;
    let before = store.snapshot().await;

    let config = ServiceConfig::from_lookup(|key| {
        (key == "REQUEST_TIMEOUT_SECS").then(|| "1".to_string())
    })
    .unwrap();
    assert_eq!(config.request_timeout, Duration::from_secs(1));

    // the merge demotes biff, then stalls on the new secondary's insert
    let stalling = Arc::new(StallingStore {
        inner: store.clone(),
    });
    let resp = app_with(stalling, config)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/identify")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "email": "george@hv.io", "phoneNumber": "717171" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT);
    assert_eq!(store.snapshot().await, before, "demotion discarded");

    // the dropped unit of work released the store
    let (status, body) =
        post_identify(app(&store), json!({ "email": "george@hv.io", "phoneNumber": "717171" }))
            .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["primaryContactId"], json!(1));
    assert_eq!(body["secondaryContactIds"], json!([2, 3]));
}
