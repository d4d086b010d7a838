//! Shared fixtures for the HTTP integration tests.
//!
//! Every test builds its own `AppState` (own metrics registry, own in-memory
//! store), so tests never share state and can run in parallel.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tower::ServiceExt;
use uuid::Uuid;

use opsgate_core::auth::{CredentialStore, Identity};
use opsgate_core::config::{BreakerSettings, OpsgateConfig, RateLimitPolicy, UserCredential};
use opsgate_core::external::{ExternalService, ExternalServiceError};
use opsgate_core::store::{
    EntityRecord, InMemoryStore, PersistenceGateway, StoreResult, StoreTransaction,
};
use opsgate_core::web::{create_app, AppState};

pub const TEST_EMAIL: &str = "tester@example.com";
pub const TEST_PASSWORD: &str = "correct horse battery staple";
pub const EXTERNAL_SERVICE: &str = "failing-service";

/// Defaults with one login user, generous limits and a fast breaker for the
/// external dependency
pub fn test_config() -> OpsgateConfig {
    let mut config = OpsgateConfig::default();
    config.service.environment = "test".to_string();
    config.auth.users.push(UserCredential {
        id: "user-1".to_string(),
        email: TEST_EMAIL.to_string(),
        password_sha256: CredentialStore::hash_password(TEST_PASSWORD),
    });
    config.rate_limiting.per_client = RateLimitPolicy::new(1_000, 60);
    config.rate_limiting.per_ip = RateLimitPolicy::new(1_000, 60);
    config.rate_limiting.global = RateLimitPolicy::new(1_000, 60);
    config.circuit_breakers.dependencies.insert(
        EXTERNAL_SERVICE.to_string(),
        BreakerSettings {
            failure_threshold: 3,
            failure_window_seconds: 60,
            cooldown_seconds: 1,
            call_timeout_ms: 1_000,
        },
    );
    config
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

/// Decoded response
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub text: String,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: OpsgateConfig) -> Self {
        let state = AppState::builder(config).build().await.unwrap();
        Self::from_state(state)
    }

    pub async fn with_external(config: OpsgateConfig, external: Arc<dyn ExternalService>) -> Self {
        let state = AppState::builder(config)
            .with_external_service(external)
            .build()
            .await
            .unwrap();
        Self::from_state(state)
    }

    pub async fn with_store(config: OpsgateConfig, store: Arc<dyn PersistenceGateway>) -> Self {
        let state = AppState::builder(config)
            .with_store(store)
            .build()
            .await
            .unwrap();
        Self::from_state(state)
    }

    fn from_state(state: AppState) -> Self {
        Self {
            router: create_app(state.clone()),
            state,
        }
    }

    /// Token for the configured test user
    pub fn token(&self) -> String {
        self.token_for("user-1", TEST_EMAIL)
    }

    pub fn token_for(&self, id: &str, email: &str) -> String {
        self.state
            .authenticator
            .issue_token(&Identity {
                id: id.to_string(),
                email: email.to_string(),
            })
            .unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        send_to(self.router.clone(), request).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(build_request(Method::GET, uri, token, None)).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.send(build_request(Method::POST, uri, token, Some(body)))
            .await
    }
}

/// Drive one request through a router and decode the response
pub async fn send_to(router: Router, request: Request<Body>) -> TestResponse {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8_lossy(&bytes).to_string();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    TestResponse {
        status,
        headers,
        body,
        text,
    }
}

pub fn build_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// External dependency double that counts invocations
#[derive(Debug)]
pub struct CountingService {
    calls: AtomicUsize,
    failing: AtomicBool,
    latency: Duration,
}

impl CountingService {
    pub fn failing() -> Arc<Self> {
        Self::new(true, Duration::ZERO)
    }

    pub fn new(failing: bool, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(failing),
            latency,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ExternalService for CountingService {
    fn name(&self) -> &str {
        EXTERNAL_SERVICE
    }

    async fn invoke(&self, payload: &Value) -> Result<Value, ExternalServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ExternalServiceError::Unavailable {
                service: EXTERNAL_SERVICE.to_string(),
                reason: "test double failing".to_string(),
            });
        }
        Ok(payload.clone())
    }
}

/// One-shot pause point. When armed, the first task to pass parks until
/// `release`; later passes go straight through.
#[derive(Debug, Default)]
pub struct Gate {
    armed: AtomicBool,
    reached: Notify,
    released: Notify,
}

impl Gate {
    pub fn open() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn armed() -> Arc<Self> {
        let gate = Self::default();
        gate.armed.store(true, Ordering::SeqCst);
        Arc::new(gate)
    }

    async fn pass(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.reached.notify_one();
            self.released.notified().await;
        }
    }

    /// Wait until a task is parked at the gate
    pub async fn wait_reached(&self) {
        self.reached.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }
}

/// In-memory store that can park a committed read after it has loaded its
/// rows, or a transaction right after its first write
#[derive(Debug)]
pub struct GatedStore {
    inner: InMemoryStore,
    read_gate: Arc<Gate>,
    write_gate: Arc<Gate>,
}

impl GatedStore {
    pub fn new(read_gate: Arc<Gate>, write_gate: Arc<Gate>) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryStore::new(),
            read_gate,
            write_gate,
        })
    }
}

#[async_trait]
impl PersistenceGateway for GatedStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        Ok(Box::new(GatedTransaction {
            inner: self.inner.begin().await?,
            gate: Arc::clone(&self.write_gate),
        }))
    }

    async fn get(&self, entity: &str, id: Uuid) -> StoreResult<Option<EntityRecord>> {
        self.inner.get(entity, id).await
    }

    async fn list(&self, entity: &str) -> StoreResult<Vec<EntityRecord>> {
        self.inner.list(entity).await
    }

    async fn list_where(
        &self,
        entity: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<Vec<EntityRecord>> {
        let rows = self.inner.list_where(entity, field, value).await?;
        self.read_gate.pass().await;
        Ok(rows)
    }

    async fn count(&self, entity: &str) -> StoreResult<u64> {
        self.inner.count(entity).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }

    fn backend_name(&self) -> &'static str {
        "gated-memory"
    }
}

struct GatedTransaction {
    inner: Box<dyn StoreTransaction>,
    gate: Arc<Gate>,
}

#[async_trait]
impl StoreTransaction for GatedTransaction {
    async fn create(&mut self, entity: &str, data: Value) -> StoreResult<EntityRecord> {
        let record = self.inner.create(entity, data).await?;
        self.gate.pass().await;
        Ok(record)
    }

    async fn update(&mut self, entity: &str, id: Uuid, patch: Value) -> StoreResult<EntityRecord> {
        self.inner.update(entity, id, patch).await
    }

    async fn delete(&mut self, entity: &str, id: Uuid) -> StoreResult<()> {
        self.inner.delete(entity, id).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.inner.rollback().await
    }
}
