//! Shared helpers for the aiw-api integration tests.

#![allow(dead_code)]

use aiw_api::{create_app, AppState};
use aiw_orchestrator::test_utils::{memory_orchestrator, test_settings};
use aiw_orchestrator::{
    MemoryRegistry, OrchestratorSettings, WorkspaceOrchestrator, WorkspaceRegistry,
};
use aiw_provider::mock::MockProvider;
use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

/// App state over a fresh in-memory registry, verbatim ids and 5s timeouts.
pub fn test_state(mock: Arc<MockProvider>) -> AppState {
    AppState::new(memory_orchestrator(mock))
}

/// Same as [`test_state`] but with custom orchestrator settings.
pub fn test_state_with(mock: Arc<MockProvider>, settings: OrchestratorSettings) -> AppState {
    let registry: Arc<dyn WorkspaceRegistry> = Arc::new(MemoryRegistry::new());
    AppState::new(WorkspaceOrchestrator::new(registry, mock, settings))
}

pub fn settings_with_provision_timeout(timeout: std::time::Duration) -> OrchestratorSettings {
    OrchestratorSettings {
        provision_timeout: timeout,
        ..test_settings()
    }
}

/// Helper to extract JSON body from axum response
pub async fn extract_json_body<T>(response: Response<Body>) -> T
where
    T: DeserializeOwned,
{
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");

    serde_json::from_slice(&body).expect("Failed to deserialize JSON")
}

/// TestClient to encapsulate API interaction logic
pub struct TestClient {
    pub app: Router,
    pub state: AppState,
}

impl TestClient {
    pub fn new(state: AppState) -> Self {
        Self {
            app: create_app(state.clone()),
            state,
        }
    }

    /// Client over a default mock provider.
    pub fn with_mock(mock: Arc<MockProvider>) -> Self {
        Self::new(test_state(mock))
    }

    pub async fn send_request(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Post JSON to an endpoint
    pub async fn post<T: Serialize>(&self, uri: &str, body: &T) -> Response<Body> {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(body).unwrap()))
            .unwrap();
        self.send_request(request).await
    }

    /// Post without a body (action endpoints)
    pub async fn post_empty(&self, uri: &str) -> Response<Body> {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send_request(request).await
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send_request(request).await
    }

    pub async fn delete(&self, uri: &str) -> Response<Body> {
        let request = Request::builder()
            .method("DELETE")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send_request(request).await
    }
}
