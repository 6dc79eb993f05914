//! Common test utilities and helpers for wsm-api tests
//!
//! Builds the app on top of the manager's fake-backed harness so tests can
//! drive HTTP and inspect orchestrator calls and stored records.

#![allow(dead_code)]

use axum::Router;
use wsm_api::AppState;
use wsm_manager::test_utils::{test_config, FakeOrchestrator, TestHarness};
use wsm_manager::ManagerConfig;

/// Create a test app around the harness manager
pub async fn create_test_app(harness: &TestHarness) -> Router {
    wsm_api::create_app(AppState::new(harness.manager.clone()))
        .await
        .expect("Failed to create test app")
}

/// Helper to extract JSON body from axum response
pub async fn extract_json_body<T>(response: axum::response::Response) -> T
where
    T: serde::de::DeserializeOwned,
{
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");

    serde_json::from_slice(&body).expect("Failed to deserialize JSON")
}

/// Helper to create authenticated request headers
pub fn auth_headers(username: &str) -> Vec<(&'static str, &str)> {
    vec![("x-user", username)]
}

/// TestClient to encapsulate API interaction logic
pub struct TestClient {
    pub app: Router,
}

impl TestClient {
    pub fn new(app: Router) -> Self {
        Self { app }
    }

    /// Create a client and harness with the default test configuration
    pub async fn with_harness() -> (Self, TestHarness) {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: ManagerConfig) -> (Self, TestHarness) {
        Self::with_orchestrator(config, FakeOrchestrator::new()).await
    }

    pub async fn with_orchestrator(
        config: ManagerConfig,
        orchestrator: FakeOrchestrator,
    ) -> (Self, TestHarness) {
        let harness = TestHarness::with_orchestrator(config, orchestrator).await;
        let client = Self::new(create_test_app(&harness).await);
        (client, harness)
    }

    /// Send a request to the API
    pub async fn send_request(
        &self,
        request: axum::http::Request<axum::body::Body>,
    ) -> axum::http::Response<axum::body::Body> {
        use tower::ServiceExt;
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Post JSON to an endpoint
    pub async fn post<T: serde::Serialize>(
        &self,
        uri: &str,
        body: &T,
        headers: Option<Vec<(&str, &str)>>,
    ) -> axum::http::Response<axum::body::Body> {
        let req_body = serde_json::to_string(body).expect("Failed to serialize request body");
        let mut builder = axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");

        if let Some(h) = headers {
            for (k, v) in h {
                builder = builder.header(k, v);
            }
        }

        let request = builder.body(axum::body::Body::from(req_body)).unwrap();
        self.send_request(request).await
    }

    /// Get request to an endpoint
    pub async fn get(
        &self,
        uri: &str,
        headers: Option<Vec<(&str, &str)>>,
    ) -> axum::http::Response<axum::body::Body> {
        let mut builder = axum::http::Request::builder().method("GET").uri(uri);

        if let Some(h) = headers {
            for (k, v) in h {
                builder = builder.header(k, v);
            }
        }

        let request = builder.body(axum::body::Body::empty()).unwrap();
        self.send_request(request).await
    }

    /// Delete request to an endpoint
    pub async fn delete(
        &self,
        uri: &str,
        headers: Option<Vec<(&str, &str)>>,
    ) -> axum::http::Response<axum::body::Body> {
        let mut builder = axum::http::Request::builder().method("DELETE").uri(uri);

        if let Some(h) = headers {
            for (k, v) in h {
                builder = builder.header(k, v);
            }
        }

        let request = builder.body(axum::body::Body::empty()).unwrap();
        self.send_request(request).await
    }
}
