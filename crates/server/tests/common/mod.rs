//! Common test utilities for API testing with mocks.
//!
//! Builds the router in-process over real SQLite stores on a temp dir, with
//! the portal and the PDF tooling replaced by the core's mocks.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use harvester_core::{
    load_config_from_str,
    testing::{MockExtractor, MockNavigator},
    RunCoordinator, SqlitePublicationStore, SqliteRunLogStore,
};
use harvester_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use harvester_core::testing::fixtures;

/// In-process server with controllable portal and extractor.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_run() {
///     let fixture = TestFixture::new().await;
///     let response = fixture.post("/api/v1/scraper/run").await;
///     assert_eq!(response.status, 202);
/// }
/// ```
pub struct TestFixture {
    pub router: Router,
    pub coordinator: Arc<RunCoordinator>,
    /// Mock portal - configure listings, failures and latency
    pub navigator: Arc<MockNavigator>,
    pub extractor: Arc<MockExtractor>,
    /// Holds the database and download root
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Fixture with two listed publications.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let mut config = load_config_from_str(
            r#"
            [portal]
            base_url = "https://portal.example/journals"

            [coordinator]
            max_publications = 2

            [scheduler]
            enabled = false
            "#,
        )
        .expect("Failed to parse config");
        config.database.path = db_path.clone();
        config.downloads.root = temp_dir.path().join("downloads");

        let store = Arc::new(
            SqlitePublicationStore::new(&db_path).expect("Failed to create publication store"),
        );
        let run_logs =
            Arc::new(SqliteRunLogStore::new(&db_path).expect("Failed to create run log store"));

        let navigator = Arc::new(MockNavigator::new());
        navigator
            .set_listings(vec![
                fixtures::listing("2237", fixtures::date(2025, 1, 6)),
                fixtures::listing("2236", fixtures::date(2024, 12, 30)),
            ])
            .await;
        let extractor = Arc::new(MockExtractor::new());

        let coordinator = Arc::new(RunCoordinator::new(
            &config,
            store.clone(),
            run_logs.clone(),
            navigator.clone(),
            extractor.clone(),
        ));
        coordinator.start().await;

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&coordinator),
            store,
            run_logs,
        ));

        Self {
            router: create_router(state),
            coordinator,
            navigator,
            extractor,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path).await
    }

    /// Send a POST request without a body.
    pub async fn post(&self, path: &str) -> TestResponse {
        self.request("POST", path).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path).await
    }

    /// GET returning the raw body text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let response = self.send("GET", path).await;
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Poll the status endpoint until the last triggered run has finished.
    pub async fn wait_for_idle(&self) -> Value {
        for _ in 0..250 {
            let response = self.get("/api/v1/scraper/status").await;
            if response.body["state"] == "idle" && !response.body["last_outcome"].is_null() {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("run did not finish in time");
    }

    async fn send(&self, method: &str, path: &str) -> axum::response::Response {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap();

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request")
    }

    async fn request(&self, method: &str, path: &str) -> TestResponse {
        let response = self.send(method, path).await;

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
