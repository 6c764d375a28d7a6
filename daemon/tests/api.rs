//! End-to-end tests of the HTTP API.
//!
//! Each test starts real orchestrator and LCD driver loops writing to an
//! in-memory panel, then drives the axum router directly with `oneshot`.

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::ServiceExt;

use twoline::lcd::{DriverConfig, MemoryDevice};
use twoline::orchestrator::OrchestratorConfig;
use twoline::system;
use twoline_daemon::server::{AppState, router};

struct TestApp {
    router: Router,
    device: MemoryDevice,
    shutdown: CancellationToken,
    task_tracker: TaskTracker,
}

impl TestApp {
    fn start() -> Self {
        let orchestrator = OrchestratorConfig {
            tick: Duration::from_millis(10),
            request_timeout: Duration::from_secs(2),
            ..OrchestratorConfig::default()
        };
        let driver = DriverConfig {
            tick: Duration::from_millis(5),
            ..DriverConfig::default()
        };
        let device = MemoryDevice::new();
        let shutdown = CancellationToken::new();
        let task_tracker = TaskTracker::new();
        let web = system::spawn(
            &task_tracker,
            orchestrator,
            driver,
            Box::new(device.clone()),
            shutdown.clone(),
        );
        let router = router(AppState::new(web, Duration::from_secs(4)));
        TestApp {
            router,
            device,
            shutdown,
            task_tracker,
        }
    }

    async fn call(&self, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn stop(self) {
        self.shutdown.cancel();
        drop(self.router);
        self.task_tracker.close();
        self.task_tracker.wait().await;
    }
}

#[tokio::test]
async fn test_post_get_delete_message() {
    let app = TestApp::start();

    let (status, record) = app
        .call(Method::POST, "/message/", Some(r#"{"message": "Hello"}"#))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = record["id"].as_str().unwrap().to_string();
    assert_eq!(id.len(), 32);

    let (status, fetched) = app.call(Method::GET, &format!("/message/{id}/"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, record);

    let (status, list) = app.call(Method::GET, "/message/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list, json!({ "messages": [record] }));

    let (status, body) = app
        .call(Method::DELETE, &format!("/message/{id}/"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "OK" }));

    let (status, body) = app.call(Method::GET, &format!("/message/{id}/"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": format!("Message {id} does not exist") }));

    app.stop().await;
}

#[tokio::test]
async fn test_put_and_patch_message() {
    let app = TestApp::start();

    let (status, created) = app
        .call(Method::PUT, "/message/door/", Some(r#"{"message": "Door open"}"#))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created, json!({ "id": "door", "message": "Door open" }));

    let (status, patched) = app
        .call(Method::PATCH, "/message/door/", Some(r#"{"color": [0, 255, 0]}"#))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        patched,
        json!({ "id": "door", "message": "Door open", "color": [0, 255, 0] })
    );

    let (status, _) = app
        .call(Method::PATCH, "/message/window/", Some(r#"{"color": [0, 0, 0]}"#))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.stop().await;
}

#[tokio::test]
async fn test_validation_and_malformed_bodies() {
    let app = TestApp::start();

    let (status, body) = app
        .call(Method::POST, "/message/", Some(r#"{"message": "x", "colour": [1, 2, 3]}"#))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].is_string());

    let (status, _) = app
        .call(Method::POST, "/message/", Some(r#"{"message": "x", "expires": "soonish"}"#))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = app.call(Method::POST, "/message/", Some("{oops")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.call(Method::PUT, "/brightness/", Some("0")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = app.call(Method::PUT, "/brightness/", Some(r#""max""#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.stop().await;
}

#[tokio::test]
async fn test_brightness_and_contrast() {
    let app = TestApp::start();

    let (status, body) = app.call(Method::GET, "/brightness/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "brightness": 255 }));

    let (status, body) = app.call(Method::PUT, "/contrast/", Some("120")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "contrast": 120 }));

    let (_, body) = app.call(Method::GET, "/contrast/", None).await;
    assert_eq!(body, json!({ "contrast": 120 }));
    assert!(app.device.writes().contains(&vec![0xFE, 0x50, 120]));

    app.stop().await;
}

#[tokio::test]
async fn test_flash_endpoints() {
    let app = TestApp::start();

    let (status, body) = app.call(Method::GET, "/flash/", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Flash message not set" }));

    let (status, merged) = app
        .call(Method::PUT, "/flash/", Some(r#"{"message": "Doorbell", "timeout": 3}"#))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(merged["timeout"], 3);
    assert_eq!(merged["blink"], json!([[255, 0, 0], [0, 0, 0]]));

    let (status, raw) = app.call(Method::GET, "/flash/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(raw, json!({ "message": "Doorbell", "timeout": 3 }));

    let (status, body) = app.call(Method::DELETE, "/flash/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "OK" }));

    app.stop().await;
}
