use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::Json;
use axum::routing::get;
use log::{debug, info};
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use twoline::CommandError;
use twoline::actor::Mailbox;

use crate::error::ApiError;

/// Shared by every request handler. The mailbox sits behind a mutex because
/// replies are matched by arrival order: one round trip at a time.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Mutex<Mailbox>>,
    request_timeout: Duration,
}

impl AppState {
    pub fn new(orchestrator: Mailbox, request_timeout: Duration) -> Self {
        Self {
            orchestrator: Arc::new(Mutex::new(orchestrator)),
            request_timeout,
        }
    }

    /// Sends one command to the orchestrator and waits for its reply on the
    /// blocking pool.
    pub async fn send_and_receive(&self, command: &'static str, args: Vec<Value>) -> Result<Value, ApiError> {
        debug!("Sending data {command}{args:?}");
        let orchestrator = self.orchestrator.clone();
        let timeout = self.request_timeout;
        let reply = tokio::task::spawn_blocking(move || {
            let mailbox = orchestrator
                .lock()
                .map_err(|_| CommandError::Unexpected("orchestrator mailbox poisoned".to_string()))?;
            mailbox.request(command, args, timeout)
        })
        .await
        .map_err(|e| ApiError::from(CommandError::Unexpected(e.to_string())))??;
        debug!("Received response {reply}");
        Ok(reply)
    }
}

/// Endpoint name, path and methods, as listed by `GET /`.
const ROUTES: &[(&str, &str, &[&str])] = &[
    ("message_list", "/message/", &["GET", "POST"]),
    ("message", "/message/{id}/", &["GET", "PUT", "PATCH", "DELETE"]),
    ("flash", "/flash/", &["GET", "PUT", "DELETE"]),
    ("brightness", "/brightness/", &["GET", "PUT"]),
    ("contrast", "/contrast/", &["GET", "PUT"]),
];

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/message/", get(get_messages).post(post_message))
        .route(
            "/message/{id}/",
            get(get_message)
                .put(put_message)
                .patch(patch_message)
                .delete(delete_message),
        )
        .route("/flash/", get(get_flash).put(put_flash).delete(delete_flash))
        .route("/brightness/", get(get_brightness).put(set_brightness))
        .route("/contrast/", get(get_contrast).put(set_contrast))
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(not_found)
        .with_state(state)
}

fn parse_body(body: &Bytes) -> Result<Value, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}")))
}

async fn index() -> Json<Value> {
    let routes: Map<String, Value> = ROUTES
        .iter()
        .map(|(name, url, methods)| {
            (
                name.to_string(),
                json!({ "url": url, "methods": methods }),
            )
        })
        .collect();
    Json(Value::Object(routes))
}

async fn get_messages(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let messages = state.send_and_receive("get_messages", vec![]).await?;
    Ok(Json(json!({ "messages": messages })))
}

async fn post_message(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let payload = parse_body(&body)?;
    let record = state.send_and_receive("post_message", vec![payload]).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let record = state
        .send_and_receive("get_message_by_id", vec![Value::String(id)])
        .await?;
    Ok(Json(record))
}

async fn put_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let payload = parse_body(&body)?;
    let record = state
        .send_and_receive("put_message_by_id", vec![Value::String(id), payload])
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn patch_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload = parse_body(&body)?;
    let record = state
        .send_and_receive("patch_message_by_id", vec![Value::String(id), payload])
        .await?;
    Ok(Json(record))
}

async fn delete_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let status = state
        .send_and_receive("delete_message_by_id", vec![Value::String(id)])
        .await?;
    Ok(Json(json!({ "status": status })))
}

async fn get_flash(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.send_and_receive("get_flash", vec![]).await?))
}

async fn put_flash(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let payload = parse_body(&body)?;
    let flash = state.send_and_receive("put_flash", vec![payload]).await?;
    Ok((StatusCode::CREATED, Json(flash)))
}

async fn delete_flash(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let status = state.send_and_receive("delete_flash", vec![]).await?;
    Ok(Json(json!({ "status": status })))
}

async fn get_brightness(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let value = state.send_and_receive("get_brightness", vec![]).await?;
    Ok(Json(json!({ "brightness": value })))
}

async fn set_brightness(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let level = parse_body(&body)?;
    let value = state.send_and_receive("set_brightness", vec![level]).await?;
    Ok(Json(json!({ "brightness": value })))
}

async fn get_contrast(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let value = state.send_and_receive("get_contrast", vec![]).await?;
    Ok(Json(json!({ "contrast": value })))
}

async fn set_contrast(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let level = parse_body(&body)?;
    let value = state.send_and_receive("set_contrast", vec![level]).await?;
    Ok(Json(json!({ "contrast": value })))
}

/// Serves the control API until Ctrl-C or until `shutdown` is cancelled by a
/// failing actor. Either way the token ends up cancelled.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{addr}");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received Ctrl-C, shutting down"),
        _ = shutdown.cancelled() => info!("shutdown requested"),
    }
    shutdown.cancel();
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, format!("not found: {}", uri.path()))
}

async fn method_not_allowed(method: Method, uri: Uri) -> ApiError {
    ApiError::new(
        StatusCode::METHOD_NOT_ALLOWED,
        format!("{method} is not allowed on {}", uri.path()),
    )
}
