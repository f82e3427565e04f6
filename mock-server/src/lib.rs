//! Fixture REST API for exercising the client end to end.
//!
//! Besides a small `/items` collection it serves endpoints for each
//! behavior the client has to handle: gzip bodies, plain text, basic auth,
//! arbitrary status codes, slow and large responses and request echoing.
//! Every request except `/hits` is counted per path so tests can assert how
//! often the network was used.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get, put},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::{write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::trace::TraceLayer;
use tracing::debug;

pub const USERNAME: &str = "user";
pub const PASSWORD: &str = "secret";
pub const SLOW_DELAY: Duration = Duration::from_millis(300);

/// Body served by both `/compressed` and `/uncompressed`.
pub const DOCUMENT: &str = r#"{"id":42,"name":"compressed","tags":["a","b"]}"#;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: u64,
    pub name: String,
}

/// Item fields as sent by the client, either form-encoded or as JSON.
#[derive(Debug, Deserialize)]
pub struct ItemInput {
    pub name: String,
}

#[derive(Clone, Default)]
pub struct AppState {
    items: Arc<RwLock<BTreeMap<u64, Item>>>,
    next_id: Arc<AtomicU64>,
    hits: Arc<RwLock<HashMap<String, usize>>>,
}

impl AppState {
    /// Requests seen so far for `path`.
    pub async fn hits(&self, path: &str) -> usize {
        self.hits.read().await.get(path).copied().unwrap_or(0)
    }

    pub async fn insert(&self, name: &str) -> Item {
        let item = Item {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            name: name.to_string(),
        };
        self.items.write().await.insert(item.id, item.clone());
        item
    }
}

pub fn app() -> Router {
    app_with_state(AppState::default())
}

pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .route("/items", get(list_items).post(create_item))
        .route("/items/{id}", put(update_item).delete(delete_item))
        .route("/compressed", get(compressed))
        .route("/uncompressed", get(uncompressed))
        .route("/text", get(text))
        .route("/secure", get(secure))
        .route("/status/{code}", get(status))
        .route("/slow", get(slow))
        .route("/large/{bytes}", get(large))
        .route("/echo", any(echo))
        .route("/hits", get(hits))
        .layer(middleware::from_fn_with_state(state.clone(), count_hits))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, AppState::default()).await
}

pub async fn run_with_state(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

async fn count_hits(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if path != "/hits" {
        *state.hits.write().await.entry(path).or_default() += 1;
    }
    next.run(request).await
}

/// All items, or the one named by `?id=`.
async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    let items = state.items.read().await;
    match query.get("id") {
        None => Ok(Json(json!(items.values().collect::<Vec<_>>()))),
        Some(raw) => {
            let id: u64 = raw.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
            let item = items.get(&id).ok_or(StatusCode::NOT_FOUND)?;
            Ok(Json(json!(item)))
        }
    }
}

async fn create_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Item>), StatusCode> {
    let input = decode_input(&headers, &body).ok_or(StatusCode::UNPROCESSABLE_ENTITY)?;
    let item = state.insert(&input.name).await;
    debug!(id = item.id, "item created");
    Ok((StatusCode::CREATED, Json(item)))
}

async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Item>, StatusCode> {
    let input = decode_input(&headers, &body).ok_or(StatusCode::UNPROCESSABLE_ENTITY)?;
    let mut items = state.items.write().await;
    let item = items.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    item.name = input.name;
    Ok(Json(item.clone()))
}

async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, StatusCode> {
    let mut items = state.items.write().await;
    items
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or(StatusCode::NOT_FOUND)
}

fn decode_input(headers: &HeaderMap, body: &[u8]) -> Option<ItemInput> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if content_type.starts_with("application/json") {
        serde_json::from_slice(body).ok()
    } else {
        serde_urlencoded::from_bytes(body).ok()
    }
}

async fn compressed() -> Response {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    let gzipped = encoder
        .write_all(DOCUMENT.as_bytes())
        .and_then(|_| encoder.finish());
    match gzipped {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "application/json"),
                (header::CONTENT_ENCODING, "gzip"),
            ],
            bytes,
        )
            .into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn uncompressed() -> Response {
    ([(header::CONTENT_TYPE, "application/json")], DOCUMENT).into_response()
}

async fn text() -> &'static str {
    "pong"
}

async fn secure(headers: HeaderMap) -> Result<Json<Value>, (StatusCode, &'static str)> {
    let expected = format!("Basic {}", STANDARD.encode(format!("{USERNAME}:{PASSWORD}")));
    match headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => Ok(Json(json!({"authorized": true}))),
        _ => Err((StatusCode::UNAUTHORIZED, "unauthorized")),
    }
}

async fn status(Path(code): Path<u16>) -> (StatusCode, String) {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, format!("status {}", status.as_u16()))
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(SLOW_DELAY).await;
    Json(json!({"slow": true}))
}

/// Plain-text body of exactly `bytes` bytes.
async fn large(Path(bytes): Path<usize>) -> String {
    "x".repeat(bytes)
}

/// Reflects method, query pairs, relevant headers and body back as JSON.
async fn echo(
    method: Method,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
    body: String,
) -> Json<Value> {
    let names = [
        header::ACCEPT,
        header::ACCEPT_ENCODING,
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        header::USER_AGENT,
    ];
    let reflected: BTreeMap<&str, &str> = names
        .iter()
        .filter_map(|name| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| (name.as_str(), v))
        })
        .collect();
    Json(json!({
        "method": method.as_str(),
        "query": query,
        "headers": reflected,
        "body": body,
    }))
}

async fn hits(State(state): State<AppState>) -> Json<HashMap<String, usize>> {
    Json(state.hits.read().await.clone())
}
