/// HTTP surface for a data node.
///
/// Serves the gossip endpoints and the data-plane routes the coordinator
/// and repair paths drive.
///
/// # API Endpoints
///
/// ## Gossip
/// - `GET /health` - node-health snapshot (`{ "<nodeId>": RFC3339 }`)
/// - `POST /gossip` - receive a gossip round; 400 `{error}` on bad body
/// - `POST /join` - `{"url": "<peer-url>"}` idempotent peer registration
///
/// ## Data plane
/// - `GET /store` - list resident keys
/// - `GET /store/:key` - stored versions or 404
/// - `PUT /store/:key` - `{"value": "<hex>"}` local put
/// - `DELETE /store/:key` - purge the key
/// - `POST /store/fetch` - `{"keys": [...]}` → versions per key
/// - `POST /store/merge` - `{"entries": {key: [versions]}}` repair apply
///
/// ## Anti-entropy
/// - `GET /merkle/root` - hex root hash
/// - `GET /merkle/tree` - serialized tree for peer-side diffing
///
/// Decode failures answer 400 with `{"error": "..."}` and never crash the
/// node; data-path errors map to their HTTP statuses unchanged.
use crate::error::{TesseraError, TesseraResult};
use crate::gossip::GossipEngine;
use crate::merkle::MerkleTree;
use crate::node::DataNode;
use crate::types::{GossipMessage, NodeHealth, VersionedValue};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

/// Shared state behind the router.
pub struct AppState {
    /// The local replica shard.
    pub node: Arc<DataNode>,
    /// The local gossip engine.
    pub engine: Arc<GossipEngine>,
}

/// HTTP server for one data node.
pub struct NodeServer {
    state: Arc<AppState>,
}

impl NodeServer {
    /// Create a server over the node and its gossip engine.
    pub fn new(node: Arc<DataNode>, engine: Arc<GossipEngine>) -> Self {
        Self {
            state: Arc::new(AppState { node, engine }),
        }
    }

    /// The router, exposed for tests and custom binds.
    pub fn router(&self) -> Router {
        router(Arc::clone(&self.state))
    }

    /// Serve plain HTTP on `addr`.
    pub async fn bind(self, addr: SocketAddr) -> TesseraResult<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| TesseraError::Storage(format!("failed to bind {}: {}", addr, e)))?;
        tracing::info!(%addr, "node server listening");
        axum::serve(listener, self.router())
            .await
            .map_err(|e| TesseraError::Storage(format!("server error: {}", e)))
    }

    /// Serve mTLS HTTP on `addr` with prepared rustls material.
    pub async fn bind_tls(
        self,
        addr: SocketAddr,
        tls: axum_server::tls_rustls::RustlsConfig,
    ) -> TesseraResult<()> {
        tracing::info!(%addr, "node server listening (mTLS)");
        axum_server::bind_rustls(addr, tls)
            .serve(self.router().into_make_service())
            .await
            .map_err(|e| TesseraError::Storage(format!("server error: {}", e)))
    }
}

/// Build the Axum router with all routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Gossip surface
        .route("/health", get(handle_health))
        .route("/gossip", post(handle_gossip))
        .route("/join", post(handle_join))
        // Data plane
        .route("/store", get(handle_list_keys))
        .route(
            "/store/:key",
            get(handle_get).put(handle_put).delete(handle_delete),
        )
        .route("/store/fetch", post(handle_fetch))
        .route("/store/merge", post(handle_merge))
        // Anti-entropy
        .route("/merkle/root", get(handle_merkle_root))
        .route("/merkle/tree", get(handle_merkle_tree))
        .with_state(state)
}

// Wire types

/// Body of `POST /join`.
#[derive(Debug, Deserialize)]
struct JoinRequest {
    url: String,
}

/// Body of `PUT /store/:key`.
#[derive(Debug, Serialize, Deserialize)]
struct PutRequest {
    #[serde(with = "hex_value")]
    value: Vec<u8>,
}

mod hex_value {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Body of `POST /store/fetch`.
#[derive(Debug, Serialize, Deserialize)]
struct FetchRequest {
    keys: Vec<String>,
}

/// Versions per key, shared by `/store/fetch` responses and `/store/merge`
/// requests.
#[derive(Debug, Serialize, Deserialize)]
pub struct VersionBatch {
    /// key → stored versions
    pub entries: HashMap<String, Vec<VersionedValue>>,
}

/// Response of `GET /merkle/root`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MerkleRootResponse {
    /// Hex root hash; empty string when the tree is unbuilt.
    pub root: String,
}

fn bad_request(detail: impl std::fmt::Display) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": detail.to_string() })),
    )
        .into_response()
}

// Handlers

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<NodeHealth> {
    Json(state.engine.health_snapshot())
}

async fn handle_gossip(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GossipMessage>, JsonRejection>,
) -> Response {
    let Json(msg) = match payload {
        Ok(msg) => msg,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    tracing::debug!(sender = %msg.sender_id, "gossip received");
    state.engine.apply_incoming(&msg);
    Json(serde_json::json!({ "status": "received" })).into_response()
}

async fn handle_join(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<JoinRequest>, JsonRejection>,
) -> Response {
    let Json(peer) = match payload {
        Ok(peer) => peer,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    state.engine.add_peer(peer.url);
    Json(serde_json::json!({ "message": "peer added" })).into_response()
}

async fn handle_list_keys(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "keys": state.node.list_keys() }))
}

async fn handle_get(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Response {
    match state.node.get(&key) {
        Ok(versions) => Json(versions).into_response(),
        Err(TesseraError::KeyNotFound { key }) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("key '{}' not found", key) })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn handle_put(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    payload: Result<Json<PutRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    match state.node.put(&key, request.value) {
        Ok(()) => Json(serde_json::json!({ "status": "ok" })).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn handle_delete(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Response {
    match state.node.delete(&key) {
        Ok(()) => Json(serde_json::json!({ "status": "ok" })).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn handle_fetch(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<FetchRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    let mut entries = HashMap::new();
    for key in request.keys {
        if let Ok(versions) = state.node.get(&key) {
            entries.insert(key, versions);
        }
    }
    Json(VersionBatch { entries }).into_response()
}

async fn handle_merge(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<VersionBatch>, JsonRejection>,
) -> Response {
    let Json(batch) = match payload {
        Ok(batch) => batch,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    for (key, versions) in batch.entries {
        if let Err(e) = state.node.apply_remote(&key, versions) {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    }
    Json(serde_json::json!({ "status": "merged" })).into_response()
}

async fn handle_merkle_root(State(state): State<Arc<AppState>>) -> Json<MerkleRootResponse> {
    Json(MerkleRootResponse {
        root: state.node.merkle_root(),
    })
}

async fn handle_merkle_tree(State(state): State<Arc<AppState>>) -> Json<MerkleTree> {
    Json(state.node.merkle_snapshot())
}
