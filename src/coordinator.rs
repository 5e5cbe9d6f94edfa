/// Coordinator tier: client-facing quorum router.
///
/// Coordinators hold no authoritative data. A request selects the key's N
/// preference replicas, fans out in parallel, counts acknowledgements
/// against the configured quorum, and answers once the threshold is met or
/// missed. Placement is a deterministic hash over the replica list; the
/// consistent-hashing ring itself lives outside this tier.
use crate::conflict::{ConcurrentMergeResolver, ConflictResolver};
use crate::error::{TesseraError, TesseraResult};
use crate::quorum::Quorum;
use crate::types::VersionedValue;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::future::join_all;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::sync::Arc;

/// Quorum router over a set of data-node replicas.
pub struct Coordinator {
    replicas: Vec<String>,
    quorum: Quorum,
    client: reqwest::Client,
}

impl Coordinator {
    /// Create a coordinator over the replica base URLs.
    pub fn new(replicas: Vec<String>, quorum: Quorum, client: reqwest::Client) -> Self {
        Self {
            replicas,
            quorum,
            client,
        }
    }

    /// The N replicas responsible for a key: consecutive entries starting
    /// at SHA-256(key) mod |replicas|. Deterministic, so every coordinator
    /// routes a key to the same set.
    pub fn preference_replicas(&self, key: &str) -> Vec<String> {
        if self.replicas.is_empty() {
            return Vec::new();
        }
        let digest = Sha256::digest(key.as_bytes());
        let start = u64::from_be_bytes(digest[..8].try_into().expect("sha256 is 32 bytes"))
            as usize
            % self.replicas.len();

        let n = self.quorum.total_replicas().min(self.replicas.len());
        (0..n)
            .map(|i| self.replicas[(start + i) % self.replicas.len()].clone())
            .collect()
    }

    /// Write a value under the write quorum.
    pub async fn put(&self, key: &str, value: &[u8]) -> TesseraResult<()> {
        let body = serde_json::json!({ "value": hex::encode(value) });
        let requests = self.preference_replicas(key).into_iter().map(|replica| {
            let url = format!("{}/store/{}", replica, key);
            let client = self.client.clone();
            let body = body.clone();
            async move { client.put(&url).json(&body).send().await }
        });

        let acks = join_all(requests)
            .await
            .into_iter()
            .filter(|result| matches!(result, Ok(response) if response.status().is_success()))
            .count();

        tracing::debug!(key, acks, required = self.quorum.required_write_acks(), "put fanned out");
        if self.quorum.is_write_quorum_met(acks) {
            Ok(())
        } else {
            Err(TesseraError::QuorumNotMet {
                acks,
                required: self.quorum.required_write_acks(),
            })
        }
    }

    /// Read a key under the read quorum.
    ///
    /// A replica answering 404 still acknowledges the read; it just
    /// contributes no versions. The union of returned versions is reduced
    /// to its antichain so the caller sees each concurrent branch once.
    pub async fn get(&self, key: &str) -> TesseraResult<Vec<VersionedValue>> {
        let requests = self.preference_replicas(key).into_iter().map(|replica| {
            let url = format!("{}/store/{}", replica, key);
            let client = self.client.clone();
            async move { client.get(&url).send().await }
        });

        let mut acks = 0;
        let mut versions: Vec<VersionedValue> = Vec::new();
        for result in join_all(requests).await {
            let Ok(response) = result else { continue };
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                acks += 1;
                continue;
            }
            if !response.status().is_success() {
                continue;
            }
            acks += 1;
            if let Ok(batch) = response.json::<Vec<VersionedValue>>().await {
                versions.extend(batch);
            }
        }

        tracing::debug!(key, acks, required = self.quorum.required_read_acks(), "get fanned out");
        if !self.quorum.is_read_quorum_met(acks) {
            return Err(TesseraError::QuorumNotMet {
                acks,
                required: self.quorum.required_read_acks(),
            });
        }
        if versions.is_empty() {
            return Err(TesseraError::KeyNotFound {
                key: key.to_string(),
            });
        }

        // Replicas may disagree mid-repair; collapse to the antichain.
        let resolver = ConcurrentMergeResolver {
            max_versions: usize::MAX,
        };
        Ok(resolver.resolve(versions))
    }

    /// Delete a key under the write quorum.
    pub async fn delete(&self, key: &str) -> TesseraResult<()> {
        let requests = self.preference_replicas(key).into_iter().map(|replica| {
            let url = format!("{}/store/{}", replica, key);
            let client = self.client.clone();
            async move { client.delete(&url).send().await }
        });

        let acks = join_all(requests)
            .await
            .into_iter()
            .filter(|result| matches!(result, Ok(response) if response.status().is_success()))
            .count();

        if self.quorum.is_write_quorum_met(acks) {
            Ok(())
        } else {
            Err(TesseraError::QuorumNotMet {
                acks,
                required: self.quorum.required_write_acks(),
            })
        }
    }
}

/// Body of `PUT /kv/:key` on the coordinator surface.
#[derive(Debug, Deserialize)]
struct KvPutRequest {
    value: String,
}

/// Client-facing router: `GET`/`PUT`/`DELETE /kv/:key`.
pub fn router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route(
            "/kv/:key",
            get(handle_kv_get).put(handle_kv_put).delete(handle_kv_delete),
        )
        .with_state(coordinator)
}

/// Serve the coordinator surface on `addr`.
pub async fn bind(coordinator: Arc<Coordinator>, addr: SocketAddr) -> TesseraResult<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| TesseraError::Storage(format!("failed to bind {}: {}", addr, e)))?;
    tracing::info!(%addr, "coordinator listening");
    axum::serve(listener, router(coordinator))
        .await
        .map_err(|e| TesseraError::Storage(format!("server error: {}", e)))
}

fn error_response(error: TesseraError) -> Response {
    let status = match &error {
        TesseraError::KeyNotFound { .. } => StatusCode::NOT_FOUND,
        TesseraError::QuorumNotMet { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": error.to_string() }))).into_response()
}

async fn handle_kv_get(
    State(coordinator): State<Arc<Coordinator>>,
    Path(key): Path<String>,
) -> Response {
    match coordinator.get(&key).await {
        Ok(versions) => Json(versions).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_kv_put(
    State(coordinator): State<Arc<Coordinator>>,
    Path(key): Path<String>,
    payload: Result<Json<KvPutRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": rejection.body_text() })),
            )
                .into_response()
        }
    };
    let value = match hex::decode(&request.value) {
        Ok(value) => value,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": format!("value must be hex: {}", e) })),
            )
                .into_response()
        }
    };
    match coordinator.put(&key, &value).await {
        Ok(()) => Json(serde_json::json!({ "status": "ok" })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_kv_delete(
    State(coordinator): State<Arc<Coordinator>>,
    Path(key): Path<String>,
) -> Response {
    match coordinator.delete(&key).await {
        Ok(()) => Json(serde_json::json!({ "status": "ok" })).into_response(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterConfig;

    fn coordinator(replica_count: usize, n: usize) -> Coordinator {
        let config = ClusterConfig {
            total_replicas: n,
            read_quorum: n / 2 + 1,
            write_quorum: n / 2 + 1,
            ..ClusterConfig::default()
        };
        let replicas = (0..replica_count)
            .map(|i| format!("http://127.0.0.1:{}", 9100 + i))
            .collect();
        Coordinator::new(replicas, Quorum::from_config(&config), reqwest::Client::new())
    }

    #[test]
    fn test_preference_list_is_deterministic() {
        let c = coordinator(5, 3);
        assert_eq!(c.preference_replicas("alpha"), c.preference_replicas("alpha"));
    }

    #[test]
    fn test_preference_list_size() {
        let c = coordinator(5, 3);
        assert_eq!(c.preference_replicas("alpha").len(), 3);

        // N capped by the replica count.
        let small = coordinator(2, 3);
        assert_eq!(small.preference_replicas("alpha").len(), 2);
    }

    #[test]
    fn test_preference_list_consecutive_and_unique() {
        let c = coordinator(5, 3);
        let list = c.preference_replicas("some-key");
        let unique: std::collections::HashSet<_> = list.iter().collect();
        assert_eq!(unique.len(), list.len());
    }

    #[tokio::test]
    async fn test_put_without_replicas_misses_quorum() {
        let c = coordinator(0, 3);
        assert!(matches!(
            c.put("k", b"v").await,
            Err(TesseraError::QuorumNotMet { acks: 0, .. })
        ));
    }
}
