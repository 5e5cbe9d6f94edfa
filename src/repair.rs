/// Anti-entropy repair over Merkle trees.
///
/// A periodic loop that walks the registered peers and reconciles diverged
/// key ranges:
///
/// 1. Compare root hashes; equal roots end the exchange immediately
/// 2. Fetch the peer's tree and diff in both directions locally
/// 3. Fetch the peer's versions for the union of diverged keys and feed
///    them through the local store
/// 4. Push the local versions for those keys back to the peer
///
/// `set` is commutative and idempotent under the conflict resolver, so both
/// sides converge no matter how the exchanges interleave. Per-peer failures
/// are logged and dropped; the next cycle is the retry.
use crate::config::RepairConfig;
use crate::error::{TesseraError, TesseraResult};
use crate::gossip::GossipEngine;
use crate::http::{MerkleRootResponse, VersionBatch};
use crate::merkle::MerkleTree;
use crate::node::DataNode;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;

/// Background repair loop for one node.
pub struct RepairLoop {
    node: Arc<DataNode>,
    engine: Arc<GossipEngine>,
    cfg: RepairConfig,
    client: reqwest::Client,
    shutdown_tx: broadcast::Sender<()>,
}

impl RepairLoop {
    /// Create a repair loop over the node's peers. `client` is the
    /// (possibly mTLS) HTTP client used for the exchanges.
    pub fn new(
        node: Arc<DataNode>,
        engine: Arc<GossipEngine>,
        cfg: RepairConfig,
        client: reqwest::Client,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            node,
            engine,
            cfg,
            client,
            shutdown_tx,
        }
    }

    /// Start the cycle ticker. A no-op when repair is disabled.
    /// Call as `Arc::clone(&repair).start()`.
    pub fn start(self: Arc<Self>) {
        if !self.cfg.enabled {
            tracing::info!("repair disabled by configuration");
            return;
        }

        let repair = self;
        let mut shutdown_rx = repair.shutdown_tx.subscribe();
        tokio::spawn(async move {
            tracing::info!(
                interval_s = repair.cfg.anti_entropy_interval_in_seconds,
                "repair loop started"
            );
            let mut ticker =
                interval(Duration::from_secs(repair.cfg.anti_entropy_interval_in_seconds));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        repair.run_cycle().await;
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("repair loop stopped");
                        break;
                    }
                }
            }
        });
    }

    /// Signal the loop to stop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// One full cycle over every registered peer.
    ///
    /// Peers are gossip URLs while health is keyed by node id and no mapping
    /// between the two is tracked, so every peer is attempted ("unknown is
    /// not unhealthy"); unreachable ones only cost a logged failure.
    pub async fn run_cycle(&self) {
        for peer in self.engine.peers() {
            if let Err(e) = self.repair_peer(&peer).await {
                tracing::warn!(peer = %peer, error = %e, "repair exchange failed");
            }
        }
    }

    /// Reconcile with a single peer.
    pub async fn repair_peer(&self, peer: &str) -> TesseraResult<()> {
        let peer_root = self.fetch_root(peer).await?;
        let local_root = self.node.merkle_root();
        if peer_root == local_root {
            tracing::trace!(peer = %peer, "roots match, nothing to repair");
            return Ok(());
        }

        let peer_tree = self.fetch_tree(peer).await?;
        let keys = self.diverged_keys(&peer_tree)?;
        if keys.is_empty() {
            return Ok(());
        }
        tracing::info!(peer = %peer, keys = keys.len(), "repairing diverged ranges");

        // Pull the peer's versions and fold them in locally.
        let theirs = self.fetch_versions(peer, &keys).await?;
        for (key, versions) in theirs.entries {
            self.node.apply_remote(&key, versions)?;
        }

        // Push our (now merged) versions back so the peer converges too.
        let mut ours = HashMap::new();
        for key in &keys {
            if let Ok(versions) = self.node.get(key) {
                ours.insert(key.clone(), versions);
            }
        }
        if !ours.is_empty() {
            self.push_versions(peer, VersionBatch { entries: ours }).await?;
        }
        Ok(())
    }

    /// Union of diverged keys, diffing in both directions so keys that only
    /// one side holds are covered. An unbuilt tree on either side simply
    /// yields the other side's full key set.
    fn diverged_keys(&self, peer_tree: &MerkleTree) -> TesseraResult<Vec<String>> {
        let mut keys: HashSet<String> = HashSet::new();

        match self.node.diff_merkle(peer_tree) {
            Ok(ranges) => {
                keys.extend(ranges.into_iter().flatten());
                let local_tree = self.node.merkle_snapshot();
                for range in peer_tree.diff(&local_tree)? {
                    keys.extend(range);
                }
            }
            Err(TesseraError::TreeUnbuilt) => {
                // One side is empty; everything either side holds diverges.
                keys.extend(self.node.list_keys());
                keys.extend(peer_tree.leaf_ranges().into_iter().flatten());
            }
            Err(e) => return Err(e),
        }

        let mut sorted: Vec<String> = keys.into_iter().collect();
        sorted.sort();
        Ok(sorted)
    }

    async fn fetch_root(&self, peer: &str) -> TesseraResult<String> {
        let url = format!("{}/merkle/root", peer);
        let response: MerkleRootResponse = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unreachable_peer(peer, e))?
            .json()
            .await
            .map_err(|e| unreachable_peer(peer, e))?;
        Ok(response.root)
    }

    async fn fetch_tree(&self, peer: &str) -> TesseraResult<MerkleTree> {
        let url = format!("{}/merkle/tree", peer);
        self.client
            .get(&url)
            .send()
            .await
            .map_err(|e| unreachable_peer(peer, e))?
            .json()
            .await
            .map_err(|e| unreachable_peer(peer, e))
    }

    async fn fetch_versions(&self, peer: &str, keys: &[String]) -> TesseraResult<VersionBatch> {
        let url = format!("{}/store/fetch", peer);
        self.client
            .post(&url)
            .json(&serde_json::json!({ "keys": keys }))
            .send()
            .await
            .map_err(|e| unreachable_peer(peer, e))?
            .json()
            .await
            .map_err(|e| unreachable_peer(peer, e))
    }

    async fn push_versions(&self, peer: &str, batch: VersionBatch) -> TesseraResult<()> {
        let url = format!("{}/store/merge", peer);
        let response = self
            .client
            .post(&url)
            .json(&batch)
            .send()
            .await
            .map_err(|e| unreachable_peer(peer, e))?;
        if !response.status().is_success() {
            return Err(TesseraError::PeerUnreachable {
                peer: peer.to_string(),
                reason: format!("merge rejected with {}", response.status()),
            });
        }
        Ok(())
    }
}

fn unreachable_peer(peer: &str, error: impl std::fmt::Display) -> TesseraError {
    TesseraError::PeerUnreachable {
        peer: peer.to_string(),
        reason: error.to_string(),
    }
}
