/// Gossip membership and health dissemination.
///
/// The engine runs a single ticker: every `interval_ms` it snapshots a
/// bounded slice of the node-health map, asks the initiation strategy to
/// shape a message, samples up to `fanout` peers uniformly without
/// replacement, and hands the message to the spread strategy. Spread
/// failures are logged and dropped; the next tick is the retry.
///
/// Incoming messages (delivered by the HTTP surface) go through the
/// initiation strategy's merge and replace the health map atomically.
///
/// Peers and health live under separate locks; neither lock is ever held
/// across network I/O.
pub mod spread;
pub mod strategies;

pub use spread::{spread_strategy, SpreadStrategy};
pub use strategies::{initiation_strategy, InitiationStrategy};

use crate::config::GossipConfig;
use crate::types::{GossipMessage, NodeHealth};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;

/// The gossip engine for one node.
pub struct GossipEngine {
    node_id: String,
    cfg: GossipConfig,
    initiation: Box<dyn InitiationStrategy>,
    spread: Box<dyn SpreadStrategy>,
    node_health: RwLock<NodeHealth>,
    peers: RwLock<Vec<String>>,
    shutdown_tx: broadcast::Sender<()>,
    running: RwLock<bool>,
}

impl GossipEngine {
    /// Create an engine with strategies mapped from the configuration.
    /// `client` is the (possibly mTLS) HTTP client the spread path uses.
    pub fn new(node_id: impl Into<String>, cfg: GossipConfig, client: reqwest::Client) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            node_id: node_id.into(),
            initiation: initiation_strategy(cfg.initiation_strategy),
            spread: spread_strategy(cfg.spread_strategy, client),
            cfg,
            node_health: RwLock::new(NodeHealth::new()),
            peers: RwLock::new(Vec::new()),
            shutdown_tx,
            running: RwLock::new(false),
        }
    }

    /// This node's id.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Start the tick loop. Idempotent: a running engine stays running.
    /// Call as `Arc::clone(&engine).start()`.
    pub fn start(self: Arc<Self>) {
        {
            let mut running = self.running.write().expect("running lock poisoned");
            if *running {
                return;
            }
            *running = true;
        }

        let engine = self;
        let mut shutdown_rx = engine.shutdown_tx.subscribe();
        tokio::spawn(async move {
            tracing::info!(node = %engine.node_id, "gossip engine started");
            let mut ticker = interval(Duration::from_millis(engine.cfg.interval_ms));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        engine.tick().await;
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!(node = %engine.node_id, "gossip engine stopped");
                        break;
                    }
                }
            }
        });
    }

    /// Signal the tick loop to stop. In-flight spreads drain on their own.
    pub fn stop(&self) {
        let mut running = self.running.write().expect("running lock poisoned");
        if !*running {
            return;
        }
        *running = false;
        let _ = self.shutdown_tx.send(());
    }

    /// One gossip round: snapshot, shape, sample, spread.
    async fn tick(&self) {
        let state = self.health_snapshot();
        let msg = self.initiation.generate_message(&self.node_id, state);
        let peers = self.random_peers();

        if peers.is_empty() {
            tracing::debug!(node = %self.node_id, "no peers available to gossip");
            return;
        }
        tracing::debug!(node = %self.node_id, peers = peers.len(), "gossiping");
        self.spread.spread(msg, peers).await;
    }

    /// Bounded health snapshot for one message.
    ///
    /// Selection is by sorted node id, so it is stable within a tick (and
    /// across ticks until membership changes).
    pub fn health_snapshot(&self) -> NodeHealth {
        let health = self.node_health.read().expect("health lock poisoned");
        let mut ids: Vec<_> = health.keys().cloned().collect();
        ids.sort();
        ids.truncate(self.cfg.node_info_per_msg);
        ids.into_iter()
            .filter_map(|id| health.get(&id).map(|seen| (id, *seen)))
            .collect()
    }

    /// Full copy of the health map.
    pub fn node_health(&self) -> NodeHealth {
        self.node_health.read().expect("health lock poisoned").clone()
    }

    /// Record a local liveness observation.
    pub fn observe(&self, node_id: impl Into<String>, last_seen: DateTime<Utc>) {
        let mut health = self.node_health.write().expect("health lock poisoned");
        health.insert(node_id.into(), last_seen);
    }

    /// Merge an incoming gossip message through the initiation strategy and
    /// atomically replace the local health map.
    pub fn apply_incoming(&self, msg: &GossipMessage) {
        let mut health = self.node_health.write().expect("health lock poisoned");
        let merged = self.initiation.merge(health.clone(), msg);
        *health = merged;
        tracing::debug!(node = %self.node_id, sender = %msg.sender_id, "gossip merged");
    }

    /// Add a peer base URL. Idempotent.
    pub fn add_peer(&self, url: impl Into<String>) {
        let url = url.into();
        let mut peers = self.peers.write().expect("peers lock poisoned");
        if !peers.contains(&url) {
            tracing::info!(node = %self.node_id, peer = %url, "peer added");
            peers.push(url);
        }
    }

    /// All registered peer URLs.
    pub fn peers(&self) -> Vec<String> {
        self.peers.read().expect("peers lock poisoned").clone()
    }

    /// Uniform sample without replacement of min(fanout, |peers|) peers.
    pub fn random_peers(&self) -> Vec<String> {
        let peers = self.peers.read().expect("peers lock poisoned");
        let mut rng = rand::thread_rng();
        peers
            .choose_multiple(&mut rng, self.cfg.fanout.min(peers.len()))
            .cloned()
            .collect()
    }
}
