/// Configuration for a Tessera process.
///
/// The schema mirrors the cluster's YAML/JSON configuration files
/// (camelCase keys). Every startup path calls [`Config::validate`] before
/// constructing anything; validation failures are fatal. The loaded config
/// is handed down by reference; components never reach for a global.
use crate::error::{TesseraError, TesseraResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Deployment mode of the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterMode {
    /// Processes on one machine, static peer lists.
    Local,
    /// Kubernetes-managed nodes.
    K8s,
    /// AWS-managed nodes.
    Aws,
}

/// Gossip initiation strategy: what goes into an outbound round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitiationStrategyKind {
    /// Ship the full (truncated) health map; merges adopt it wholesale.
    #[serde(rename = "anti-entropy")]
    AntiEntropy,
    /// Ship a random half of the health map; merges overwrite pointwise.
    #[serde(rename = "rumor-mongering")]
    RumorMongering,
    /// Ship a one-entry summary; merges keep local state.
    #[serde(rename = "aggregation")]
    Aggregation,
}

/// Gossip spread strategy: how a round reaches the selected peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpreadStrategyKind {
    /// POST the message to each peer's `/gossip`.
    #[serde(rename = "push")]
    Push,
    /// GET each peer's `/health`.
    #[serde(rename = "pull")]
    Pull,
    /// Both, concurrently.
    #[serde(rename = "pull-push")]
    PullPush,
}

/// Conflict resolution policy applied at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictResolutionKind {
    /// Keep exactly one winner per key.
    #[serde(rename = "last-write-wins")]
    LastWriteWins,
    /// Keep the antichain of concurrent versions, capped per key.
    #[serde(rename = "custom")]
    Custom,
}

/// Replication and placement settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterConfig {
    /// Deployment mode
    pub mode: ClusterMode,
    /// Number of virtual nodes per physical node
    pub virtual_node: u32,
    /// Maximum number of nodes allowed per region
    pub max_nodes_per_region: u32,
    /// Total number of replicas per key (N)
    pub total_replicas: usize,
    /// Acks required for a read (R)
    pub read_quorum: usize,
    /// Acks required for a write (W)
    pub write_quorum: usize,
    /// Port the coordinator tier listens on
    pub coordinator_port: u16,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            mode: ClusterMode::Local,
            virtual_node: 1,
            max_nodes_per_region: 10,
            total_replicas: 3,
            read_quorum: 2,
            write_quorum: 2,
            coordinator_port: 8080,
        }
    }
}

/// Gossip engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GossipConfig {
    /// Strategy shaping outbound content and incoming merges
    pub initiation_strategy: InitiationStrategyKind,
    /// Strategy choreographing the per-peer transport
    pub spread_strategy: SpreadStrategyKind,
    /// Peers contacted per tick
    pub fanout: usize,
    /// Tick interval in milliseconds
    pub interval_ms: u64,
    /// Maximum node entries shipped per message
    pub node_info_per_msg: usize,
    /// Port the gossip server listens on
    pub port: u16,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            initiation_strategy: InitiationStrategyKind::RumorMongering,
            spread_strategy: SpreadStrategyKind::Push,
            fanout: 3,
            interval_ms: 1000,
            node_info_per_msg: 10,
            port: 7070,
        }
    }
}

/// Merkle tree settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MerkleTreeConfig {
    /// Number of consecutive sorted keys hashed into one leaf
    pub bucket_size: usize,
}

impl Default for MerkleTreeConfig {
    fn default() -> Self {
        Self { bucket_size: 100 }
    }
}

/// Versioning and conflict-resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VectorClockConfig {
    /// Policy applied by the store's resolver
    pub conflict_resolution: ConflictResolutionKind,
    /// Cap on retained versions per key
    pub max_versions_per_key: usize,
}

impl Default for VectorClockConfig {
    fn default() -> Self {
        Self {
            conflict_resolution: ConflictResolutionKind::LastWriteWins,
            max_versions_per_key: 10,
        }
    }
}

/// mTLS material paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MtlsConfig {
    /// Enable mutual TLS on the HTTP surface
    pub enabled: bool,
    /// Path to the certificate file (PEM)
    pub cert_file: String,
    /// Path to the private key file (PEM)
    pub key_file: String,
    /// Path to the CA certificate gating client verification; empty skips
    /// client cert verification (logged as a warning)
    pub ca_cert: String,
}

/// Security settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityConfig {
    /// mTLS configuration for node-to-node and client traffic
    pub mtls: MtlsConfig,
}

/// Persistence settings. Consumed read-only: the store is in-memory this
/// revision and the backend is the future plug point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistenceConfig {
    /// Enable a persistent backend
    pub enabled: bool,
    /// Backend name (e.g. "file")
    pub backend: String,
    /// Storage path for file-backed persistence
    pub path: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: "file".to_string(),
            path: String::new(),
        }
    }
}

/// Monitoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitoringConfig {
    /// Enable monitoring output
    pub enabled: bool,
    /// Minimum log level (e.g. "info", "debug", "error")
    pub min_log_level: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_log_level: "info".to_string(),
        }
    }
}

/// Anti-entropy repair settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RepairConfig {
    /// Enable the background repair loop
    pub enabled: bool,
    /// Seconds between repair cycles
    pub anti_entropy_interval_in_seconds: u64,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            anti_entropy_interval_in_seconds: 1800,
        }
    }
}

/// Top-level configuration tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Replication and placement
    pub cluster: ClusterConfig,
    /// Gossip engine
    pub gossip: GossipConfig,
    /// Merkle tree
    pub merkle_tree: MerkleTreeConfig,
    /// Versioning and conflict resolution
    pub vector_clock: VectorClockConfig,
    /// mTLS
    pub security: SecurityConfig,
    /// Persistence plug point
    pub persistence: PersistenceConfig,
    /// Monitoring
    pub monitoring: MonitoringConfig,
    /// Anti-entropy repair
    pub repair: RepairConfig,
}

impl Config {
    /// Load a configuration file. `.yaml`/`.yml` and `.json` are accepted;
    /// the result is validated before it is returned.
    pub fn load(path: impl AsRef<Path>) -> TesseraResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| TesseraError::InvalidConfig {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;

        let config: Config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&raw).map_err(|e| TesseraError::InvalidConfig {
                    reason: format!("yaml parse error: {}", e),
                })?
            }
            Some("json") => {
                serde_json::from_str(&raw).map_err(|e| TesseraError::InvalidConfig {
                    reason: format!("json parse error: {}", e),
                })?
            }
            _ => {
                return Err(TesseraError::InvalidConfig {
                    reason: format!("unsupported config file type: {}", path.display()),
                })
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate every invariant the components assume thereafter.
    pub fn validate(&self) -> TesseraResult<()> {
        let c = &self.cluster;
        if c.total_replicas < 1 {
            return Err(invalid("cluster.totalReplicas must be positive"));
        }
        if c.read_quorum < 1 || c.read_quorum > c.total_replicas {
            return Err(invalid("cluster.readQuorum must be in [1, totalReplicas]"));
        }
        if c.write_quorum < 1 || c.write_quorum > c.total_replicas {
            return Err(invalid("cluster.writeQuorum must be in [1, totalReplicas]"));
        }
        if c.read_quorum + c.write_quorum <= c.total_replicas {
            return Err(invalid(
                "cluster quorums must overlap: readQuorum + writeQuorum > totalReplicas",
            ));
        }

        let g = &self.gossip;
        if g.fanout < 1 {
            return Err(invalid("gossip.fanout must be positive"));
        }
        if g.interval_ms < 100 {
            return Err(invalid("gossip.intervalMs must be >= 100"));
        }
        if g.node_info_per_msg < 5 {
            return Err(invalid("gossip.nodeInfoPerMsg must be >= 5"));
        }

        if self.merkle_tree.bucket_size < 1 {
            return Err(invalid("merkleTree.bucketSize must be positive"));
        }
        if self.vector_clock.max_versions_per_key < 1 {
            return Err(invalid("vectorClock.maxVersionsPerKey must be positive"));
        }
        if self.repair.enabled && self.repair.anti_entropy_interval_in_seconds < 1 {
            return Err(invalid("repair.antiEntropyIntervalInSeconds must be positive"));
        }

        let mtls = &self.security.mtls;
        if mtls.enabled && (mtls.cert_file.is_empty() || mtls.key_file.is_empty()) {
            return Err(invalid(
                "security.mtls requires certFile and keyFile when enabled",
            ));
        }

        Ok(())
    }
}

fn invalid(reason: &str) -> TesseraError {
    TesseraError::InvalidConfig {
        reason: reason.to_string(),
    }
}

/// Generate a default node id for processes started without one.
pub fn default_node_id() -> String {
    format!("node-{}", &uuid::Uuid::new_v4().to_string()[..8])
}
