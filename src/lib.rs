//! # Tessera: a leaderless replicated key-value store
//!
//! Tessera is a distributed key-value store in the Dynamo lineage. Each
//! data node owns a replica shard of the keyspace, applies writes under
//! vector-clock versioning, resolves concurrent versions through a
//! configurable policy, and cooperates with peers via a gossip membership
//! layer and Merkle-tree anti-entropy repair. A coordinator tier fans
//! client requests out to replicas under R/W quorums.
//!
//! ## Quick start
//!
//! ```ignore
//! use tessera::{Config, DataNode};
//!
//! let config = Config::default();
//! config.validate()?;
//!
//! let node = DataNode::new("n1", &config);
//! node.put("users/alice", br#"{"name":"Alice"}"#.to_vec())?;
//! let versions = node.get("users/alice")?;
//! ```
//!
//! ## Architecture
//!
//! - **Versioning** ([`types`], [`conflict`]): vector clocks with
//!   happens-before comparison; last-write-wins or concurrent-merge
//!   resolution applied at write time
//! - **Storage** ([`storage`]): keyed multi-version antichains behind the
//!   `Store` trait (the persistence plug point)
//! - **Anti-entropy** ([`merkle`], [`repair`]): bucketed Merkle digests,
//!   diverged-range diffing, periodic peer reconciliation
//! - **Membership** ([`gossip`]): tick-driven dissemination with pluggable
//!   initiation (anti-entropy / rumor-mongering / aggregation) and spread
//!   (push / pull / push-pull) strategies
//! - **Quorums** ([`quorum`], [`coordinator`]): R/W/N arithmetic and the
//!   client-facing fan-out tier
//!
//! Writes on one node are totally ordered by its lock and its clock entry
//! only moves forward; across nodes, ordering is whatever the vector clocks
//! encode. Gossip merges are commutative, so convergence does not depend on
//! delivery order.

pub mod config;
pub mod conflict;
pub mod coordinator;
pub mod error;
pub mod gossip;
pub mod http;
pub mod merkle;
pub mod node;
pub mod quorum;
pub mod repair;
pub mod security;
pub mod storage;
pub mod types;

// Public API exports
pub use config::{
    ClusterMode, Config, ConflictResolutionKind, InitiationStrategyKind, SpreadStrategyKind,
};
pub use conflict::{ConflictResolver, resolver_for};
pub use coordinator::Coordinator;
pub use error::{TesseraError, TesseraResult};
pub use gossip::GossipEngine;
pub use http::NodeServer;
pub use merkle::{KeyRange, MerkleTree};
pub use node::DataNode;
pub use quorum::Quorum;
pub use repair::RepairLoop;
pub use storage::{MemoryStore, Store};
pub use types::{GossipMessage, NodeHealth, VectorClock, VersionedValue};

// Re-export commonly used external types for convenience
pub use chrono::{DateTime, Utc};

/// Initialize the logging system.
///
/// Call once at process startup. The level is controlled by the
/// `TESSERA_LOG` environment variable (`error`, `warn`, `info`, `debug`,
/// `trace`); `info` is the default.
pub fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("TESSERA_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Initialize logging with a specific level, e.g. from
/// `monitoring.minLogLevel`.
pub fn init_logging_with_level(level: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(level);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
