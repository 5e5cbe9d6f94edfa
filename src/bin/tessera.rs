/// Tessera node launcher.
///
/// Usage:
///   tessera datanode --config <file> [--node-id <id>] [--peer <url>...]
///   tessera coordinator --config <file> --replica <url>...
///
/// Data nodes serve the gossip and data-plane surface on `gossip.port` and
/// run the gossip engine plus the anti-entropy repair loop. Coordinators
/// serve the client-facing quorum router on `cluster.coordinatorPort`.
/// Invalid configuration and bind failures exit nonzero.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tessera::coordinator::Coordinator;
use tessera::gossip::GossipEngine;
use tessera::http::NodeServer;
use tessera::node::DataNode;
use tessera::quorum::Quorum;
use tessera::repair::RepairLoop;
use tessera::{config, security, Config};
use tokio::signal;

#[derive(Parser)]
#[command(name = "tessera", version, about = "Leaderless replicated key-value store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a data node (replica shard + gossip + repair)
    Datanode {
        /// Path to the configuration file (.yaml, .yml or .json)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Stable id of this node; generated when omitted
        #[arg(long)]
        node_id: Option<String>,
        /// Seed peers to gossip with (repeatable)
        #[arg(long = "peer")]
        peers: Vec<String>,
    },
    /// Run a coordinator (client-facing quorum router)
    Coordinator {
        /// Path to the configuration file (.yaml, .yml or .json)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Data node base URLs forming the replica set (repeatable)
        #[arg(long = "replica", required = true)]
        replicas: Vec<String>,
    },
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(&path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => {
            let config = Config::default();
            config.validate().context("validating default config")?;
            config
        }
    };
    Ok(config)
}

fn init_logging(config: &Config) {
    if config.monitoring.enabled {
        tessera::init_logging_with_level(&config.monitoring.min_log_level);
    } else {
        tessera::init_logging();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Datanode {
            config,
            node_id,
            peers,
        } => run_datanode(config, node_id, peers).await,
        Command::Coordinator { config, replicas } => run_coordinator(config, replicas).await,
    }
}

async fn run_datanode(
    config_path: Option<PathBuf>,
    node_id: Option<String>,
    peers: Vec<String>,
) -> Result<()> {
    let config = load_config(config_path)?;
    init_logging(&config);

    let node_id = node_id.unwrap_or_else(config::default_node_id);
    tracing::info!(node = %node_id, "starting data node");

    let client = security::http_client(&config.security.mtls).context("building peer client")?;
    let node = Arc::new(DataNode::new(node_id.clone(), &config));
    let engine = Arc::new(GossipEngine::new(
        node_id,
        config.gossip.clone(),
        client.clone(),
    ));
    for peer in peers {
        engine.add_peer(peer);
    }
    Arc::clone(&engine).start();

    let repair = Arc::new(RepairLoop::new(
        Arc::clone(&node),
        Arc::clone(&engine),
        config.repair.clone(),
        client,
    ));
    Arc::clone(&repair).start();

    let addr = SocketAddr::from(([0, 0, 0, 0], config.gossip.port));
    let server = NodeServer::new(node, Arc::clone(&engine));
    let tls = security::rustls_config(&config.security.mtls).context("loading mTLS material")?;

    let result = tokio::select! {
        result = async {
            match tls {
                Some(tls) => server.bind_tls(addr, tls).await,
                None => server.bind(addr).await,
            }
        } => result.context("node server failed"),
        _ = signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            Ok(())
        }
    };

    engine.stop();
    repair.stop();
    result
}

async fn run_coordinator(config_path: Option<PathBuf>, replicas: Vec<String>) -> Result<()> {
    let config = load_config(config_path)?;
    init_logging(&config);
    tracing::info!(replicas = replicas.len(), "starting coordinator");

    let client = security::http_client(&config.security.mtls).context("building replica client")?;
    let coordinator = Arc::new(Coordinator::new(
        replicas,
        Quorum::from_config(&config.cluster),
        client,
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.cluster.coordinator_port));
    tokio::select! {
        result = tessera::coordinator::bind(coordinator, addr) => {
            result.context("coordinator server failed")
        }
        _ = signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            Ok(())
        }
    }
}
