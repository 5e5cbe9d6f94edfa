/// Gossip spread strategies.
///
/// Spread is pure transport choreography: one task per peer, no cross-peer
/// ordering, failures logged and dropped. The transport client owns the
/// deadlines; nothing here retries within a tick.
use crate::config::SpreadStrategyKind;
use crate::types::GossipMessage;
use async_trait::async_trait;

/// Fan a round out to the selected peers.
#[async_trait]
pub trait SpreadStrategy: Send + Sync {
    /// Dispatch the message to every peer. Returns once the per-peer work
    /// has been handed off; individual failures never propagate.
    async fn spread(&self, msg: GossipMessage, peers: Vec<String>);
}

/// Map the config enum to a concrete strategy over the given client.
pub fn spread_strategy(kind: SpreadStrategyKind, client: reqwest::Client) -> Box<dyn SpreadStrategy> {
    match kind {
        SpreadStrategyKind::Push => Box::new(PushSpread { client }),
        SpreadStrategyKind::Pull => Box::new(PullSpread { client }),
        SpreadStrategyKind::PullPush => Box::new(PushPullSpread {
            push: PushSpread {
                client: client.clone(),
            },
            pull: PullSpread { client },
        }),
    }
}

/// POST the message to each peer's `/gossip`.
pub struct PushSpread {
    client: reqwest::Client,
}

#[async_trait]
impl SpreadStrategy for PushSpread {
    async fn spread(&self, msg: GossipMessage, peers: Vec<String>) {
        for peer in peers {
            let client = self.client.clone();
            let msg = msg.clone();
            tokio::spawn(async move {
                let url = format!("{}/gossip", peer);
                match client.post(&url).json(&msg).send().await {
                    Ok(response) if response.status().is_success() => {
                        tracing::trace!(peer = %peer, "gossip pushed");
                    }
                    Ok(response) => {
                        tracing::warn!(peer = %peer, status = %response.status(), "gossip push rejected");
                    }
                    Err(e) => {
                        tracing::warn!(peer = %peer, error = %e, "gossip push failed");
                    }
                }
            });
        }
    }
}

/// GET each peer's `/health`; the response body is the peer's view.
///
/// Folding pulled state into the local map belongs to the transport-driven
/// `/gossip` path; here the view is only logged.
pub struct PullSpread {
    client: reqwest::Client,
}

#[async_trait]
impl SpreadStrategy for PullSpread {
    async fn spread(&self, _msg: GossipMessage, peers: Vec<String>) {
        for peer in peers {
            let client = self.client.clone();
            tokio::spawn(async move {
                let url = format!("{}/health", peer);
                match client.get(&url).send().await {
                    Ok(response) => match response.text().await {
                        Ok(body) => tracing::debug!(peer = %peer, view = %body, "gossip pulled"),
                        Err(e) => tracing::warn!(peer = %peer, error = %e, "gossip pull body failed"),
                    },
                    Err(e) => {
                        tracing::warn!(peer = %peer, error = %e, "gossip pull failed");
                    }
                }
            });
        }
    }
}

/// Push and pull concurrently; the round completes when both finish.
pub struct PushPullSpread {
    push: PushSpread,
    pull: PullSpread,
}

#[async_trait]
impl SpreadStrategy for PushPullSpread {
    async fn spread(&self, msg: GossipMessage, peers: Vec<String>) {
        tokio::join!(
            self.push.spread(msg.clone(), peers.clone()),
            self.pull.spread(msg, peers),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpreadStrategyKind;

    #[tokio::test]
    async fn test_spread_survives_unreachable_peers() {
        // Nothing listens on these ports; spread must neither error nor panic.
        let peers = vec![
            "http://127.0.0.1:1".to_string(),
            "http://127.0.0.1:2".to_string(),
        ];
        let msg = GossipMessage {
            sender_id: "n1".to_string(),
            timestamp: chrono::Utc::now(),
            node_health: Default::default(),
        };

        for kind in [
            SpreadStrategyKind::Push,
            SpreadStrategyKind::Pull,
            SpreadStrategyKind::PullPush,
        ] {
            let strategy = spread_strategy(kind, reqwest::Client::new());
            strategy.spread(msg.clone(), peers.clone()).await;
        }
    }
}
