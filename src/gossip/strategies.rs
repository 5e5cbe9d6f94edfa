/// Gossip initiation strategies.
///
/// Initiation shapes what goes into an outbound round and how an incoming
/// round folds into local state. Anti-entropy and rumor-mongering merges are
/// commutative and associative over received messages, which is what the
/// convergence argument rests on; aggregation only summarizes and keeps
/// local state on merge.
use crate::config::InitiationStrategyKind;
use crate::types::{GossipMessage, NodeHealth};
use chrono::Utc;

/// Shape outbound gossip content and fold incoming messages.
pub trait InitiationStrategy: Send + Sync {
    /// Build the message for one round from a bounded health snapshot.
    fn generate_message(&self, sender_id: &str, state: NodeHealth) -> GossipMessage;

    /// Fold an incoming message into the local health map and return the
    /// replacement map.
    fn merge(&self, local: NodeHealth, incoming: &GossipMessage) -> NodeHealth;
}

/// Map the config enum to a concrete strategy.
pub fn initiation_strategy(kind: InitiationStrategyKind) -> Box<dyn InitiationStrategy> {
    match kind {
        InitiationStrategyKind::AntiEntropy => Box::new(AntiEntropyStrategy),
        InitiationStrategyKind::RumorMongering => Box::new(RumorMongeringStrategy),
        InitiationStrategyKind::Aggregation => Box::new(AggregationStrategy),
    }
}

/// Ship the full (truncated) state map; adopt the incoming map wholesale.
pub struct AntiEntropyStrategy;

impl InitiationStrategy for AntiEntropyStrategy {
    fn generate_message(&self, sender_id: &str, state: NodeHealth) -> GossipMessage {
        tracing::debug!(nodes = state.len(), "anti-entropy round");
        GossipMessage {
            sender_id: sender_id.to_string(),
            timestamp: Utc::now(),
            node_health: state,
        }
    }

    fn merge(&self, _local: NodeHealth, incoming: &GossipMessage) -> NodeHealth {
        incoming.node_health.clone()
    }
}

/// Ship a random half of the state (independent coin flip per entry);
/// pointwise-overwrite local entries with incoming values.
pub struct RumorMongeringStrategy;

impl InitiationStrategy for RumorMongeringStrategy {
    fn generate_message(&self, sender_id: &str, state: NodeHealth) -> GossipMessage {
        let partial: NodeHealth = state
            .into_iter()
            .filter(|_| rand::random::<bool>())
            .collect();
        tracing::debug!(nodes = partial.len(), "rumor-mongering round");
        GossipMessage {
            sender_id: sender_id.to_string(),
            timestamp: Utc::now(),
            node_health: partial,
        }
    }

    fn merge(&self, mut local: NodeHealth, incoming: &GossipMessage) -> NodeHealth {
        for (node_id, seen) in &incoming.node_health {
            local.insert(node_id.clone(), *seen);
        }
        local
    }
}

/// Ship a one-entry summary: the freshest last-seen timestamp in the state
/// (or now when the state is empty). The summary is advisory; merge keeps
/// local state untouched.
pub struct AggregationStrategy;

impl InitiationStrategy for AggregationStrategy {
    fn generate_message(&self, sender_id: &str, state: NodeHealth) -> GossipMessage {
        let freshest = state.values().max().copied().unwrap_or_else(Utc::now);
        let summary: NodeHealth = [("healthy".to_string(), freshest)].into_iter().collect();
        tracing::debug!(summary = %freshest, "aggregation round");
        GossipMessage {
            sender_id: sender_id.to_string(),
            timestamp: Utc::now(),
            node_health: summary,
        }
    }

    fn merge(&self, local: NodeHealth, _incoming: &GossipMessage) -> NodeHealth {
        local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn state(count: usize) -> NodeHealth {
        let now = Utc::now();
        (0..count)
            .map(|i| (format!("node-{}", i), now - Duration::seconds(i as i64)))
            .collect()
    }

    #[test]
    fn test_anti_entropy_ships_full_state() {
        let msg = AntiEntropyStrategy.generate_message("n1", state(6));
        assert_eq!(msg.sender_id, "n1");
        assert_eq!(msg.node_health.len(), 6);
    }

    #[test]
    fn test_anti_entropy_merge_adopts_incoming() {
        let local = state(3);
        let incoming = AntiEntropyStrategy.generate_message("n2", state(6));
        let merged = AntiEntropyStrategy.merge(local, &incoming);
        assert_eq!(merged, incoming.node_health);
    }

    #[test]
    fn test_rumor_ships_subset() {
        let full = state(64);
        let msg = RumorMongeringStrategy.generate_message("n1", full.clone());
        assert!(msg.node_health.len() <= full.len());
        for (node, seen) in &msg.node_health {
            assert_eq!(full.get(node), Some(seen));
        }
    }

    #[test]
    fn test_rumor_merge_overwrites_pointwise() {
        let now = Utc::now();
        let older = now - Duration::seconds(60);
        let local: NodeHealth = [("n2".to_string(), older), ("n9".to_string(), older)]
            .into_iter()
            .collect();
        let incoming = GossipMessage {
            sender_id: "n2".to_string(),
            timestamp: now,
            node_health: [("n2".to_string(), now)].into_iter().collect(),
        };

        let merged = RumorMongeringStrategy.merge(local, &incoming);
        assert_eq!(merged.get("n2"), Some(&now));
        // Entries the rumor skipped survive.
        assert_eq!(merged.get("n9"), Some(&older));
    }

    #[test]
    fn test_aggregation_summary_is_freshest() {
        let mut s = state(4);
        let freshest = Utc::now() + Duration::seconds(30);
        s.insert("node-x".to_string(), freshest);

        let msg = AggregationStrategy.generate_message("n1", s);
        assert_eq!(msg.node_health.len(), 1);
        assert_eq!(msg.node_health.get("healthy"), Some(&freshest));
    }

    #[test]
    fn test_aggregation_merge_keeps_local() {
        let local = state(3);
        let incoming = AggregationStrategy.generate_message("n2", state(5));
        let merged = AggregationStrategy.merge(local.clone(), &incoming);
        assert_eq!(merged, local);
    }
}
