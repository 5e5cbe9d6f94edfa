/// Common types used throughout Tessera.
///
/// This module defines the replication substrate's core data structures:
/// vector clocks for causal ordering, versioned values carrying a payload
/// and its clock, and the gossip wire message. These types are simple,
/// immutable once created, and serializable for the HTTP surface.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Node liveness map: node id → last-seen timestamp.
///
/// A missing entry means "unknown", not "unhealthy".
pub type NodeHealth = HashMap<String, DateTime<Utc>>;

/// Vector clock for causal ordering in distributed systems.
///
/// A vector clock tracks the happens-before relationship between events
/// across multiple nodes. Each node maintains a monotonic counter, and the
/// vector is updated on every write. Entries are never decremented; a
/// missing entry reads as zero, so clocks naming disjoint node sets compare
/// cleanly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock {
    /// Node ID -> logical timestamp mapping
    pub clocks: HashMap<String, u64>,
}

impl VectorClock {
    /// Create a new empty vector clock.
    pub fn new() -> Self {
        Self {
            clocks: HashMap::new(),
        }
    }

    /// Increment the clock for a specific node.
    pub fn increment(&mut self, node_id: &str) {
        let entry = self.clocks.entry(node_id.to_string()).or_insert(0);
        *entry += 1;
    }

    /// Merge another vector clock into this one (taking max of each entry).
    pub fn merge(&mut self, other: &VectorClock) {
        for (node_id, timestamp) in &other.clocks {
            let entry = self.clocks.entry(node_id.clone()).or_insert(0);
            *entry = (*entry).max(*timestamp);
        }
    }

    /// Compare two vector clocks.
    ///
    /// Returns:
    /// - `Some(Ordering::Less)` if self happened before other
    /// - `Some(Ordering::Greater)` if self happened after other
    /// - `Some(Ordering::Equal)` if they're the same
    /// - `None` if they're concurrent (conflict)
    pub fn compare(&self, other: &VectorClock) -> Option<Ordering> {
        let all_nodes: std::collections::HashSet<_> =
            self.clocks.keys().chain(other.clocks.keys()).collect();

        let mut has_less = false;
        let mut has_greater = false;

        for node_id in all_nodes {
            let self_val = self.clocks.get(node_id).copied().unwrap_or(0);
            let other_val = other.clocks.get(node_id).copied().unwrap_or(0);

            match self_val.cmp(&other_val) {
                Ordering::Less => has_less = true,
                Ordering::Greater => has_greater = true,
                Ordering::Equal => {}
            }
        }

        match (has_less, has_greater) {
            (true, true) => None, // Concurrent (conflict)
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (false, false) => Some(Ordering::Equal),
        }
    }

    /// Check if this clock dominates (happened after) another.
    pub fn dominates(&self, other: &VectorClock) -> bool {
        matches!(self.compare(other), Some(Ordering::Greater))
    }

    /// Check if this clock is dominated by (happened before) another.
    pub fn is_dominated_by(&self, other: &VectorClock) -> bool {
        matches!(self.compare(other), Some(Ordering::Less))
    }

    /// Check if clocks are concurrent (conflict).
    pub fn is_concurrent_with(&self, other: &VectorClock) -> bool {
        self.compare(other).is_none()
    }

    /// Canonical string rendering, keys sorted lexicographically.
    ///
    /// Two equal clocks always render identically, which makes this the
    /// deterministic tie-break for concurrent versions.
    pub fn to_canonical_string(&self) -> String {
        let mut entries: Vec<_> = self.clocks.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
            .into_iter()
            .map(|(node, count)| format!("{}:{}", node, count))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl std::fmt::Display for VectorClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.to_canonical_string())
    }
}

/// A versioned value: payload bytes tagged with the clock that wrote them.
///
/// Immutable once created. The payload travels hex-encoded in JSON, the
/// same encoding the Merkle leaves hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedValue {
    /// The stored payload bytes
    #[serde(with = "hex_bytes")]
    pub value: Vec<u8>,
    /// Vector clock recorded at write time
    pub clock: VectorClock,
}

impl VersionedValue {
    /// Create a new versioned value.
    pub fn new(value: Vec<u8>, clock: VectorClock) -> Self {
        Self { value, clock }
    }

    /// Get the payload bytes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Get the clock recorded at write time.
    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }
}

/// Serialize payload bytes as a hex string (and back).
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(&encoded).map_err(serde::de::Error::custom)
    }
}

/// A single gossip round's payload.
///
/// Wire schema (JSON):
/// `{ "senderID": "...", "timestamp": RFC3339, "nodeHealth": { "<nodeId>": RFC3339 } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipMessage {
    /// Unique ID of the sending node
    #[serde(rename = "senderID")]
    pub sender_id: String,
    /// Time the message was generated
    pub timestamp: DateTime<Utc>,
    /// Map of node id → last-seen timestamp
    #[serde(rename = "nodeHealth")]
    pub node_health: NodeHealth,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(entries: &[(&str, u64)]) -> VectorClock {
        let mut c = VectorClock::new();
        for (node, count) in entries {
            c.clocks.insert(node.to_string(), *count);
        }
        c
    }

    #[test]
    fn test_compare_reflexive() {
        let a = clock(&[("n1", 3), ("n2", 1)]);
        assert_eq!(a.compare(&a), Some(Ordering::Equal));
    }

    #[test]
    fn test_compare_dominance() {
        let a = clock(&[("n1", 1)]);
        let b = clock(&[("n1", 2)]);
        assert_eq!(a.compare(&b), Some(Ordering::Less));
        assert_eq!(b.compare(&a), Some(Ordering::Greater));
        assert!(a.is_dominated_by(&b));
        assert!(b.dominates(&a));
    }

    #[test]
    fn test_compare_concurrent_disjoint_nodes() {
        // Clocks naming disjoint node sets are concurrent.
        let a = clock(&[("n1", 1)]);
        let b = clock(&[("n2", 1)]);
        assert_eq!(a.compare(&b), None);
        assert!(a.is_concurrent_with(&b));
    }

    #[test]
    fn test_compare_missing_entry_is_zero() {
        let a = clock(&[("n1", 1)]);
        let b = clock(&[("n1", 1), ("n2", 2)]);
        assert_eq!(a.compare(&b), Some(Ordering::Less));
    }

    #[test]
    fn test_empty_clocks_are_equal() {
        assert_eq!(
            VectorClock::new().compare(&VectorClock::new()),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_merge_takes_pointwise_max() {
        let mut a = clock(&[("n1", 3), ("n2", 1)]);
        let b = clock(&[("n1", 1), ("n2", 5), ("n3", 2)]);
        a.merge(&b);
        assert_eq!(a, clock(&[("n1", 3), ("n2", 5), ("n3", 2)]));
        // Merged clock dominates or equals both inputs.
        assert!(!a.is_dominated_by(&b));
    }

    #[test]
    fn test_increment_is_monotonic() {
        let mut a = VectorClock::new();
        a.increment("n1");
        a.increment("n1");
        assert_eq!(a.clocks.get("n1"), Some(&2));
    }

    #[test]
    fn test_canonical_string_sorted() {
        let a = clock(&[("zeta", 1), ("alpha", 2)]);
        assert_eq!(a.to_canonical_string(), "alpha:2,zeta:1");
    }

    #[test]
    fn test_copy_is_independent() {
        let a = clock(&[("n1", 1)]);
        let mut b = a.clone();
        b.increment("n1");
        assert_eq!(a.clocks.get("n1"), Some(&1));
        assert_eq!(b.clocks.get("n1"), Some(&2));
    }

    #[test]
    fn test_versioned_value_hex_round_trip() {
        let vv = VersionedValue::new(vec![0xde, 0xad, 0xbe, 0xef], clock(&[("n1", 1)]));
        let json = serde_json::to_value(&vv).unwrap();
        assert_eq!(json["value"], "deadbeef");
        let decoded: VersionedValue = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, vv);
    }

    #[test]
    fn test_gossip_message_wire_fields() {
        let msg = GossipMessage {
            sender_id: "n1".to_string(),
            timestamp: Utc::now(),
            node_health: NodeHealth::new(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("senderID").is_some());
        assert!(json.get("nodeHealth").is_some());
        assert!(json.get("timestamp").is_some());
    }
}
