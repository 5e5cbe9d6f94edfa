/// A data node: one replica shard of the keyspace.
///
/// Composes the store, the Merkle tree and the node's vector clock. Local
/// writes increment the node's own clock entry before they hit the store;
/// remote versions arriving via replication or repair keep their clocks and
/// are merged into the node clock so later local writes dominate them.
///
/// Lock order is DataNode clock → Store → Merkle; nothing acquires upward,
/// and no lock is held across I/O.
use crate::config::Config;
use crate::conflict::resolver_for;
use crate::error::TesseraResult;
use crate::merkle::{KeyRange, MerkleTree};
use crate::quorum::Quorum;
use crate::storage::{MemoryStore, Store};
use crate::types::{VectorClock, VersionedValue};
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

/// A distributed storage node.
pub struct DataNode {
    id: String,
    store: Box<dyn Store>,
    merkle: RwLock<MerkleTree>,
    clock: Mutex<VectorClock>,
    quorum: Quorum,
}

impl DataNode {
    /// Construct a node from validated configuration.
    pub fn new(id: impl Into<String>, config: &Config) -> Self {
        let resolver = resolver_for(
            config.vector_clock.conflict_resolution,
            config.vector_clock.max_versions_per_key,
        );
        Self {
            id: id.into(),
            store: Box::new(MemoryStore::new(resolver)),
            merkle: RwLock::new(MerkleTree::new(config.merkle_tree.bucket_size)),
            clock: Mutex::new(VectorClock::new()),
            quorum: Quorum::from_config(&config.cluster),
        }
    }

    /// This node's id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The node's quorum thresholds.
    pub fn quorum(&self) -> &Quorum {
        &self.quorum
    }

    /// Store a value for a key.
    ///
    /// Increments this node's entry in the local clock, tags the payload,
    /// stores it, then rebuilds the Merkle tree, in that order, so the
    /// root always reflects the write that just completed.
    pub fn put(&self, key: &str, value: Vec<u8>) -> TesseraResult<()> {
        let mut clock = self.clock.lock().expect("clock lock poisoned");
        clock.increment(&self.id);
        let versioned = VersionedValue::new(value, clock.clone());

        self.store.set(key, versioned)?;
        self.rebuild_merkle();
        tracing::debug!(node = %self.id, key, "put");
        Ok(())
    }

    /// Return the stored versions for a key. Resolution already happened at
    /// write time; readers see the antichain.
    pub fn get(&self, key: &str) -> TesseraResult<Vec<VersionedValue>> {
        self.store.get(key)
    }

    /// Remove a key entirely and update the tree.
    pub fn delete(&self, key: &str) -> TesseraResult<()> {
        let _clock = self.clock.lock().expect("clock lock poisoned");
        self.store.delete(key)?;
        self.rebuild_merkle();
        tracing::debug!(node = %self.id, key, "delete");
        Ok(())
    }

    /// Snapshot of locally resident keys.
    pub fn list_keys(&self) -> Vec<String> {
        self.store.list_keys()
    }

    /// Apply versions received from a peer (replication or repair).
    ///
    /// Each version keeps its original clock and goes through the store's
    /// resolver; the peer clocks are merged into the node clock so later
    /// local writes causally follow everything seen here.
    pub fn apply_remote(&self, key: &str, versions: Vec<VersionedValue>) -> TesseraResult<()> {
        if versions.is_empty() {
            return Ok(());
        }
        let mut clock = self.clock.lock().expect("clock lock poisoned");
        for version in versions {
            clock.merge(&version.clock);
            self.store.set(key, version)?;
        }
        self.rebuild_merkle();
        tracing::debug!(node = %self.id, key, "applied remote versions");
        Ok(())
    }

    /// Hex root hash for anti-entropy comparison.
    pub fn merkle_root(&self) -> String {
        self.merkle.read().expect("merkle lock poisoned").root_hash()
    }

    /// Clone of the tree for shipping to a peer.
    pub fn merkle_snapshot(&self) -> MerkleTree {
        self.merkle.read().expect("merkle lock poisoned").clone()
    }

    /// Differing leaf ranges against a peer's tree.
    pub fn diff_merkle(&self, peer_tree: &MerkleTree) -> TesseraResult<Vec<KeyRange>> {
        self.merkle
            .read()
            .expect("merkle lock poisoned")
            .diff(peer_tree)
    }

    /// Rebuild the tree from the store, called after each mutation.
    ///
    /// Multi-version entries hash the antichain's payloads concatenated in
    /// canonical clock order, so replicas holding the same antichain hash
    /// identically regardless of arrival order.
    fn rebuild_merkle(&self) {
        let mut keys = self.store.list_keys();
        keys.sort();

        let mut kvs: HashMap<String, Vec<u8>> = HashMap::with_capacity(keys.len());
        for key in &keys {
            if let Ok(mut versions) = self.store.get(key) {
                versions.sort_by(|a, b| {
                    a.clock
                        .to_canonical_string()
                        .cmp(&b.clock.to_canonical_string())
                });
                let digest: Vec<u8> = versions
                    .iter()
                    .flat_map(|v| v.value().iter().copied())
                    .collect();
                kvs.insert(key.clone(), digest);
            }
        }

        let mut merkle = self.merkle.write().expect("merkle lock poisoned");
        merkle.build(&keys, &kvs);
    }
}
