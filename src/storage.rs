/// Keyed multi-version storage.
///
/// Every key maps to the antichain of versions the configured resolver kept
/// (exactly one under last-write-wins). `set` is commutative and idempotent
/// under the resolver, which is what lets anti-entropy repair feed peer
/// versions straight through it on both sides and still converge.
///
/// The in-memory implementation guards its map with a single reader-writer
/// lock: mutations serialize, reads run in parallel, and everything handed
/// back to callers is a snapshot that stays valid after the lock drops.
use crate::conflict::ConflictResolver;
use crate::error::{TesseraError, TesseraResult};
use crate::types::VersionedValue;
use std::collections::HashMap;
use std::sync::RwLock;

/// Key-value storage backend. The persistence plug point: a disk-backed
/// implementation slots in behind this trait without touching the node.
pub trait Store: Send + Sync {
    /// Return all versions for a key (multiple possible under concurrent
    /// writes), or `KeyNotFound`.
    fn get(&self, key: &str) -> TesseraResult<Vec<VersionedValue>>;

    /// Merge a versioned value into the key's existing versions and store
    /// the resolver's output.
    fn set(&self, key: &str, version: VersionedValue) -> TesseraResult<()>;

    /// Remove the key entirely. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> TesseraResult<()>;

    /// Snapshot of resident keys, unspecified order.
    fn list_keys(&self) -> Vec<String>;
}

/// In-memory [`Store`] implementation.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<VersionedValue>>>,
    resolver: Box<dyn ConflictResolver>,
}

impl MemoryStore {
    /// Create a store that resolves writes with the given resolver.
    pub fn new(resolver: Box<dyn ConflictResolver>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            resolver,
        }
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> TesseraResult<Vec<VersionedValue>> {
        let entries = self.entries.read().expect("store lock poisoned");
        match entries.get(key) {
            Some(versions) if !versions.is_empty() => Ok(versions.clone()),
            _ => Err(TesseraError::KeyNotFound {
                key: key.to_string(),
            }),
        }
    }

    fn set(&self, key: &str, version: VersionedValue) -> TesseraResult<()> {
        let mut entries = self.entries.write().expect("store lock poisoned");
        let mut versions = entries.remove(key).unwrap_or_default();
        versions.push(version);
        let resolved = self.resolver.resolve(versions);
        tracing::trace!(key, versions = resolved.len(), "stored");
        entries.insert(key.to_string(), resolved);
        Ok(())
    }

    fn delete(&self, key: &str) -> TesseraResult<()> {
        let mut entries = self.entries.write().expect("store lock poisoned");
        entries.remove(key);
        Ok(())
    }

    fn list_keys(&self) -> Vec<String> {
        let entries = self.entries.read().expect("store lock poisoned");
        entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConflictResolutionKind;
    use crate::conflict::resolver_for;
    use crate::types::VectorClock;

    fn version(payload: &[u8], entries: &[(&str, u64)]) -> VersionedValue {
        let mut clock = VectorClock::new();
        for (node, count) in entries {
            clock.clocks.insert(node.to_string(), *count);
        }
        VersionedValue::new(payload.to_vec(), clock)
    }

    fn lww_store() -> MemoryStore {
        MemoryStore::new(resolver_for(ConflictResolutionKind::LastWriteWins, 10))
    }

    fn merge_store(max: usize) -> MemoryStore {
        MemoryStore::new(resolver_for(ConflictResolutionKind::Custom, max))
    }

    #[test]
    fn test_get_missing_key() {
        let store = lww_store();
        assert!(matches!(
            store.get("absent"),
            Err(TesseraError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn test_set_then_get() {
        let store = lww_store();
        let v = version(b"hello", &[("n1", 1)]);
        store.set("k", v.clone()).unwrap();
        assert_eq!(store.get("k").unwrap(), vec![v]);
    }

    #[test]
    fn test_lww_keeps_single_version() {
        let store = lww_store();
        store.set("k", version(b"A", &[("n1", 1)])).unwrap();
        store.set("k", version(b"B", &[("n1", 2)])).unwrap();
        let versions = store.get("k").unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].value(), b"B");
    }

    #[test]
    fn test_merge_keeps_antichain() {
        let store = merge_store(4);
        store.set("k", version(b"A", &[("n1", 1)])).unwrap();
        store.set("k", version(b"B", &[("n2", 1)])).unwrap();
        assert_eq!(store.get("k").unwrap().len(), 2);

        // A dominating write collapses the antichain.
        store.set("k", version(b"C", &[("n1", 1), ("n2", 2)])).unwrap();
        let versions = store.get("k").unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].value(), b"C");
    }

    #[test]
    fn test_delete_removes_entry() {
        let store = lww_store();
        store.set("k", version(b"A", &[("n1", 1)])).unwrap();
        store.delete("k").unwrap();
        assert!(store.get("k").is_err());
        // Deleting again is fine.
        store.delete("k").unwrap();
    }

    #[test]
    fn test_list_keys_snapshot() {
        let store = lww_store();
        store.set("a", version(b"1", &[("n1", 1)])).unwrap();
        store.set("b", version(b"2", &[("n1", 2)])).unwrap();
        let mut keys = store.list_keys();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_convergence_under_permuted_writes() {
        // Applying the same multiset of writes in any order yields the same
        // antichain per key.
        let writes = vec![
            version(b"A", &[("n1", 1)]),
            version(b"B", &[("n2", 1)]),
            version(b"C", &[("n1", 2), ("n2", 1)]),
        ];

        let forward = merge_store(4);
        for w in &writes {
            forward.set("k", w.clone()).unwrap();
        }
        let backward = merge_store(4);
        for w in writes.iter().rev() {
            backward.set("k", w.clone()).unwrap();
        }

        let a = forward.get("k").unwrap();
        let b = backward.get("k").unwrap();
        assert_eq!(a.len(), b.len());
        for v in &a {
            assert!(b.contains(v));
        }
    }
}
