/// Conflict resolution for concurrent versions.
///
/// Every write funnels the key's accumulated versions through a resolver.
/// Resolvers are pure and total: the same multiset of inputs always reduces
/// to the same multiset of outputs, regardless of input order. That is what
/// makes replica stores converge when the same writes arrive in different
/// orders.
use crate::config::ConflictResolutionKind;
use crate::types::VersionedValue;
use std::cmp::Ordering;

/// Reduce a set of versions under a policy.
pub trait ConflictResolver: Send + Sync {
    /// Resolve the supplied versions to the set the store should keep.
    fn resolve(&self, versions: Vec<VersionedValue>) -> Vec<VersionedValue>;

    /// Human-readable strategy name for logs.
    fn name(&self) -> &'static str;
}

/// Map the config enum to a concrete resolver.
pub fn resolver_for(
    kind: ConflictResolutionKind,
    max_versions_per_key: usize,
) -> Box<dyn ConflictResolver> {
    match kind {
        ConflictResolutionKind::LastWriteWins => Box::new(LastWriteWinsResolver),
        ConflictResolutionKind::Custom => Box::new(ConcurrentMergeResolver {
            max_versions: max_versions_per_key,
        }),
    }
}

/// Keep exactly one winner per key.
///
/// The winner dominates every other version or, when concurrent, carries the
/// lexicographically greater canonical clock string. The string tie-break is
/// arbitrary but deterministic, and it is the documented contract.
pub struct LastWriteWinsResolver;

impl ConflictResolver for LastWriteWinsResolver {
    fn resolve(&self, versions: Vec<VersionedValue>) -> Vec<VersionedValue> {
        let mut iter = versions.into_iter();
        let Some(mut latest) = iter.next() else {
            return Vec::new();
        };

        for v in iter {
            match v.clock.compare(&latest.clock) {
                Some(Ordering::Greater) => latest = v,
                None => {
                    if v.clock.to_canonical_string() > latest.clock.to_canonical_string() {
                        latest = v;
                    }
                }
                _ => {}
            }
        }

        tracing::trace!(strategy = self.name(), "resolved to 1 version");
        vec![latest]
    }

    fn name(&self) -> &'static str {
        "last-write-wins"
    }
}

/// Keep the antichain of concurrent versions, capped per key.
///
/// A version survives iff no other supplied version strictly dominates it.
/// The survivors are then pruned to `max_versions`, dropping the oldest
/// under clock order.
pub struct ConcurrentMergeResolver {
    /// Cap on retained versions; oldest are dropped beyond it.
    pub max_versions: usize,
}

impl ConflictResolver for ConcurrentMergeResolver {
    fn resolve(&self, versions: Vec<VersionedValue>) -> Vec<VersionedValue> {
        if versions.is_empty() {
            return Vec::new();
        }

        let mut results = Vec::new();
        for (i, v) in versions.iter().enumerate() {
            let dominated = versions.iter().enumerate().any(|(j, other)| {
                i != j
                    && (v.clock.is_dominated_by(&other.clock)
                        // Duplicate clocks: keep a single representative.
                        || (v.clock.compare(&other.clock) == Some(Ordering::Equal) && j < i))
            });
            if !dominated {
                results.push(v.clone());
            }
        }

        tracing::trace!(
            strategy = self.name(),
            remaining = results.len(),
            "resolved versions"
        );
        prune_versions(results, self.max_versions)
    }

    fn name(&self) -> &'static str {
        "concurrent-merge"
    }
}

/// Drop the oldest versions beyond `max`.
///
/// The sort is a deterministic total extension of happens-before: dominated
/// clocks order first, concurrent clocks fall back to the canonical string.
pub fn prune_versions(mut versions: Vec<VersionedValue>, max: usize) -> Vec<VersionedValue> {
    if max < 1 || versions.len() <= max {
        return versions;
    }
    versions.sort_by(|a, b| match a.clock.compare(&b.clock) {
        Some(Ordering::Less) => Ordering::Less,
        Some(Ordering::Greater) => Ordering::Greater,
        _ => a
            .clock
            .to_canonical_string()
            .cmp(&b.clock.to_canonical_string()),
    });
    versions.split_off(versions.len() - max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VectorClock;

    fn version(payload: &[u8], entries: &[(&str, u64)]) -> VersionedValue {
        let mut clock = VectorClock::new();
        for (node, count) in entries {
            clock.clocks.insert(node.to_string(), *count);
        }
        VersionedValue::new(payload.to_vec(), clock)
    }

    #[test]
    fn test_lww_empty_input() {
        assert!(LastWriteWinsResolver.resolve(Vec::new()).is_empty());
    }

    #[test]
    fn test_lww_later_clock_wins() {
        let a = version(b"A", &[("n1", 1)]);
        let b = version(b"B", &[("n1", 2)]);
        let resolved = LastWriteWinsResolver.resolve(vec![a, b.clone()]);
        assert_eq!(resolved, vec![b]);
    }

    #[test]
    fn test_lww_concurrent_tie_break_is_canonical_string() {
        let a = version(b"A", &[("n1", 1)]);
        let b = version(b"B", &[("n2", 1)]);
        // "n2:1" > "n1:1" lexicographically, so b wins from either order.
        let forward = LastWriteWinsResolver.resolve(vec![a.clone(), b.clone()]);
        let reverse = LastWriteWinsResolver.resolve(vec![b.clone(), a]);
        assert_eq!(forward, vec![b.clone()]);
        assert_eq!(forward, reverse);
    }

    #[test]
    fn test_merge_keeps_concurrent_versions() {
        let a = version(b"A", &[("n1", 1)]);
        let b = version(b"B", &[("n2", 1)]);
        let resolver = ConcurrentMergeResolver { max_versions: 4 };
        let resolved = resolver.resolve(vec![a.clone(), b.clone()]);
        assert_eq!(resolved.len(), 2);
        assert!(resolved.contains(&a));
        assert!(resolved.contains(&b));
    }

    #[test]
    fn test_merge_drops_dominated_versions() {
        let a = version(b"A", &[("n1", 1)]);
        let b = version(b"B", &[("n2", 1)]);
        let c = version(b"C", &[("n1", 1), ("n2", 2)]);
        let resolver = ConcurrentMergeResolver { max_versions: 4 };
        let resolved = resolver.resolve(vec![a, b, c.clone()]);
        assert_eq!(resolved, vec![c]);
    }

    #[test]
    fn test_merge_deduplicates_equal_clocks() {
        let a = version(b"A", &[("n1", 1)]);
        let resolver = ConcurrentMergeResolver { max_versions: 4 };
        let resolved = resolver.resolve(vec![a.clone(), a.clone()]);
        assert_eq!(resolved.len(), 1);
    }

    #[test]
    fn test_merge_idempotent() {
        let versions = vec![
            version(b"A", &[("n1", 2)]),
            version(b"B", &[("n2", 1)]),
            version(b"C", &[("n1", 1)]),
        ];
        let resolver = ConcurrentMergeResolver { max_versions: 4 };
        let once = resolver.resolve(versions);
        let twice = resolver.resolve(once.clone());
        assert_eq!(once.len(), twice.len());
        for v in &once {
            assert!(twice.contains(v));
        }
    }

    #[test]
    fn test_merge_order_independent() {
        let a = version(b"A", &[("n1", 2)]);
        let b = version(b"B", &[("n2", 1)]);
        let c = version(b"C", &[("n1", 1)]);
        let resolver = ConcurrentMergeResolver { max_versions: 4 };
        let forward = resolver.resolve(vec![a.clone(), b.clone(), c.clone()]);
        let reverse = resolver.resolve(vec![c, b, a]);
        assert_eq!(forward.len(), reverse.len());
        for v in &forward {
            assert!(reverse.contains(v));
        }
    }

    #[test]
    fn test_prune_drops_oldest() {
        let old = version(b"old", &[("n1", 1)]);
        let mid = version(b"mid", &[("n1", 2)]);
        let new = version(b"new", &[("n1", 3)]);
        let pruned = prune_versions(vec![new.clone(), old, mid.clone()], 2);
        assert_eq!(pruned.len(), 2);
        assert!(pruned.contains(&mid));
        assert!(pruned.contains(&new));
    }

    #[test]
    fn test_prune_within_cap_is_untouched() {
        let a = version(b"A", &[("n1", 1)]);
        let pruned = prune_versions(vec![a.clone()], 4);
        assert_eq!(pruned, vec![a]);
    }

    #[test]
    fn test_factory_maps_config() {
        assert_eq!(
            resolver_for(ConflictResolutionKind::LastWriteWins, 10).name(),
            "last-write-wins"
        );
        assert_eq!(
            resolver_for(ConflictResolutionKind::Custom, 10).name(),
            "concurrent-merge"
        );
    }
}
