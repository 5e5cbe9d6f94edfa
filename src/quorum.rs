/// Quorum arithmetic tying R, W and N together.
///
/// `read_quorum + write_quorum > total_replicas` guarantees every read set
/// overlaps every write set. The invariant is enforced at config validation;
/// this component assumes it thereafter and only counts acks.
use crate::config::ClusterConfig;

/// Replication thresholds for a key's preference list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quorum {
    read_quorum: usize,
    write_quorum: usize,
    total_replicas: usize,
}

impl Quorum {
    /// Build from validated cluster settings.
    pub fn from_config(config: &ClusterConfig) -> Self {
        Self {
            read_quorum: config.read_quorum,
            write_quorum: config.write_quorum,
            total_replicas: config.total_replicas,
        }
    }

    /// Acks required for a read (R).
    pub fn required_read_acks(&self) -> usize {
        self.read_quorum
    }

    /// Acks required for a write (W).
    pub fn required_write_acks(&self) -> usize {
        self.write_quorum
    }

    /// Replicas per key (N).
    pub fn total_replicas(&self) -> usize {
        self.total_replicas
    }

    /// True once enough read acks were received.
    pub fn is_read_quorum_met(&self, acks: usize) -> bool {
        acks >= self.read_quorum
    }

    /// True once enough write acks were received.
    pub fn is_write_quorum_met(&self, acks: usize) -> bool {
        acks >= self.write_quorum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quorum(r: usize, w: usize, n: usize) -> Quorum {
        Quorum {
            read_quorum: r,
            write_quorum: w,
            total_replicas: n,
        }
    }

    #[test]
    fn test_thresholds() {
        let q = quorum(2, 2, 3);
        assert!(!q.is_read_quorum_met(1));
        assert!(q.is_read_quorum_met(2));
        assert!(q.is_write_quorum_met(3));
        assert!(!q.is_write_quorum_met(0));
    }

    #[test]
    fn test_monotone_in_acks() {
        let q = quorum(2, 3, 4);
        let mut met = false;
        for acks in 0..=4 {
            let now = q.is_read_quorum_met(acks);
            assert!(!met || now, "quorum check must be monotone");
            met = now;
        }
    }

    #[test]
    fn test_from_config() {
        let config = ClusterConfig::default();
        let q = Quorum::from_config(&config);
        assert_eq!(q.required_read_acks(), config.read_quorum);
        assert_eq!(q.required_write_acks(), config.write_quorum);
        assert_eq!(q.total_replicas(), config.total_replicas);
    }
}
