/// Bucketed Merkle tree for anti-entropy repair.
///
/// Leaves cover `bucket_size` consecutive sorted keys; comparing two trees
/// built from the same sorted key set and bucket size finds the diverged
/// buckets in O(log n) hash comparisons when the divergence is small.
///
/// ## How it works
///
/// 1. Group the sorted keys into buckets and hash each bucket into a leaf
/// 2. Pair nodes level by level, hashing left ‖ right; an odd trailing node
///    is promoted unchanged to the next level
/// 3. Equal roots ⇒ identical value bytes per key
/// 4. Differing roots ⇒ recurse only into differing subtrees; the leaves
///    reached are the buckets to repair
///
/// The tree is serializable so a peer can ship its structure for diffing.
use crate::error::{TesseraError, TesseraResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::collections::HashSet;

/// A contiguous group of sorted keys hashed into one leaf.
pub type KeyRange = Vec<String>;

/// A node in the Merkle tree. Leaves carry their key range; internal nodes
/// own their children outright.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleNode {
    /// Hex-encoded SHA-256 of the bucket (leaf) or of left ‖ right (branch).
    pub hash: String,
    /// Left child, absent on leaves.
    pub left: Option<Box<MerkleNode>>,
    /// Right child, absent on leaves and promoted nodes' gaps.
    pub right: Option<Box<MerkleNode>>,
    /// Bucket keys; non-empty exactly on leaves.
    #[serde(default)]
    pub key_range: KeyRange,
}

impl MerkleNode {
    fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Merkle tree over a node's keyspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleTree {
    /// Number of keys per leaf bucket.
    bucket_size: usize,
    /// Root node; `None` until built or when built over zero keys.
    root: Option<MerkleNode>,
}

impl MerkleTree {
    /// Create an unbuilt tree with the given bucket size.
    pub fn new(bucket_size: usize) -> Self {
        Self {
            bucket_size: bucket_size.max(1),
            root: None,
        }
    }

    /// Get the bucket size. Diffing requires matching bucket sizes.
    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    /// Whether the tree has a root to compare against.
    pub fn is_built(&self) -> bool {
        self.root.is_some()
    }

    /// Rebuild from scratch.
    ///
    /// `sorted_keys` must be strictly ascending and every key must be
    /// present in `kvs`.
    pub fn build(&mut self, sorted_keys: &[String], kvs: &HashMap<String, Vec<u8>>) {
        let leaves = self.build_leaves(sorted_keys, kvs);
        self.root = build_level(leaves);
    }

    fn build_leaves(
        &self,
        sorted_keys: &[String],
        kvs: &HashMap<String, Vec<u8>>,
    ) -> Vec<MerkleNode> {
        static EMPTY: &[u8] = &[];
        sorted_keys
            .chunks(self.bucket_size)
            .map(|bucket| {
                let mut data = String::new();
                for key in bucket {
                    let value = kvs.get(key).map(|v| v.as_slice()).unwrap_or(EMPTY);
                    data.push_str(key);
                    data.push(':');
                    data.push_str(&hex::encode(value));
                }
                MerkleNode {
                    hash: hex_sha256(data.as_bytes()),
                    left: None,
                    right: None,
                    key_range: bucket.to_vec(),
                }
            })
            .collect()
    }

    /// Hex root hash, or the empty string when unbuilt.
    pub fn root_hash(&self) -> String {
        self.root
            .as_ref()
            .map(|node| node.hash.clone())
            .unwrap_or_default()
    }

    /// Key ranges of leaves whose hashes differ from `other`'s.
    ///
    /// Both trees must have been built from the same sorted key set with the
    /// same bucket size for the diff to be lossless; under that precondition
    /// the output is a superset of the actually-differing keys and never
    /// misses one. Duplicated ranges are deduplicated.
    pub fn diff(&self, other: &MerkleTree) -> TesseraResult<Vec<KeyRange>> {
        let (Some(ours), Some(theirs)) = (self.root.as_ref(), other.root.as_ref()) else {
            return Err(TesseraError::TreeUnbuilt);
        };

        let mut diffs = Vec::new();
        diff_nodes(ours, theirs, &mut diffs);

        let mut seen = HashSet::new();
        diffs.retain(|range| seen.insert(range.join("\u{0}")));
        Ok(diffs)
    }

    /// All leaf key ranges, left to right. Empty when unbuilt.
    pub fn leaf_ranges(&self) -> Vec<KeyRange> {
        let mut ranges = Vec::new();
        if let Some(root) = self.root.as_ref() {
            collect_leaves(root, &mut ranges);
        }
        ranges
    }
}

fn collect_leaves(node: &MerkleNode, ranges: &mut Vec<KeyRange>) {
    if node.is_leaf() {
        ranges.push(node.key_range.clone());
        return;
    }
    if let Some(left) = node.left.as_deref() {
        collect_leaves(left, ranges);
    }
    if let Some(right) = node.right.as_deref() {
        collect_leaves(right, ranges);
    }
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Pair nodes level by level until one remains. An odd trailing node is
/// promoted unchanged rather than duplicated.
fn build_level(mut nodes: Vec<MerkleNode>) -> Option<MerkleNode> {
    if nodes.is_empty() {
        return None;
    }
    while nodes.len() > 1 {
        let mut parents = Vec::with_capacity(nodes.len() / 2 + 1);
        let mut iter = nodes.into_iter();
        while let Some(left) = iter.next() {
            match iter.next() {
                Some(right) => {
                    let combined = format!("{}{}", left.hash, right.hash);
                    parents.push(MerkleNode {
                        hash: hex_sha256(combined.as_bytes()),
                        left: Some(Box::new(left)),
                        right: Some(Box::new(right)),
                        key_range: Vec::new(),
                    });
                }
                None => parents.push(left),
            }
        }
        nodes = parents;
    }
    nodes.into_iter().next()
}

/// Recursively compare two trees, collecting differing leaf key ranges.
/// Equal hashes prune the subtree; imbalance is tolerated by descending
/// only where both children exist.
fn diff_nodes(a: &MerkleNode, b: &MerkleNode, diffs: &mut Vec<KeyRange>) {
    if a.hash == b.hash {
        return;
    }
    if a.is_leaf() && b.is_leaf() {
        diffs.push(a.key_range.clone());
        return;
    }
    if let (Some(al), Some(bl)) = (a.left.as_deref(), b.left.as_deref()) {
        diff_nodes(al, bl, diffs);
    }
    if let (Some(ar), Some(br)) = (a.right.as_deref(), b.right.as_deref()) {
        diff_nodes(ar, br, diffs);
    }
}
