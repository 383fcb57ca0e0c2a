//! Streaming merkle tree hasher.
//!
//! Keeps only the roots of the complete power-of-two sub-trees seen so far, so
//! memory stays logarithmic in the number of leaves.

use blockfeed_types::BlockHash;

use crate::hash::{empty_tree_hash, hash_internal, hash_leaf};

#[derive(Clone, Debug, Default)]
pub struct IncrementalStreamingHasher {
    pending: Vec<BlockHash>,
    leaf_count: u64,
}

impl IncrementalStreamingHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn leaf_count(&self) -> u64 {
        self.leaf_count
    }

    /// Hash `data` as a leaf and append it.
    pub fn add_leaf(&mut self, data: &[u8]) {
        self.add_node(hash_leaf(data));
    }

    /// Append an already-hashed node and fold up every completed pair.
    pub fn add_node(&mut self, hash: BlockHash) {
        self.pending.push(hash);
        let mut n = self.leaf_count;
        while n & 1 == 1 {
            // both pops succeed: an odd count always leaves two pending roots
            let (Some(right), Some(left)) = (self.pending.pop(), self.pending.pop()) else {
                break;
            };
            self.pending.push(hash_internal(&left, &right));
            n >>= 1;
        }
        self.leaf_count += 1;
    }

    /// Root of everything added so far. Does not consume the state.
    pub fn root_hash(&self) -> BlockHash {
        match self.pending.split_last() {
            None => empty_tree_hash(),
            Some((last, rest)) => rest
                .iter()
                .rev()
                .fold(*last, |acc, left| hash_internal(left, &acc)),
        }
    }
}
