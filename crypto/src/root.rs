//! Block root hash digest.
//!
//! The block merkle tree:
//!
//! ```text
//!                  root
//!                 /    \
//!                t    [single]
//!                        |
//!                     [fixed]
//!               _______/ \_______
//!              /                 \
//!          [ . ]                 [ . ]
//!         /     \               /     \
//!      [ . ]   [ . ]         [ . ]   [ . ]
//!      /  \    /  \          /  \    /  \
//!     L1  L2  L3  L4        L5  L6  L7  L8
//! ```
//!
//! `t` is the block timestamp leaf. L1 is the previous block root, L2 the root
//! of the tree of all previous block hashes, L3 the start-of-block state root,
//! L4 the consensus headers, L5 the inputs, L6 the outputs, L7 the state
//! changes and L8 the trace data. The right child of the depth-1 node is
//! reserved and absent.

use blockfeed_types::{BlockHash, BlockItem, BlockTimestamp};

use crate::hash::{hash_internal, hash_internal_single, hash_leaf};
use crate::streaming::IncrementalStreamingHasher;
use crate::CryptoError;

#[derive(Debug, Default)]
pub struct BlockRootHashDigest {
    consensus_headers: IncrementalStreamingHasher,
    inputs: IncrementalStreamingHasher,
    outputs: IncrementalStreamingHasher,
    state_changes: IncrementalStreamingHasher,
    trace_data: IncrementalStreamingHasher,
    block_timestamp: Option<BlockTimestamp>,
    previous_hash: Option<BlockHash>,
    previous_blocks_tree_hash: Option<BlockHash>,
    start_of_block_state_hash: Option<BlockHash>,
}

impl BlockRootHashDigest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one item into its sub-tree. Proofs and record files are not hashed.
    pub fn add_item(&mut self, item: &BlockItem) -> Result<(), CryptoError> {
        let hasher = match item {
            BlockItem::BlockHeader(header) => {
                self.block_timestamp = Some(header.block_timestamp);
                &mut self.outputs
            }
            BlockItem::BlockFooter(footer) => {
                self.previous_hash = Some(footer.previous_block_root_hash);
                self.previous_blocks_tree_hash = Some(footer.root_hash_of_all_block_hashes_tree);
                self.start_of_block_state_hash = Some(footer.start_of_block_state_root_hash);
                return Ok(());
            }
            BlockItem::EventHeader(_) | BlockItem::RoundHeader(_) => &mut self.consensus_headers,
            BlockItem::SignedTransaction(_) => &mut self.inputs,
            BlockItem::TransactionResult(_) | BlockItem::TransactionOutput(_) => &mut self.outputs,
            BlockItem::StateChanges(_) => &mut self.state_changes,
            BlockItem::TraceData(_) => &mut self.trace_data,
            BlockItem::BlockProof(_) | BlockItem::RecordFile(_) => return Ok(()),
        };
        hasher.add_leaf(&item.to_bytes()?);
        Ok(())
    }

    /// Split the tree into its timestamp leaf input and the eight fixed leaves.
    /// Fails if the header or footer was never seen.
    pub fn into_parts(self) -> Result<RootParts, CryptoError> {
        let timestamp = self
            .block_timestamp
            .ok_or(CryptoError::IncompleteDigest("block timestamp not set"))?;
        let previous = self
            .previous_hash
            .ok_or(CryptoError::IncompleteDigest("previous block hash not set"))?;
        let tree = self
            .previous_blocks_tree_hash
            .ok_or(CryptoError::IncompleteDigest("previous blocks tree hash not set"))?;
        let start_state = self
            .start_of_block_state_hash
            .ok_or(CryptoError::IncompleteDigest("start of block state hash not set"))?;

        Ok(RootParts {
            timestamp_leaf: timestamp.to_bytes().to_vec(),
            leaves: [
                previous,
                tree,
                start_state,
                self.consensus_headers.root_hash(),
                self.inputs.root_hash(),
                self.outputs.root_hash(),
                self.state_changes.root_hash(),
                self.trace_data.root_hash(),
            ],
        })
    }

    pub fn digest(self) -> Result<BlockHash, CryptoError> {
        Ok(self.into_parts()?.root())
    }
}

/// The inputs of a block root: timestamp leaf bytes and the fixed leaves
/// L1..L8 in tree order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootParts {
    pub timestamp_leaf: Vec<u8>,
    pub leaves: [BlockHash; 8],
}

impl RootParts {
    /// The depth-2 node over all eight fixed leaves.
    pub fn fixed_root(&self) -> BlockHash {
        combine(self.leaves)
    }

    pub fn root(&self) -> BlockHash {
        let depth1_right = hash_internal_single(&self.fixed_root());
        let depth1_left = hash_leaf(&self.timestamp_leaf);
        hash_internal(&depth1_left, &depth1_right)
    }
}

/// Combine exactly eight nodes into a perfect binary tree.
fn combine(mut nodes: [BlockHash; 8]) -> BlockHash {
    let mut size = nodes.len();
    while size > 1 {
        for i in 0..size / 2 {
            nodes[i] = hash_internal(&nodes[2 * i], &nodes[2 * i + 1]);
        }
        size /= 2;
    }
    nodes[0]
}
