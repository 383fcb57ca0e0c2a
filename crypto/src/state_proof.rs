//! Root recomputation for blocks proven by a state proof.
//!
//! A state proof carries three merkle paths. Path 1 starts at the previous
//! block's root; its siblings come in groups of four. The first group climbs
//! to this block's root. The remaining siblings, joined with the timestamp
//! leaf of path 0, climb to the root that the threshold signature covers.

use blockfeed_types::{BlockHash, StateProof};

use crate::hash::{hash_internal, hash_internal_single, hash_leaf};
use crate::CryptoError;

const PATH_COUNT: usize = 3;
const MIN_PREVIOUS_ROOT_SIBLINGS: usize = 7;
const SIBLING_GROUP_SIZE: usize = 4;
/// Position within a group after which the implicit single-child node is folded.
const SINGLE_CHILD_INDEX: usize = 2;

/// Compute the signed root for `block` from its own root hash and state proof.
pub fn state_proof_root(
    block: u64,
    current_root: &BlockHash,
    proof: &StateProof,
) -> Result<BlockHash, CryptoError> {
    if proof.paths.len() != PATH_COUNT {
        return Err(CryptoError::InvalidStateProof(format!(
            "Number of merkle paths in block {block}'s StateProof is not {PATH_COUNT}"
        )));
    }

    let previous_root_path = &proof.paths[1];
    let siblings = &previous_root_path.siblings;
    if siblings.len() < MIN_PREVIOUS_ROOT_SIBLINGS {
        return Err(CryptoError::InvalidStateProof(format!(
            "Block {block}'s merkle path from the previous block root has less than {MIN_PREVIOUS_ROOT_SIBLINGS} siblings"
        )));
    }

    let mut hash = previous_root_path.hash.ok_or_else(|| {
        CryptoError::InvalidStateProof(format!("Block {block}'s previous block root path has no hash"))
    })?;

    for (i, sibling) in siblings.iter().enumerate() {
        hash = if sibling.is_left {
            hash_internal(&sibling.hash, &hash)
        } else {
            hash_internal(&hash, &sibling.hash)
        };

        if i % SIBLING_GROUP_SIZE == SINGLE_CHILD_INDEX {
            hash = hash_internal_single(&hash);
        }

        if i == SIBLING_GROUP_SIZE - 1 && hash != *current_root {
            return Err(CryptoError::RootHashMismatch {
                block,
                expected: current_root.to_hex(),
                actual: hash.to_hex(),
            });
        }
    }

    let timestamp_leaf = proof.paths[0].timestamp_leaf.as_deref().ok_or_else(|| {
        CryptoError::InvalidStateProof(format!("Block {block}'s first merkle path has no timestamp leaf"))
    })?;
    Ok(hash_internal(&hash_leaf(timestamp_leaf), &hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockfeed_types::{MerklePath, SiblingNode, SignedBlockProof};

    fn node(i: u8) -> BlockHash {
        hash_leaf(&[i])
    }

    /// Builds a proof whose first group climbs from `previous` to the returned root.
    fn proof_for(previous: BlockHash, extra: usize) -> (StateProof, BlockHash, BlockHash) {
        let mut siblings = Vec::new();
        let mut hash = previous;
        let mut current_root = BlockHash::ZERO;
        for i in 0..(SIBLING_GROUP_SIZE + extra) {
            let sibling = node(i as u8 + 10);
            let is_left = i % 2 == 1;
            hash = if is_left {
                hash_internal(&sibling, &hash)
            } else {
                hash_internal(&hash, &sibling)
            };
            if i % SIBLING_GROUP_SIZE == SINGLE_CHILD_INDEX {
                hash = hash_internal_single(&hash);
            }
            if i == SIBLING_GROUP_SIZE - 1 {
                current_root = hash;
            }
            siblings.push(SiblingNode { is_left, hash: sibling });
        }

        let timestamp = vec![0u8, 1, 2];
        let expected = hash_internal(&hash_leaf(&timestamp), &hash);
        let proof = StateProof {
            paths: vec![
                MerklePath {
                    timestamp_leaf: Some(timestamp),
                    ..Default::default()
                },
                MerklePath {
                    hash: Some(previous),
                    siblings,
                    ..Default::default()
                },
                MerklePath::default(),
            ],
            signed_block_proof: SignedBlockProof {
                block_signature: vec![],
            },
        };
        (proof, current_root, expected)
    }

    #[test]
    fn recomputes_signed_root() {
        let (proof, current_root, expected) = proof_for(node(1), 3);
        assert_eq!(state_proof_root(5, &current_root, &proof).unwrap(), expected);
    }

    #[test]
    fn rejects_wrong_path_count() {
        let (mut proof, current_root, _) = proof_for(node(1), 3);
        proof.paths.pop();
        let err = state_proof_root(5, &current_root, &proof).unwrap_err();
        assert!(err.to_string().contains("is not 3"));
    }

    #[test]
    fn rejects_short_previous_root_path() {
        let (mut proof, current_root, _) = proof_for(node(1), 3);
        proof.paths[1].siblings.truncate(6);
        let err = state_proof_root(5, &current_root, &proof).unwrap_err();
        assert!(err.to_string().contains("less than 7 siblings"));
    }

    #[test]
    fn rejects_root_mismatch() {
        let (proof, _, _) = proof_for(node(1), 3);
        let err = state_proof_root(5, &node(99), &proof).unwrap_err();
        assert!(matches!(err, CryptoError::RootHashMismatch { block: 5, .. }));
        assert!(err.to_string().contains("root hash mismatch"));
    }
}
