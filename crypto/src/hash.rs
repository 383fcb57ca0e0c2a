//! SHA-384 hashing and merkle node construction.

use blockfeed_types::BlockHash;
use sha2::{Digest, Sha384};

const LEAF_PREFIX: u8 = 0x00;
const SINGLE_CHILD_PREFIX: u8 = 0x01;
const INTERNAL_PREFIX: u8 = 0x02;

fn finish(hasher: Sha384) -> BlockHash {
    let mut output = [0u8; 48];
    output.copy_from_slice(&hasher.finalize());
    BlockHash::new(output)
}

/// Plain SHA-384 of arbitrary data.
pub fn sha384(data: &[u8]) -> BlockHash {
    let mut hasher = Sha384::new();
    hasher.update(data);
    finish(hasher)
}

/// Hash of a merkle leaf: `SHA-384(0x00 || data)`.
pub fn hash_leaf(data: &[u8]) -> BlockHash {
    let mut hasher = Sha384::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(data);
    finish(hasher)
}

/// Hash of an internal node with two children: `SHA-384(0x02 || left || right)`.
pub fn hash_internal(left: &BlockHash, right: &BlockHash) -> BlockHash {
    let mut hasher = Sha384::new();
    hasher.update([INTERNAL_PREFIX]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    finish(hasher)
}

/// Hash of an internal node with a single child: `SHA-384(0x01 || child)`.
pub fn hash_internal_single(child: &BlockHash) -> BlockHash {
    let mut hasher = Sha384::new();
    hasher.update([SINGLE_CHILD_PREFIX]);
    hasher.update(child.as_bytes());
    finish(hasher)
}

/// Root of a tree with no leaves. Not a leaf hash: just `SHA-384(0x00)`.
pub fn empty_tree_hash() -> BlockHash {
    sha384(&[0x00])
}
