//! Cryptographic primitives for blockfeed.
//!
//! - **SHA-384** merkle hashing with domain-separating prefixes
//!   (`0x00` leaf, `0x01` single-child node, `0x02` two-children node)
//! - The block root hash digest over a block's item sub-trees
//! - State-proof root recomputation from merkle paths
//! - **BLS12-381** threshold signature verification against a ledger id

pub mod error;
pub mod hash;
pub mod root;
pub mod state_proof;
pub mod streaming;
pub mod tss;

pub use error::CryptoError;
pub use hash::{empty_tree_hash, hash_internal, hash_internal_single, hash_leaf, sha384};
pub use root::{BlockRootHashDigest, RootParts};
pub use state_proof::state_proof_root;
pub use streaming::IncrementalStreamingHasher;
pub use tss::{verify_tss, ThresholdSigner, BLS_DST};
