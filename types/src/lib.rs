//! Fundamental types for blockfeed.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! the block item wire model, streamed and parsed blocks, verified records,
//! 48-byte SHA-384 hashes, semantic versions, ledger material and the clock.

pub mod block;
pub mod error;
pub mod hash;
pub mod item;
pub mod ledger;
pub mod time;
pub mod version;

pub use block::{
    block_filename, block_number_from_filename, is_streamed_filename, Block, BlockFile,
    SourceType, StreamedBlock, VerifiedRecord,
};
pub use error::TypesError;
pub use hash::BlockHash;
pub use item::{
    BlockFooter, BlockHeader, BlockItem, BlockItemSet, BlockProof, BlockTimestamp, EventHeader,
    LedgerIdPublication, MerklePath, NodeContribution, ProofKind, RecordFileItem, RoundHeader,
    SiblingNode, SignedBlockProof, SignedTransaction, StateChanges, StateProof, TraceData,
    TransactionBody, TransactionOutput, TransactionResult,
};
pub use ledger::Ledger;
pub use time::{Clock, SystemClock};
pub use version::SemanticVersion;
