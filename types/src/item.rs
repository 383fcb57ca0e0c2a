//! Block item wire model.
//!
//! A block is an ordered list of items: a [`BlockHeader`] first, then round
//! and event headers, transactions with their results and outputs, state
//! changes and trace data, a [`BlockFooter`], and finally a [`BlockProof`].
//! Blocks from before the block-stream era travel as a single
//! [`RecordFileItem`] instead.

use serde::{Deserialize, Serialize};

use crate::{BlockHash, SemanticVersion, TypesError};

/// Consensus timestamp split into seconds and nanoseconds, as it is hashed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockTimestamp {
    pub seconds: i64,
    pub nanos: i32,
}

impl BlockTimestamp {
    pub fn new(seconds: i64, nanos: i32) -> Self {
        Self { seconds, nanos }
    }

    pub fn from_nanos(nanos: i64) -> Self {
        Self {
            seconds: nanos.div_euclid(1_000_000_000),
            nanos: nanos.rem_euclid(1_000_000_000) as i32,
        }
    }

    /// Nanoseconds since the Unix epoch.
    pub fn as_nanos(&self) -> i64 {
        self.seconds
            .saturating_mul(1_000_000_000)
            .saturating_add(i64::from(self.nanos))
    }

    /// Canonical leaf bytes: big-endian seconds followed by big-endian nanos.
    pub fn to_bytes(&self) -> [u8; 12] {
        let mut out = [0u8; 12];
        out[..8].copy_from_slice(&self.seconds.to_be_bytes());
        out[8..].copy_from_slice(&self.nanos.to_be_bytes());
        out
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    pub hapi_proto_version: SemanticVersion,
    pub software_version: SemanticVersion,
    pub block_timestamp: BlockTimestamp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundHeader {
    pub round_number: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHeader {
    pub creator_node_id: u64,
    pub birth_round: u64,
}

/// Address book entry of a node contributing to the ledger's threshold key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeContribution {
    pub node_id: u64,
    pub weight: u64,
    pub history_proof_key: Vec<u8>,
}

/// Publishes the ledger id (the threshold public key) and its address book.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerIdPublication {
    pub ledger_id: Vec<u8>,
    pub history_proof_verification_key: Vec<u8>,
    pub node_contributions: Vec<NodeContribution>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionBody {
    /// Any transaction whose contents the importer does not interpret.
    Opaque(Vec<u8>),
    LedgerIdPublication(LedgerIdPublication),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub body: TransactionBody,
    pub signatures: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub consensus_timestamp: BlockTimestamp,
    pub status: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChanges {
    pub consensus_timestamp: BlockTimestamp,
    pub changes: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceData {
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockFooter {
    pub previous_block_root_hash: BlockHash,
    pub root_hash_of_all_block_hashes_tree: BlockHash,
    pub start_of_block_state_root_hash: BlockHash,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBlockProof {
    pub block_signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiblingNode {
    pub is_left: bool,
    pub hash: BlockHash,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    pub hash: Option<BlockHash>,
    pub timestamp_leaf: Option<Vec<u8>>,
    pub siblings: Vec<SiblingNode>,
}

/// Proves a block through a later block's signed root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateProof {
    pub paths: Vec<MerklePath>,
    pub signed_block_proof: SignedBlockProof,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofKind {
    /// Signature directly over this block's root hash.
    Signed(SignedBlockProof),
    /// Merkle paths up to a signed root.
    StateProof(StateProof),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockProof {
    pub block: u64,
    pub proof: ProofKind,
}

impl BlockProof {
    pub fn signature(&self) -> &[u8] {
        match &self.proof {
            ProofKind::Signed(signed) => &signed.block_signature,
            ProofKind::StateProof(state) => &state.signed_block_proof.block_signature,
        }
    }

    pub fn state_proof(&self) -> Option<&StateProof> {
        match &self.proof {
            ProofKind::StateProof(state) => Some(state),
            ProofKind::Signed(_) => None,
        }
    }
}

/// A legacy (pre block-stream) record file carried as a single block item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFileItem {
    pub block_number: u64,
    pub name: String,
    pub hash: BlockHash,
    pub previous_hash: BlockHash,
    pub consensus_start: i64,
    pub consensus_end: i64,
    pub hapi_version: SemanticVersion,
    pub transaction_count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockItem {
    BlockHeader(BlockHeader),
    RoundHeader(RoundHeader),
    EventHeader(EventHeader),
    SignedTransaction(SignedTransaction),
    TransactionResult(TransactionResult),
    TransactionOutput(TransactionOutput),
    StateChanges(StateChanges),
    TraceData(TraceData),
    BlockFooter(BlockFooter),
    BlockProof(BlockProof),
    RecordFile(RecordFileItem),
}

impl BlockItem {
    /// Short name of the item case, used in error messages.
    pub fn case(&self) -> &'static str {
        match self {
            BlockItem::BlockHeader(_) => "BLOCK_HEADER",
            BlockItem::RoundHeader(_) => "ROUND_HEADER",
            BlockItem::EventHeader(_) => "EVENT_HEADER",
            BlockItem::SignedTransaction(_) => "SIGNED_TRANSACTION",
            BlockItem::TransactionResult(_) => "TRANSACTION_RESULT",
            BlockItem::TransactionOutput(_) => "TRANSACTION_OUTPUT",
            BlockItem::StateChanges(_) => "STATE_CHANGES",
            BlockItem::TraceData(_) => "TRACE_DATA",
            BlockItem::BlockFooter(_) => "BLOCK_FOOTER",
            BlockItem::BlockProof(_) => "BLOCK_PROOF",
            BlockItem::RecordFile(_) => "RECORD_FILE",
        }
    }

    pub fn is_header(&self) -> bool {
        matches!(self, BlockItem::BlockHeader(_))
    }

    pub fn is_record_file(&self) -> bool {
        matches!(self, BlockItem::RecordFile(_))
    }

    pub fn is_proof(&self) -> bool {
        matches!(self, BlockItem::BlockProof(_))
    }

    /// Canonical encoding of the item, the input of its merkle leaf.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TypesError> {
        bincode::serialize(self).map_err(|e| TypesError::Serialization(e.to_string()))
    }
}

/// One push from a block node: a contiguous slice of a block's items.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockItemSet {
    pub items: Vec<BlockItem>,
}
