//! Blocks as they move through the importer.
//!
//! [`StreamedBlock`] is what a block node delivers, [`BlockFile`] is the parsed
//! and verifiable unit, and [`VerifiedRecord`] is what goes downstream.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    BlockHash, BlockHeader, BlockItem, BlockProof, LedgerIdPublication, RecordFileItem,
    SemanticVersion, TypesError,
};

/// Width of the zero-padded block number in artifact names.
pub const BLOCK_NUMBER_WIDTH: usize = 19;

const STREAMED_EXTENSION: &str = ".blk";
const COMPRESSED_EXTENSION: &str = ".blk.zstd";

/// Artifact name of block `number`: `0000000000000000042.blk` when streamed
/// from a node, with a `.zstd` suffix when downloaded from object storage.
pub fn block_filename(number: u64, compressed: bool) -> String {
    let extension = if compressed {
        COMPRESSED_EXTENSION
    } else {
        STREAMED_EXTENSION
    };
    format!("{number:0width$}{extension}", width = BLOCK_NUMBER_WIDTH)
}

/// Parse the block number embedded before the first `.` of a filename.
pub fn block_number_from_filename(filename: &str) -> Result<u64, TypesError> {
    let stem = filename.split('.').next().unwrap_or(filename);
    stem.parse()
        .map_err(|_| TypesError::InvalidFilename(filename.to_string()))
}

/// Whether `filename` names a block received from a block node.
pub fn is_streamed_filename(filename: &str) -> bool {
    match filename.strip_suffix(STREAMED_EXTENSION) {
        Some(stem) => stem.len() == BLOCK_NUMBER_WIDTH && stem.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Where a block came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Auto,
    BlockNode,
    File,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Auto => "auto",
            SourceType::BlockNode => "block_node",
            SourceType::File => "file",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(SourceType::Auto),
            "block_node" | "blocknode" | "node" => Ok(SourceType::BlockNode),
            "file" => Ok(SourceType::File),
            other => Err(format!("unknown source type: {other}")),
        }
    }
}

/// A block in its serialized container form, as stored in object storage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub items: Vec<BlockItem>,
}

impl Block {
    pub fn to_bytes(&self) -> Result<Vec<u8>, TypesError> {
        bincode::serialize(self).map_err(|e| TypesError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypesError> {
        bincode::deserialize(bytes).map_err(|e| TypesError::Serialization(e.to_string()))
    }
}

/// One fully assembled block delivered by a node's stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamedBlock {
    pub items: Vec<BlockItem>,
    /// Wall-clock millis at which the block's first item arrived.
    pub load_start: i64,
}

/// The parsed, verifiable unit.
///
/// Built by the reader from a [`StreamedBlock`] or from downloaded bytes,
/// consumed once by the verifier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockFile {
    pub index: u64,
    pub name: String,
    /// Root hash as computed from the block's own items.
    pub raw_hash: BlockHash,
    /// Chain hash the next block must link to.
    pub hash: BlockHash,
    pub previous_hash: BlockHash,
    /// Nanoseconds since the epoch.
    pub consensus_start: i64,
    pub consensus_end: i64,
    pub hapi_version: SemanticVersion,
    pub software_version: SemanticVersion,
    pub round_start: Option<u64>,
    pub round_end: Option<u64>,
    pub count: u64,
    pub size: usize,
    pub header: Option<BlockHeader>,
    pub proof: Option<BlockProof>,
    pub bytes: Option<Vec<u8>>,
    /// Endpoint of the node the block was streamed from, or `cloud`.
    pub node: String,
    pub load_start: i64,
    pub load_end: i64,
    pub record_file_item: Option<RecordFileItem>,
    pub ledger_id_publication: Option<LedgerIdPublication>,
}

impl BlockFile {
    /// Source the artifact name points at: block nodes name blocks
    /// `NNN.blk`, object storage `NNN.blk.zstd`.
    pub fn source_type(&self) -> SourceType {
        if is_streamed_filename(&self.name) {
            SourceType::BlockNode
        } else {
            SourceType::File
        }
    }

    pub fn is_record_file(&self) -> bool {
        self.record_file_item.is_some()
    }
}

/// Persist-ready result of a verified block, handed downstream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedRecord {
    pub index: u64,
    pub name: String,
    pub hash: BlockHash,
    pub previous_hash: BlockHash,
    pub consensus_start: i64,
    pub consensus_end: i64,
    pub hapi_version: SemanticVersion,
    pub count: u64,
    pub size: usize,
    pub node: String,
    #[serde(skip)]
    pub bytes: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_are_zero_padded() {
        assert_eq!(block_filename(42, false), "0000000000000000042.blk");
        assert_eq!(block_filename(42, true), "0000000000000000042.blk.zstd");
        assert_eq!(block_filename(u64::MAX, false).len(), 19 + 4);
    }

    #[test]
    fn block_number_parsed_before_first_dot() {
        assert_eq!(block_number_from_filename("0000000000000000042.blk.zstd").unwrap(), 42);
        assert_eq!(block_number_from_filename("7").unwrap(), 7);
        assert!(block_number_from_filename("abc.blk").is_err());
        assert!(block_number_from_filename("").is_err());
    }

    #[test]
    fn streamed_filename_detection() {
        assert!(is_streamed_filename("0000000000000000001.blk"));
        assert!(!is_streamed_filename("0000000000000000001.blk.zstd"));
        assert!(!is_streamed_filename("1.blk"));
        assert!(!is_streamed_filename("000000000000000000a.blk"));
    }

    #[test]
    fn source_type_from_name() {
        let mut file = BlockFile {
            name: block_filename(5, false),
            ..Default::default()
        };
        assert_eq!(file.source_type(), SourceType::BlockNode);
        file.name = block_filename(5, true);
        assert_eq!(file.source_type(), SourceType::File);
    }

    #[test]
    fn source_type_parses() {
        assert_eq!("AUTO".parse::<SourceType>().unwrap(), SourceType::Auto);
        assert_eq!("block_node".parse::<SourceType>().unwrap(), SourceType::BlockNode);
        assert!("ftp".parse::<SourceType>().is_err());
    }
}
