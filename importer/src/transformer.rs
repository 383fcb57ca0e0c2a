//! Conversion of a verified [`BlockFile`] into the record handed downstream.

use blockfeed_types::{BlockFile, VerifiedRecord};

use crate::ImporterError;

pub trait BlockFileTransformer: Send + Sync {
    fn transform(&self, block: BlockFile) -> Result<VerifiedRecord, ImporterError>;
}

/// Keeps the block's identity, chain hashes and consensus range.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultTransformer;

impl BlockFileTransformer for DefaultTransformer {
    fn transform(&self, block: BlockFile) -> Result<VerifiedRecord, ImporterError> {
        Ok(VerifiedRecord {
            index: block.index,
            name: block.name,
            hash: block.hash,
            previous_hash: block.previous_hash,
            consensus_start: block.consensus_start,
            consensus_end: block.consensus_end,
            hapi_version: block.hapi_version,
            count: block.count,
            size: block.size,
            node: block.node,
            bytes: block.bytes,
        })
    }
}
