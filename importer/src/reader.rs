//! Turns assembled or downloaded blocks into [`BlockFile`]s.

use blockfeed_crypto::BlockRootHashDigest;
use blockfeed_store::StreamFileData;
use blockfeed_types::{
    block_filename, Block, BlockFile, BlockItem, Clock, RecordFileItem, StreamedBlock,
    TransactionBody,
};
use std::sync::Arc;

use crate::ImporterError;

/// Node tag of blocks downloaded from object storage.
pub const CLOUD_NODE: &str = "cloud";

pub struct BlockStreamReader {
    clock: Arc<dyn Clock>,
}

impl BlockStreamReader {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Parse a block received from `node`. Its artifact name is derived from
    /// the block number in its first item.
    pub fn read_streamed(&self, block: StreamedBlock, node: &str) -> Result<BlockFile, ImporterError> {
        let number = match block.items.first() {
            Some(BlockItem::BlockHeader(header)) => header.number,
            Some(BlockItem::RecordFile(record)) => record.block_number,
            Some(other) => {
                return Err(ImporterError::InvalidStreamFile(format!(
                    "Streamed block starts with {} instead of a block header",
                    other.case()
                )))
            }
            None => return Err(ImporterError::InvalidStreamFile("Streamed block has no items".into())),
        };

        let load_end = self.clock.now_millis();
        let load_start = block.load_start;
        let block = Block { items: block.items };
        let size = block.to_bytes()?.len();
        let mut file = read_items(block.items, block_filename(number, false))?;
        file.node = node.to_string();
        file.size = size;
        file.load_start = load_start;
        file.load_end = load_end;
        Ok(file)
    }

    /// Decompress and parse an object downloaded from storage.
    pub fn read_file(&self, data: &StreamFileData, persist_bytes: bool) -> Result<BlockFile, ImporterError> {
        let load_start = self.clock.now_millis();
        let raw = zstd::decode_all(data.bytes.as_slice())?;
        let block = Block::from_bytes(&raw)?;
        let mut file = read_items(block.items, data.filename().to_string())?;
        file.node = CLOUD_NODE.to_string();
        file.size = data.bytes.len();
        file.bytes = persist_bytes.then(|| data.bytes.clone());
        file.load_start = load_start;
        file.load_end = self.clock.now_millis();
        Ok(file)
    }
}

fn read_items(items: Vec<BlockItem>, name: String) -> Result<BlockFile, ImporterError> {
    if let [BlockItem::RecordFile(record)] = items.as_slice() {
        return Ok(read_record_file(record, name));
    }

    let mut digest = BlockRootHashDigest::new();
    let mut file = BlockFile {
        name,
        ..Default::default()
    };
    let mut previous_hash = None;

    for item in &items {
        digest.add_item(item)?;
        match item {
            BlockItem::BlockHeader(header) => {
                if file.header.is_some() {
                    return Err(ImporterError::InvalidStreamFile(format!(
                        "Block file {} has more than one block header",
                        file.name
                    )));
                }
                file.index = header.number;
                file.consensus_start = header.block_timestamp.as_nanos();
                file.consensus_end = file.consensus_start;
                file.hapi_version = header.hapi_proto_version.clone();
                file.software_version = header.software_version.clone();
                file.header = Some(header.clone());
            }
            BlockItem::RoundHeader(round) => {
                file.round_start.get_or_insert(round.round_number);
                file.round_end = Some(round.round_number);
            }
            BlockItem::SignedTransaction(transaction) => {
                file.count += 1;
                if let TransactionBody::LedgerIdPublication(publication) = &transaction.body {
                    file.ledger_id_publication = Some(publication.clone());
                }
            }
            BlockItem::TransactionResult(result) => {
                file.consensus_end = result.consensus_timestamp.as_nanos();
            }
            BlockItem::BlockFooter(footer) => {
                previous_hash = Some(footer.previous_block_root_hash);
            }
            BlockItem::BlockProof(proof) => {
                file.proof = Some(proof.clone());
            }
            BlockItem::RecordFile(_) => {
                return Err(ImporterError::InvalidStreamFile(format!(
                    "Block file {} mixes a record file with block items",
                    file.name
                )));
            }
            BlockItem::EventHeader(_)
            | BlockItem::TransactionOutput(_)
            | BlockItem::StateChanges(_)
            | BlockItem::TraceData(_) => {}
        }
    }

    if file.header.is_none() {
        return Err(ImporterError::InvalidStreamFile(format!(
            "Block file {} has no block header",
            file.name
        )));
    }
    if file.proof.is_none() {
        return Err(ImporterError::InvalidStreamFile(format!(
            "Block file {} has no block proof",
            file.name
        )));
    }
    file.previous_hash = previous_hash.ok_or_else(|| {
        ImporterError::InvalidStreamFile(format!("Block file {} has no block footer", file.name))
    })?;
    file.raw_hash = digest.digest()?;
    file.hash = file.raw_hash;
    Ok(file)
}

fn read_record_file(record: &RecordFileItem, name: String) -> BlockFile {
    BlockFile {
        index: record.block_number,
        name,
        raw_hash: record.hash,
        hash: record.hash,
        previous_hash: record.previous_hash,
        consensus_start: record.consensus_start,
        consensus_end: record.consensus_end,
        hapi_version: record.hapi_version.clone(),
        software_version: record.hapi_version.clone(),
        count: record.transaction_count,
        record_file_item: Some(record.clone()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockfeed_nullables::{BlockGenerator, NullClock};
    use blockfeed_types::BlockHash;

    fn reader(now: i64) -> BlockStreamReader {
        BlockStreamReader::new(Arc::new(NullClock::new(now)))
    }

    #[test]
    fn reads_a_streamed_block() {
        let mut generator = BlockGenerator::new(2).with_ledger_publication();
        let block = generator.next_block();
        let streamed = StreamedBlock {
            items: block.items.clone(),
            load_start: 5,
        };

        let file = reader(9).read_streamed(streamed, "a:1").unwrap();
        assert_eq!(file.index, 0);
        assert_eq!(file.name, "0000000000000000000.blk");
        assert_eq!(file.node, "a:1");
        assert_eq!(file.hash, generator.previous_root());
        assert_eq!(file.previous_hash, BlockHash::ZERO);
        assert_eq!(file.count, 1);
        assert_eq!(file.round_start, Some(1));
        assert!(file.consensus_end > file.consensus_start);
        assert!(file.ledger_id_publication.is_some());
        assert_eq!((file.load_start, file.load_end), (5, 9));
        assert!(file.bytes.is_none());
    }

    #[test]
    fn reads_a_downloaded_block() {
        let mut generator = BlockGenerator::new(2);
        let block = generator.next_block();
        let bytes = zstd::encode_all(block.to_bytes().unwrap().as_slice(), 0).unwrap();
        let data = StreamFileData {
            key: "testnet/block/0000000000000000000.blk.zstd".into(),
            bytes: bytes.clone(),
            last_modified: 0,
        };

        let file = reader(0).read_file(&data, true).unwrap();
        assert_eq!(file.name, "0000000000000000000.blk.zstd");
        assert_eq!(file.node, CLOUD_NODE);
        assert_eq!(file.bytes, Some(bytes));
        assert_eq!(file.hash, generator.previous_root());

        assert!(reader(0).read_file(&data, false).unwrap().bytes.is_none());
    }

    #[test]
    fn record_file_block() {
        let mut generator = BlockGenerator::new(2);
        generator.next_block();
        let block = generator.record_file_block();
        let file = reader(0)
            .read_streamed(
                StreamedBlock {
                    items: block.items,
                    load_start: 0,
                },
                "a:1",
            )
            .unwrap();
        assert!(file.is_record_file());
        assert_eq!(file.index, 1);
        assert!(file.proof.is_none());
    }

    #[test]
    fn missing_proof_is_invalid() {
        let mut generator = BlockGenerator::new(2);
        let mut block = generator.next_block();
        block.items.pop();
        let err = reader(0)
            .read_streamed(
                StreamedBlock {
                    items: block.items,
                    load_start: 0,
                },
                "a:1",
            )
            .unwrap_err();
        assert!(err.to_string().contains("has no block proof"));
    }

    #[test]
    fn corrupt_download_is_an_error() {
        let data = StreamFileData {
            key: "x/block/0000000000000000000.blk.zstd".into(),
            bytes: vec![1, 2, 3],
            last_modified: 0,
        };
        assert!(reader(0).read_file(&data, false).is_err());
    }
}
