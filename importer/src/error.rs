use blockfeed_crypto::CryptoError;
use blockfeed_protocol::{ProtocolError, StreamStatus};
use blockfeed_store::StoreError;
use blockfeed_types::TypesError;
use thiserror::Error;

use crate::NextBlock;

/// A subscription violated the stream structure or failed in transport.
#[derive(Debug, Error)]
pub enum BlockStreamError {
    #[error("Incorrect first block item case {0}")]
    IncorrectFirstItem(&'static str),

    #[error("The first block item is record file and there are more than one block items")]
    RecordFileWithOtherItems,

    #[error("Received block items of a new block while the previous block is still pending")]
    NewBlockWhilePending,

    #[error("Too many block items in a pending block: received {received}, limit {limit}")]
    TooManyItems { received: usize, limit: usize },

    #[error("Received status {0} from block node")]
    Status(StreamStatus),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("block node transport error: {0}")]
    Transport(#[from] ProtocolError),
}

#[derive(Debug, Error)]
pub enum ImporterError {
    #[error(transparent)]
    Stream(#[from] BlockStreamError),

    #[error("{0}")]
    InvalidStreamFile(String),

    #[error("{kind} hash mismatch for block file {name}. Expected = {expected}, Actual = {actual}")]
    HashMismatch {
        name: String,
        expected: String,
        actual: String,
        kind: &'static str,
    },

    #[error("{0}")]
    SignatureVerification(String),

    #[error("Failed to download block file {filename}: {source}")]
    Download {
        filename: String,
        #[source]
        source: Box<ImporterError>,
    },

    #[error("No node can provide block {0}")]
    NoNodeAvailable(NextBlock),

    #[error("Failed to discover network folder for '{0}'")]
    NetworkDiscovery(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("decode error: {0}")]
    Types(#[from] TypesError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ImporterError {
    /// Signature failures are never retried and stop ingestion.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ImporterError::SignatureVerification(_))
    }
}
