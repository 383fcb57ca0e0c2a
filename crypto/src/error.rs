use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("block root hash digest incomplete: {0}")]
    IncompleteDigest(&'static str),

    #[error("block item encoding failed: {0}")]
    Encoding(#[from] blockfeed_types::TypesError),

    #[error("invalid state proof: {0}")]
    InvalidStateProof(String),

    #[error("Block {block} root hash mismatch: expected={expected}, actual={actual}")]
    RootHashMismatch {
        block: u64,
        expected: String,
        actual: String,
    },

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),
}
