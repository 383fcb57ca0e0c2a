//! Error type for the shared domain types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TypesError {
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid block filename: {0}")]
    InvalidFilename(String),

    #[error("invalid semantic version: {0}")]
    InvalidVersion(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
