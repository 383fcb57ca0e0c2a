//! Object storage holding compressed block artifacts.
//!
//! Layout: `{network}/block/{0000000000000000042}.blk.zstd`. Resettable
//! networks nest artifacts under dated folders named `{network}-{RFC 3339}`.

use async_trait::async_trait;

use crate::StoreError;

/// A downloaded artifact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamFileData {
    /// Full object key.
    pub key: String,
    pub bytes: Vec<u8>,
    /// When the object was written to storage, millis since the epoch.
    pub last_modified: i64,
}

impl StreamFileData {
    /// Last path segment of the key.
    pub fn filename(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

#[async_trait]
pub trait StreamFileProvider: Send + Sync {
    /// Fetch an object. `Ok(None)` when it does not exist (yet).
    async fn get(&self, key: &str) -> Result<Option<StreamFileData>, StoreError>;

    /// Names of the top-level network folders.
    async fn list_network(&self) -> Result<Vec<String>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_is_last_segment() {
        let data = StreamFileData {
            key: "testnet/block/0000000000000000001.blk.zstd".into(),
            bytes: vec![],
            last_modified: 0,
        };
        assert_eq!(data.filename(), "0000000000000000001.blk.zstd");

        let bare = StreamFileData {
            key: "x.blk".into(),
            ..data
        };
        assert_eq!(bare.filename(), "x.blk");
    }
}
