//! Nullable object storage: serves artifacts from memory.

use async_trait::async_trait;
use blockfeed_store::{StoreError, StreamFileData, StreamFileProvider};
use blockfeed_types::{block_filename, Block};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct State {
    objects: HashMap<String, StreamFileData>,
    networks: Vec<String>,
    failing: bool,
    requests: Vec<String>,
}

#[derive(Default)]
pub struct NullFileProvider {
    state: Mutex<State>,
}

impl NullFileProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store raw bytes under `key`.
    pub fn put(&self, key: impl Into<String>, bytes: Vec<u8>, last_modified: i64) {
        let key = key.into();
        self.state().objects.insert(
            key.clone(),
            StreamFileData {
                key,
                bytes,
                last_modified,
            },
        );
    }

    /// Compress and store `block` as block `number` under `{folder}/block/`.
    pub fn put_block(&self, folder: &str, number: u64, block: &Block, last_modified: i64) {
        let bytes = block
            .to_bytes()
            .and_then(|raw| {
                zstd::encode_all(raw.as_slice(), 0)
                    .map_err(|e| blockfeed_types::TypesError::Serialization(e.to_string()))
            })
            .unwrap_or_default();
        let key = format!("{folder}/block/{}", block_filename(number, true));
        self.put(key, bytes, last_modified);
    }

    pub fn add_network(&self, name: impl Into<String>) {
        self.state().networks.push(name.into());
    }

    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    /// Every key requested through `get`, in order.
    pub fn requests(&self) -> Vec<String> {
        self.state().requests.clone()
    }
}

#[async_trait]
impl StreamFileProvider for NullFileProvider {
    async fn get(&self, key: &str) -> Result<Option<StreamFileData>, StoreError> {
        let mut state = self.state();
        state.requests.push(key.to_string());
        if state.failing {
            return Err(StoreError::Backend("object storage unavailable".into()));
        }
        Ok(state.objects.get(key).cloned())
    }

    async fn list_network(&self) -> Result<Vec<String>, StoreError> {
        let state = self.state();
        if state.failing {
            return Err(StoreError::Backend("object storage unavailable".into()));
        }
        Ok(state.networks.clone())
    }
}
