//! The last verified block, shared by every source.

use blockfeed_store::RecordFileStore;
use blockfeed_types::VerifiedRecord;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, OnceCell};
use tracing::info;

use crate::ImporterError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CursorPosition {
    /// Nothing verified yet.
    Empty,
    At(VerifiedRecord),
}

impl CursorPosition {
    pub fn record(&self) -> Option<&VerifiedRecord> {
        match self {
            CursorPosition::Empty => None,
            CursorPosition::At(record) => Some(record),
        }
    }
}

/// Single-writer reference to the last verified record.
///
/// Loaded from the record store on first use. Holding the lock across a
/// whole verification makes verification single-flight.
pub struct Cursor {
    store: Arc<dyn RecordFileStore>,
    loaded: OnceCell<()>,
    position: Mutex<CursorPosition>,
}

impl Cursor {
    pub fn new(store: Arc<dyn RecordFileStore>) -> Self {
        Self {
            store,
            loaded: OnceCell::new(),
            position: Mutex::new(CursorPosition::Empty),
        }
    }

    pub async fn lock(&self) -> Result<MutexGuard<'_, CursorPosition>, ImporterError> {
        self.loaded
            .get_or_try_init(|| async {
                let latest = self.store.find_latest()?;
                if let Some(record) = &latest {
                    info!(index = record.index, name = %record.name, "Loaded last verified block");
                }
                *self.position.lock().await = latest.map_or(CursorPosition::Empty, CursorPosition::At);
                Ok::<_, ImporterError>(())
            })
            .await?;
        Ok(self.position.lock().await)
    }

    /// Snapshot of the current position.
    pub async fn position(&self) -> Result<CursorPosition, ImporterError> {
        Ok(self.lock().await?.clone())
    }
}
