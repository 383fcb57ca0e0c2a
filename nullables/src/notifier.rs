//! Nullable notifier: records verified records instead of forwarding them.

use async_trait::async_trait;
use blockfeed_store::StreamFileNotifier;
use blockfeed_types::VerifiedRecord;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct NullNotifier {
    records: Mutex<Vec<VerifiedRecord>>,
}

impl NullNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records received so far (for assertions).
    pub fn records(&self) -> Vec<VerifiedRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Block numbers received so far, in arrival order.
    pub fn indices(&self) -> Vec<u64> {
        self.records().iter().map(|r| r.index).collect()
    }

    /// Source node of each received record, in arrival order.
    pub fn nodes(&self) -> Vec<String> {
        self.records().iter().map(|r| r.node.clone()).collect()
    }
}

#[async_trait]
impl StreamFileNotifier for NullNotifier {
    async fn verified(&self, record: VerifiedRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}
