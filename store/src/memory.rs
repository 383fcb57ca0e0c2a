//! In-process repositories.

use std::sync::Mutex;

use blockfeed_types::{Ledger, VerifiedRecord};

use crate::{LedgerStore, RecordFileStore, StoreError};

/// Keeps only the latest record.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    latest: Mutex<Option<VerifiedRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latest(record: VerifiedRecord) -> Self {
        Self {
            latest: Mutex::new(Some(record)),
        }
    }

    pub fn save(&self, record: VerifiedRecord) -> Result<(), StoreError> {
        let mut latest = self
            .latest
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        *latest = Some(record);
        Ok(())
    }
}

impl RecordFileStore for MemoryRecordStore {
    fn find_latest(&self) -> Result<Option<VerifiedRecord>, StoreError> {
        self.latest
            .lock()
            .map(|latest| latest.clone())
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    ledgers: Mutex<Vec<Ledger>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&self, ledger: Ledger) -> Result<(), StoreError> {
        self.ledgers
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .push(ledger);
        Ok(())
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn find_latest(&self) -> Result<Option<Ledger>, StoreError> {
        let ledgers = self
            .ledgers
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(ledgers
            .iter()
            .max_by_key(|l| l.consensus_timestamp)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockfeed_types::{BlockHash, SemanticVersion};

    fn record(index: u64) -> VerifiedRecord {
        VerifiedRecord {
            index,
            name: format!("{index}"),
            hash: BlockHash::ZERO,
            previous_hash: BlockHash::ZERO,
            consensus_start: 0,
            consensus_end: 0,
            hapi_version: SemanticVersion::default(),
            count: 0,
            size: 0,
            node: String::new(),
            bytes: None,
        }
    }

    #[test]
    fn record_store_keeps_latest() {
        let store = MemoryRecordStore::new();
        assert!(store.find_latest().unwrap().is_none());
        store.save(record(1)).unwrap();
        store.save(record(2)).unwrap();
        assert_eq!(store.find_latest().unwrap().unwrap().index, 2);
    }

    #[test]
    fn ledger_store_returns_newest_by_timestamp() {
        let store = MemoryLedgerStore::new();
        store
            .save(Ledger {
                ledger_id: vec![2],
                consensus_timestamp: 20,
                ..Default::default()
            })
            .unwrap();
        store
            .save(Ledger {
                ledger_id: vec![1],
                consensus_timestamp: 10,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(store.find_latest().unwrap().unwrap().ledger_id, vec![2]);
    }
}
