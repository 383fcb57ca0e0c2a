//! Abstract interfaces of the importer's external collaborators.
//!
//! Persistence of verified blocks, the ledger repository, object storage and
//! downstream consumers all live outside the importer. The importer depends
//! only on these traits; [`memory`] provides simple in-process
//! implementations of the repositories.

pub mod error;
pub mod ledger;
pub mod memory;
pub mod notifier;
pub mod provider;
pub mod record;

pub use error::StoreError;
pub use ledger::LedgerStore;
pub use memory::{MemoryLedgerStore, MemoryRecordStore};
pub use notifier::StreamFileNotifier;
pub use provider::{StreamFileData, StreamFileProvider};
pub use record::RecordFileStore;
