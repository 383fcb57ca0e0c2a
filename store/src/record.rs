//! Repository of verified records.

use blockfeed_types::VerifiedRecord;

use crate::StoreError;

/// Read side of the downstream record repository.
///
/// The importer only needs the latest persisted record, once, to seed the
/// verification cursor at startup.
pub trait RecordFileStore: Send + Sync {
    fn find_latest(&self) -> Result<Option<VerifiedRecord>, StoreError>;
}
