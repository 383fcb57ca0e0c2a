//! Repository of published ledger material.

use blockfeed_types::Ledger;

use crate::StoreError;

pub trait LedgerStore: Send + Sync {
    /// The most recent ledger by consensus timestamp.
    fn find_latest(&self) -> Result<Option<Ledger>, StoreError>;
}
