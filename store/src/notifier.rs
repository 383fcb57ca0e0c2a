//! Downstream hand-off of verified records.

use async_trait::async_trait;
use blockfeed_types::VerifiedRecord;

/// Receives every verified record exactly once, in block-number order.
///
/// Fire-and-forget: what the consumer does with the record is its own concern.
#[async_trait]
pub trait StreamFileNotifier: Send + Sync {
    async fn verified(&self, record: VerifiedRecord);
}
