//! Downstream consumers of verified records.

use async_trait::async_trait;
use blockfeed_store::StreamFileNotifier;
use blockfeed_types::VerifiedRecord;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Forwards records into a bounded channel. A full channel applies
/// back-pressure to verification.
pub struct ChannelNotifier {
    sender: mpsc::Sender<VerifiedRecord>,
}

impl ChannelNotifier {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<VerifiedRecord>) {
        let (sender, receiver) = mpsc::channel(buffer);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl StreamFileNotifier for ChannelNotifier {
    async fn verified(&self, record: VerifiedRecord) {
        let index = record.index;
        if self.sender.send(record).await.is_err() {
            warn!(block = index, "Verified record dropped, receiver closed");
        }
    }
}

/// Logs each record.
#[derive(Debug, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl StreamFileNotifier for LoggingNotifier {
    async fn verified(&self, record: VerifiedRecord) {
        info!(
            block = record.index,
            name = %record.name,
            hash = %record.hash,
            node = %record.node,
            transactions = record.count,
            "Verified block"
        );
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

    #[tokio::test]
    async fn channel_delivers_in_order() {
        let (notifier, mut receiver) = ChannelNotifier::new(4);
        notifier.verified(record(1)).await;
        notifier.verified(record(2)).await;
        assert_eq!(receiver.recv().await.unwrap().index, 1);
        assert_eq!(receiver.recv().await.unwrap().index, 2);
    }

    #[tokio::test]
    async fn closed_channel_does_not_block() {
        let (notifier, receiver) = ChannelNotifier::new(1);
        drop(receiver);
        notifier.verified(record(1)).await;
    }
}
