//! Periodic latency measurement of the nodes not currently streamed from.

use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn, Instrument};

use crate::block_node::BlockNode;
use crate::reader::BlockStreamReader;
use crate::scheduler::Scheduler;
use crate::tracing_spans::probe_span;
use crate::verifier::BlockStreamVerifier;
use crate::{ImporterError, NextBlock};

/// Candidates measured per tick.
const CANDIDATES_PER_TICK: usize = 2;

pub struct LatencyProbe {
    scheduler: Arc<Scheduler>,
    verifier: Arc<BlockStreamVerifier>,
    reader: BlockStreamReader,
    interval: Duration,
    probe_timeout: Duration,
}

impl LatencyProbe {
    pub fn new(
        scheduler: Arc<Scheduler>,
        verifier: Arc<BlockStreamVerifier>,
        reader: BlockStreamReader,
        interval: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            scheduler,
            verifier,
            reader,
            interval,
            probe_timeout,
        }
    }

    /// Measure up to two candidates on the next expected block, then decide
    /// whether the subscriber should switch. Returns whether a switch was
    /// requested.
    pub async fn tick(&self) -> Result<bool, ImporterError> {
        let NextBlock::Number(next) = self.verifier.next_block_number().await? else {
            return Ok(false);
        };

        for node in self.scheduler.probe_candidates(CANDIDATES_PER_TICK) {
            if !node.has_block(next).await {
                continue;
            }
            let span = probe_span(node.endpoint(), next);
            self.measure(&node, next).instrument(span).await;
        }
        Ok(self.scheduler.evaluate(next).await)
    }

    /// Stream a single block and record its latency. The block is not
    /// verified, and a failed measurement does not count against the node.
    async fn measure(&self, node: &BlockNode, block_number: u64) {
        let mut blocks = node.stream(block_number, Some(block_number));
        let block = match tokio::time::timeout(self.probe_timeout, blocks.next()).await {
            Ok(Some(Ok(block))) => block,
            Ok(Some(Err(e))) => {
                debug!(error = %e, "Latency probe failed");
                return;
            }
            Ok(None) => {
                debug!("Latency probe received no block");
                return;
            }
            Err(_) => {
                debug!(timeout_ms = self.probe_timeout.as_millis() as u64, "Latency probe timed out");
                return;
            }
        };

        match self.reader.read_streamed(block, node.endpoint()) {
            Ok(file) => {
                let latency = file.load_end - file.consensus_end / 1_000_000;
                node.record_latency(latency);
                debug!(latency_ms = latency, "Measured node latency");
            }
            Err(e) => debug!(error = %e, "Latency probe received an unreadable block"),
        }
    }

    /// Run [`tick`](Self::tick) every interval until shutdown.
    pub fn spawn(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.tick().await {
                            warn!(error = %e, "Latency probe tick failed");
                        }
                    }
                    _ = shutdown.recv() => {
                        debug!("Latency probe stopped");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SchedulerConfig, StreamConfig};
    use crate::cursor::Cursor;
    use crate::tss::LedgerTssVerifier;
    use crate::ImporterMetrics;
    use blockfeed_nullables::{BlockGenerator, NullBlockNode, NullClock, NullNotifier};
    use blockfeed_store::{MemoryLedgerStore, MemoryRecordStore};

    /// Consensus end of block 0 in millis, as produced by the generator.
    const BLOCK_0_END_MS: i64 = 1_700_000_000_000;

    #[tokio::test]
    async fn faster_candidate_requests_a_switch() {
        let mut generator = BlockGenerator::new(3);
        let blocks = generator.blocks(2);
        let clock = Arc::new(NullClock::new(BLOCK_0_END_MS));
        let metrics = Arc::new(ImporterMetrics::new());
        let clients: Vec<_> = ["a:1", "b:1"]
            .into_iter()
            .map(|e| Arc::new(NullBlockNode::new(e).with_blocks(blocks.clone())))
            .collect();
        let nodes: Vec<_> = clients
            .iter()
            .enumerate()
            .map(|(i, c)| {
                Arc::new(BlockNode::new(c.clone(), i, 0, &StreamConfig::default(), clock.clone()))
            })
            .collect();
        let scheduler = Arc::new(Scheduler::new(
            nodes.clone(),
            &SchedulerConfig::default(),
            clock.clone(),
            metrics.clone(),
        ));
        let verifier = Arc::new(BlockStreamVerifier::new(
            Arc::new(Cursor::new(Arc::new(MemoryRecordStore::new()))),
            LedgerTssVerifier::new(Arc::new(MemoryLedgerStore::new()), None),
            Arc::new(NullNotifier::new()),
            metrics,
        ));
        let probe = LatencyProbe::new(
            scheduler.clone(),
            verifier,
            BlockStreamReader::new(clock.clone()),
            Duration::from_secs(5),
            Duration::from_secs(1),
        );

        scheduler.select(NextBlock::Number(0)).await.unwrap();
        assert_eq!(scheduler.current().unwrap().endpoint(), "a:1");
        nodes[0].record_latency(5_000);

        // too soon after the selection
        clock.advance(1_000);
        assert!(!probe.tick().await.unwrap());
        assert!(nodes[1].latency() > 0);

        clock.advance(60_000);
        assert!(probe.tick().await.unwrap());
        assert!(scheduler.should_reschedule());

        // a probe streams exactly the next block
        let request = clients[1].subscriptions()[0];
        assert_eq!((request.start_block_number, request.end_block_number), (0, Some(0)));
    }
}
