//! Streams verified blocks from the scheduled block node.

use async_trait::async_trait;
use blockfeed_types::SourceType;
use futures_util::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, Instrument};

use crate::block_node::BlockNode;
use crate::reader::BlockStreamReader;
use crate::scheduler::Scheduler;
use crate::tracing_spans::get_block_span;
use crate::verifier::BlockStreamVerifier;
use crate::{BlockSource, ImporterError, NextBlock};

pub struct BlockNodeSubscriber {
    scheduler: Arc<Scheduler>,
    verifier: Arc<BlockStreamVerifier>,
    reader: BlockStreamReader,
    end_block_number: Option<u64>,
}

impl BlockNodeSubscriber {
    pub fn new(
        scheduler: Arc<Scheduler>,
        verifier: Arc<BlockStreamVerifier>,
        reader: BlockStreamReader,
        end_block_number: Option<u64>,
    ) -> Self {
        Self {
            scheduler,
            verifier,
            reader,
            end_block_number,
        }
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Consume one subscription until it ends, fails, or a switch to another
    /// node is requested. The switch only happens at a block boundary.
    async fn stream_from(&self, node: &BlockNode, start: u64) -> Result<(), ImporterError> {
        info!("Start streaming block {} from {}", start, node);
        let mut blocks = node.stream(start, self.end_block_number);
        while let Some(block) = blocks.next().await {
            let file = self.reader.read_streamed(block?, node.endpoint())?;
            let (consensus_end, completed_at) = (file.consensus_end, file.load_end);
            self.verifier.verify(file).await?;
            self.scheduler.record_block(node, consensus_end, completed_at);

            if self.scheduler.should_reschedule() {
                debug!(node = %node, "Ending subscription for reschedule");
                break;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BlockSource for BlockNodeSubscriber {
    async fn get(&self) -> Result<(), ImporterError> {
        let next = self.verifier.next_block_number().await?;
        if next.is_past(self.end_block_number) {
            return Ok(());
        }

        let (node, start) = self.scheduler.select(next).await?;
        let span = get_block_span(SourceType::BlockNode.as_str(), start);
        let result = self.stream_from(&node, start).instrument(span).await;
        if result.is_err() {
            node.on_error();
        }
        result
    }

    fn source_type(&self) -> SourceType {
        SourceType::BlockNode
    }
}
