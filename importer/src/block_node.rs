//! One upstream block node: availability probes, block assembly from the
//! item stream, and health bookkeeping.

use blockfeed_protocol::{
    BlockNodeClient, ResponseStream, ServerStatusResponse, StreamStatus, SubscribeStreamRequest,
    SubscribeStreamResponse,
};
use blockfeed_types::{BlockItem, Clock, StreamedBlock};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::latency::LatencyTracker;
use crate::{BlockStreamError, ImporterError};

/// Assembled blocks of one subscription. Ends after the first error.
pub type BlockStream = BoxStream<'static, Result<StreamedBlock, ImporterError>>;

#[derive(Debug)]
struct Health {
    errors: u32,
    active: bool,
    /// Millis after which an inactive node may be readmitted.
    readmit_at: i64,
}

pub struct BlockNode {
    client: Arc<dyn BlockNodeClient>,
    /// Position in the configuration, the last tie-breaker when ordering.
    index: usize,
    priority: u32,
    config: StreamConfig,
    clock: Arc<dyn Clock>,
    health: Mutex<Health>,
    latency: Mutex<LatencyTracker>,
}

impl BlockNode {
    pub fn new(
        client: Arc<dyn BlockNodeClient>,
        index: usize,
        priority: u32,
        config: &StreamConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            index,
            priority,
            config: config.clone(),
            clock,
            health: Mutex::new(Health {
                errors: 0,
                active: true,
                readmit_at: 0,
            }),
            latency: Mutex::new(LatencyTracker::new()),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.client.endpoint()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    fn health(&self) -> MutexGuard<'_, Health> {
        self.health.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Available block range, `None` when the node serves nothing or does not
    /// answer within the status timeout.
    pub async fn block_range(&self) -> Option<ServerStatusResponse> {
        let status = tokio::time::timeout(self.config.status_timeout(), self.client.server_status()).await;
        match status {
            Ok(Ok(status)) if !status.is_empty() => Some(status),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                warn!(node = %self, error = %e, "Failed to get block node server status");
                None
            }
            Err(_) => {
                warn!(node = %self, timeout_ms = self.config.status_timeout_ms, "Block node server status timed out");
                None
            }
        }
    }

    /// Whether the node can serve `block_number`. Never fails: an unreachable
    /// node simply cannot.
    pub async fn has_block(&self, block_number: u64) -> bool {
        self.block_range()
            .await
            .is_some_and(|range| range.contains(block_number))
    }

    /// Subscribe from `start` (through `end` when bounded) and assemble the
    /// pushed item sets into whole blocks.
    ///
    /// Nothing is sent until the stream is first polled; every call opens a
    /// fresh subscription.
    pub fn stream(&self, start: u64, end: Option<u64>) -> BlockStream {
        let subscription = Subscription {
            client: Arc::clone(&self.client),
            clock: Arc::clone(&self.clock),
            request: SubscribeStreamRequest {
                start_block_number: start,
                end_block_number: end,
            },
            block_timeout: self.config.block_timeout(),
            responses: None,
            assembler: BlockAssembler::new(self.config.max_block_items),
            finished: false,
        };

        stream::unfold(subscription, |mut subscription| async move {
            if subscription.finished {
                return None;
            }
            match subscription.next_block().await {
                Ok(Some(block)) => Some((Ok(block), subscription)),
                Ok(None) => None,
                Err(e) => {
                    subscription.finished = true;
                    Some((Err(e), subscription))
                }
            }
        })
        .boxed()
    }

    pub fn is_active(&self) -> bool {
        self.health().active
    }

    /// Count a failed subscription. Failures accumulate across subscriptions;
    /// the last allowed one marks the node inactive until the readmit delay
    /// has passed and starts the count over.
    pub fn on_error(&self) {
        let mut health = self.health();
        health.errors += 1;
        if health.errors >= self.config.max_subscribe_attempts {
            warn!(
                "Failed to stream blocks from {} {} times, mark it inactive",
                self, self.config.max_subscribe_attempts
            );
            health.active = false;
            health.errors = 0;
            health.readmit_at = self
                .clock
                .now_millis()
                .saturating_add(self.config.readmit_delay_ms as i64);
        }
    }

    /// Reactivate the node when forced or once the readmit delay has passed.
    pub fn try_readmit(&self, force: bool) -> &Self {
        let mut health = self.health();
        if !health.active && (force || self.clock.now_millis() > health.readmit_at) {
            health.active = true;
            info!(node = %self, force, "Readmitted block node");
        }
        self
    }

    pub fn record_latency(&self, latency_ms: i64) {
        self.latency
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(latency_ms);
    }

    pub fn latency(&self) -> i64 {
        self.latency
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .latency()
    }
}

impl fmt::Display for BlockNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.endpoint())
    }
}

impl fmt::Debug for BlockNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockNode")
            .field("endpoint", &self.endpoint())
            .field("index", &self.index)
            .field("priority", &self.priority)
            .field("health", &*self.health())
            .finish()
    }
}

/// State carried between polls of a [`BlockStream`].
struct Subscription {
    client: Arc<dyn BlockNodeClient>,
    clock: Arc<dyn Clock>,
    request: SubscribeStreamRequest,
    block_timeout: Duration,
    responses: Option<ResponseStream>,
    assembler: BlockAssembler,
    finished: bool,
}

impl Subscription {
    /// Read responses until a block closes. `Ok(None)` when the server ends
    /// the stream.
    async fn next_block(&mut self) -> Result<Option<StreamedBlock>, ImporterError> {
        if self.responses.is_none() {
            let responses = self
                .client
                .subscribe(self.request)
                .await
                .map_err(BlockStreamError::Transport)?;
            self.responses = Some(responses);
        }
        let Some(responses) = self.responses.as_mut() else {
            return Ok(None);
        };

        let deadline = tokio::time::Instant::now() + self.block_timeout;
        loop {
            let response = match tokio::time::timeout_at(deadline, responses.next()).await {
                Err(_) => {
                    return Err(BlockStreamError::Timeout(format!(
                        "a block from {} after {} ms",
                        self.client.endpoint(),
                        self.block_timeout.as_millis()
                    ))
                    .into())
                }
                Ok(None) => return Ok(None),
                Ok(Some(response)) => response.map_err(BlockStreamError::Transport)?,
            };

            match response {
                SubscribeStreamResponse::BlockItems(set) => {
                    if let Some(block) = self.assembler.assemble(set.items, self.clock.now_millis())? {
                        return Ok(Some(block));
                    }
                }
                SubscribeStreamResponse::Status(StreamStatus::Success) => {
                    info!(endpoint = %self.client.endpoint(), "Block server ended the subscription with {}", StreamStatus::Success);
                    return Ok(None);
                }
                SubscribeStreamResponse::Status(status) => {
                    return Err(BlockStreamError::Status(status).into());
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AssemblyState {
    /// No block seen yet.
    Idle,
    /// Header seen, proof not yet.
    BlockOpen,
    /// The last block was emitted; the next item set must start a block.
    BlockClosed,
    /// A structural rule was violated; further items are discarded.
    Errored,
}

/// Re-assembles pushed item sets into whole blocks.
struct BlockAssembler {
    state: AssemblyState,
    pending: Vec<BlockItem>,
    load_start: i64,
    max_items: usize,
}

impl BlockAssembler {
    fn new(max_items: usize) -> Self {
        Self {
            state: AssemblyState::Idle,
            pending: Vec::new(),
            load_start: 0,
            max_items,
        }
    }

    /// Feed one item set; returns the block it closes, if any.
    fn assemble(&mut self, items: Vec<BlockItem>, now: i64) -> Result<Option<StreamedBlock>, BlockStreamError> {
        if self.state == AssemblyState::Errored {
            debug!(items = items.len(), "Discarding block items after a stream error");
            return Ok(None);
        }
        let result = self.step(items, now);
        if result.is_err() {
            self.state = AssemblyState::Errored;
            self.pending.clear();
        }
        result
    }

    fn step(&mut self, items: Vec<BlockItem>, now: i64) -> Result<Option<StreamedBlock>, BlockStreamError> {
        let Some(first) = items.first() else {
            warn!("Received empty BlockItemSet from block node");
            return Ok(None);
        };

        let starts_block = first.is_header() || first.is_record_file();
        let is_record_file = first.is_record_file();
        match (self.state, starts_block) {
            (AssemblyState::BlockOpen, true) => return Err(BlockStreamError::NewBlockWhilePending),
            (AssemblyState::Idle | AssemblyState::BlockClosed, false) => {
                return Err(BlockStreamError::IncorrectFirstItem(first.case()))
            }
            _ => {}
        }
        if is_record_file && items.len() > 1 {
            return Err(BlockStreamError::RecordFileWithOtherItems);
        }

        let closes = is_record_file || items.last().is_some_and(BlockItem::is_proof);
        if starts_block {
            self.load_start = now;
            self.state = AssemblyState::BlockOpen;
        }
        self.pending.extend(items);
        if self.pending.len() > self.max_items {
            return Err(BlockStreamError::TooManyItems {
                received: self.pending.len(),
                limit: self.max_items,
            });
        }

        if !closes {
            return Ok(None);
        }
        self.state = AssemblyState::BlockClosed;
        Ok(Some(StreamedBlock {
            items: std::mem::take(&mut self.pending),
            load_start: self.load_start,
        }))
    }
}
