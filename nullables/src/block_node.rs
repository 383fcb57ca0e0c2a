//! Nullable block node: serves blocks from memory.

use async_trait::async_trait;
use blockfeed_protocol::{
    BlockNodeClient, ProtocolError, ResponseStream, ServerStatusResponse, StreamStatus,
    SubscribeStreamRequest, SubscribeStreamResponse,
};
use blockfeed_types::{Block, BlockItem, BlockItemSet};
use futures_util::stream::{self, StreamExt};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

struct Script {
    responses: Vec<SubscribeStreamResponse>,
    disconnect: bool,
}

struct State {
    blocks: BTreeMap<u64, Block>,
    items_per_set: usize,
    status_failing: bool,
    subscribe_failures: usize,
    scripts: VecDeque<Script>,
    end_status: StreamStatus,
    keep_open: bool,
    subscriptions: Vec<SubscribeStreamRequest>,
    status_calls: usize,
}

/// A block node that answers from an in-memory block map.
///
/// By default a subscription delivers every stored block from the start
/// number up to the end bound, each block in a single item set, then ends
/// with [`StreamStatus::Success`]. Scripts replace the next subscription's
/// responses verbatim.
pub struct NullBlockNode {
    endpoint: String,
    state: Mutex<State>,
}

fn block_number(block: &Block) -> Option<u64> {
    match block.items.first()? {
        BlockItem::BlockHeader(header) => Some(header.number),
        BlockItem::RecordFile(record) => Some(record.block_number),
        _ => None,
    }
}

impl NullBlockNode {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            state: Mutex::new(State {
                blocks: BTreeMap::new(),
                items_per_set: 0,
                status_failing: false,
                subscribe_failures: 0,
                scripts: VecDeque::new(),
                end_status: StreamStatus::Success,
                keep_open: false,
                subscriptions: Vec::new(),
                status_calls: 0,
            }),
        }
    }

    pub fn with_blocks(self, blocks: impl IntoIterator<Item = Block>) -> Self {
        for block in blocks {
            self.add_block(block);
        }
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store a block under the number in its header (or record file item).
    pub fn add_block(&self, block: Block) {
        if let Some(number) = block_number(&block) {
            self.state().blocks.insert(number, block);
        }
    }

    pub fn remove_block(&self, number: u64) {
        self.state().blocks.remove(&number);
    }

    /// Split each block into item sets of at most `n` items; 0 sends whole blocks.
    pub fn set_items_per_set(&self, n: usize) {
        self.state().items_per_set = n;
    }

    /// Make status calls fail like an unreachable server.
    pub fn set_status_failing(&self, failing: bool) {
        self.state().status_failing = failing;
    }

    /// Fail the next `n` subscribe calls at the transport level.
    pub fn fail_next_subscribes(&self, n: usize) {
        self.state().subscribe_failures = n;
    }

    /// Status sent after the last block.
    pub fn set_end_status(&self, status: StreamStatus) {
        self.state().end_status = status;
    }

    /// Leave the stream open after the last block instead of ending it.
    pub fn set_keep_open(&self, keep_open: bool) {
        self.state().keep_open = keep_open;
    }

    /// Replace the next subscription's responses.
    pub fn push_script(&self, responses: Vec<SubscribeStreamResponse>) {
        self.state().scripts.push_back(Script {
            responses,
            disconnect: false,
        });
    }

    /// Like [`push_script`](Self::push_script), then drop the connection.
    pub fn push_script_then_disconnect(&self, responses: Vec<SubscribeStreamResponse>) {
        self.state().scripts.push_back(Script {
            responses,
            disconnect: true,
        });
    }

    pub fn subscriptions(&self) -> Vec<SubscribeStreamRequest> {
        self.state().subscriptions.clone()
    }

    pub fn status_calls(&self) -> usize {
        self.state().status_calls
    }
}

#[async_trait]
impl BlockNodeClient for NullBlockNode {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn server_status(&self) -> Result<ServerStatusResponse, ProtocolError> {
        let mut state = self.state();
        state.status_calls += 1;
        if state.status_failing {
            return Err(ProtocolError::Timeout(format!("status from {}", self.endpoint)));
        }

        let first = state.blocks.keys().next().copied();
        let last = state.blocks.keys().next_back().copied();
        Ok(match (first, last) {
            (Some(first), Some(last)) => ServerStatusResponse {
                first_available_block: first,
                last_available_block: last,
            },
            _ => ServerStatusResponse {
                first_available_block: 1,
                last_available_block: 0,
            },
        })
    }

    async fn subscribe(&self, request: SubscribeStreamRequest) -> Result<ResponseStream, ProtocolError> {
        let mut state = self.state();
        state.subscriptions.push(request);

        if state.subscribe_failures > 0 {
            state.subscribe_failures -= 1;
            return Err(ProtocolError::Closed);
        }

        if let Some(script) = state.scripts.pop_front() {
            let responses = stream::iter(script.responses.into_iter().map(Ok));
            return Ok(if script.disconnect {
                responses.chain(stream::once(async { Err(ProtocolError::Closed) })).boxed()
            } else {
                responses.boxed()
            });
        }

        let end = request.end_block_number.unwrap_or(u64::MAX);
        let mut responses = Vec::new();
        let selected = state
            .blocks
            .range(request.start_block_number..)
            .take_while(|(number, _)| **number <= end)
            .map(|(_, block)| block);
        for block in selected {
            if state.items_per_set == 0 {
                responses.push(SubscribeStreamResponse::BlockItems(BlockItemSet {
                    items: block.items.clone(),
                }));
            } else {
                for chunk in block.items.chunks(state.items_per_set) {
                    responses.push(SubscribeStreamResponse::BlockItems(BlockItemSet {
                        items: chunk.to_vec(),
                    }));
                }
            }
        }

        let responses = stream::iter(responses.into_iter().map(Ok));
        Ok(if state.keep_open {
            responses.chain(stream::pending()).boxed()
        } else {
            let status = state.end_status;
            responses
                .chain(stream::once(async move {
                    Ok(SubscribeStreamResponse::Status(status))
                }))
                .boxed()
        })
    }
}
