//! Request and response messages of the block node service.

use blockfeed_types::BlockItemSet;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::PROTOCOL_VERSION;

/// Range of blocks a node can currently serve, inclusive on both ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatusResponse {
    pub first_available_block: u64,
    pub last_available_block: u64,
}

impl ServerStatusResponse {
    pub fn contains(&self, block_number: u64) -> bool {
        self.first_available_block <= block_number && block_number <= self.last_available_block
    }

    /// A node with nothing to serve reports `first > last`.
    pub fn is_empty(&self) -> bool {
        self.first_available_block > self.last_available_block
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeStreamRequest {
    pub start_block_number: u64,
    /// `None` streams indefinitely.
    pub end_block_number: Option<u64>,
}

/// Terminal status of a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamStatus {
    /// The server ended the stream gracefully.
    Success,
    InvalidStartBlockNumber,
    InvalidEndBlockNumber,
    NotAvailable,
    Error,
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamStatus::Success => "READ_STREAM_SUCCESS",
            StreamStatus::InvalidStartBlockNumber => "READ_STREAM_INVALID_START_BLOCK_NUMBER",
            StreamStatus::InvalidEndBlockNumber => "READ_STREAM_INVALID_END_BLOCK_NUMBER",
            StreamStatus::NotAvailable => "READ_STREAM_NOT_AVAILABLE",
            StreamStatus::Error => "READ_STREAM_ERROR",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscribeStreamResponse {
    BlockItems(BlockItemSet),
    Status(StreamStatus),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    ServerStatus,
    Subscribe(SubscribeStreamRequest),
}

/// Versioned envelope around every request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub version: u16,
    pub request: Request,
}

impl RequestFrame {
    pub fn new(request: Request) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            request,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    ServerStatus(ServerStatusResponse),
    Stream(SubscribeStreamResponse),
    /// The server refused the request, e.g. for an unsupported version.
    Rejected(String),
}
