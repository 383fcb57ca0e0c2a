//! Block node protocol: message types, length-prefixed framing and the
//! client side of the status and subscribe calls.

pub mod client;
pub mod codec;
pub mod error;
pub mod message;
pub mod tcp;
pub mod version;

pub use client::{BlockNodeClient, ResponseStream};
pub use error::ProtocolError;
pub use message::{
    Request, RequestFrame, Response, ServerStatusResponse, StreamStatus, SubscribeStreamRequest,
    SubscribeStreamResponse,
};
pub use tcp::TcpBlockNodeClient;
pub use version::PROTOCOL_VERSION;
