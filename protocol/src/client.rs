//! Transport-independent client interface of a block node.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::{ProtocolError, ServerStatusResponse, SubscribeStreamRequest, SubscribeStreamResponse};

/// Server-push sequence of a subscription. Dropping it unsubscribes.
pub type ResponseStream = BoxStream<'static, Result<SubscribeStreamResponse, ProtocolError>>;

#[async_trait]
pub trait BlockNodeClient: Send + Sync {
    /// Endpoint the client talks to, e.g. `localhost:40840`.
    fn endpoint(&self) -> &str;

    /// Unary status call.
    async fn server_status(&self) -> Result<ServerStatusResponse, ProtocolError>;

    /// Open a server-streaming subscription.
    async fn subscribe(&self, request: SubscribeStreamRequest) -> Result<ResponseStream, ProtocolError>;
}
