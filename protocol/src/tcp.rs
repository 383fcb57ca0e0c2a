//! Block node client over plain TCP.
//!
//! Every call opens its own connection. A subscription spawns a reader task
//! that forwards decoded responses into a bounded channel, so a slow consumer
//! pushes back on the socket instead of buffering without limit.

use async_trait::async_trait;
use futures_util::stream;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::client::{BlockNodeClient, ResponseStream};
use crate::codec::{read_frame, write_frame, MAX_MESSAGE_SIZE};
use crate::message::{Request, RequestFrame, Response};
use crate::{ProtocolError, ServerStatusResponse, SubscribeStreamRequest, SubscribeStreamResponse};

/// Default timeout for establishing a connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of responses buffered ahead of the consumer.
const DEFAULT_RESPONSE_BUFFER: usize = 32;

pub struct TcpBlockNodeClient {
    endpoint: String,
    connect_timeout: Duration,
    max_message_size: usize,
    response_buffer: usize,
}

impl TcpBlockNodeClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_message_size: MAX_MESSAGE_SIZE,
            response_buffer: DEFAULT_RESPONSE_BUFFER,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_response_buffer(mut self, buffer: usize) -> Self {
        self.response_buffer = buffer.max(1);
        self
    }

    async fn connect(&self) -> Result<TcpStream, ProtocolError> {
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.endpoint)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                Ok(stream)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ProtocolError::Timeout(format!("connect to {}", self.endpoint))),
        }
    }
}

#[async_trait]
impl BlockNodeClient for TcpBlockNodeClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn server_status(&self) -> Result<ServerStatusResponse, ProtocolError> {
        let mut socket = self.connect().await?;
        write_frame(&mut socket, &RequestFrame::new(Request::ServerStatus)).await?;

        match read_frame::<_, Response>(&mut socket, self.max_message_size).await? {
            Some(Response::ServerStatus(status)) => Ok(status),
            Some(Response::Rejected(reason)) => Err(ProtocolError::Rejected(reason)),
            Some(other) => Err(ProtocolError::UnexpectedResponse(format!("{other:?}"))),
            None => Err(ProtocolError::Closed),
        }
    }

    async fn subscribe(&self, request: SubscribeStreamRequest) -> Result<ResponseStream, ProtocolError> {
        let mut socket = self.connect().await?;
        write_frame(&mut socket, &RequestFrame::new(Request::Subscribe(request))).await?;

        let (tx, rx) = mpsc::channel(self.response_buffer);
        let max_size = self.max_message_size;
        let endpoint = self.endpoint.clone();

        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    frame = read_frame::<_, Response>(&mut socket, max_size) => frame,
                    _ = tx.closed() => {
                        tracing::debug!(endpoint = %endpoint, "subscriber dropped, closing stream");
                        break;
                    }
                };

                let item = match frame {
                    Ok(Some(Response::Stream(response))) => Ok(response),
                    Ok(Some(Response::Rejected(reason))) => Err(ProtocolError::Rejected(reason)),
                    Ok(Some(other)) => Err(ProtocolError::UnexpectedResponse(format!("{other:?}"))),
                    Ok(None) => Err(ProtocolError::Closed),
                    Err(e) => Err(e),
                };
                let terminal = !matches!(item, Ok(SubscribeStreamResponse::BlockItems(_)));

                if tx.send(item).await.is_err() || terminal {
                    break;
                }
            }
        });

        Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }
}
