//! Message codec: 4-byte big-endian length prefix followed by a bincode body.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::ProtocolError;

/// Maximum message size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024; // 16 MiB

/// Encode a message into a length-prefixed frame.
pub fn encode(message: &impl Serialize) -> Result<Vec<u8>, ProtocolError> {
    let body = bincode::serialize(message).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    if body.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: body.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode a frame body (without its length prefix).
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ProtocolError> {
    bincode::deserialize(body).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

pub async fn write_frame<W>(writer: &mut W, message: &impl Serialize) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. Returns `Ok(None)` when the peer closed the connection
/// cleanly between frames.
pub async fn read_frame<R, T>(reader: &mut R, max_size: usize) -> Result<Option<T>, ProtocolError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let body_len = u32::from_be_bytes(len_buf) as usize;
    if body_len > max_size {
        return Err(ProtocolError::MessageTooLarge {
            size: body_len,
            max: max_size,
        });
    }

    let mut body = vec![0u8; body_len];
    reader.read_exact(&mut body).await?;
    decode(&body).map(Some)
}
