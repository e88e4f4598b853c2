//! Length-prefixed framing.
//!
//! Each packet travels as a little-endian `u32` byte count followed by the
//! bincode-encoded packet.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, ServerError};

/// Read one frame. `Ok(None)` means the peer closed the stream cleanly
/// between frames.
///
/// # Errors
///
/// Returns an error on IO failure, a stream that ends mid-frame, or a frame
/// longer than `max_len`.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R, max_len: usize) -> Result<Option<Vec<u8>>> {
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > max_len {
        return Err(ServerError::FrameTooLarge { len, max: max_len });
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Write one frame.
///
/// # Errors
///
/// Returns an error on IO failure.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| ServerError::FrameTooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Encode and write a packet.
///
/// # Errors
///
/// Returns an error if encoding or writing fails.
pub async fn send_packet<W, T>(writer: &mut W, packet: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = bincode::serialize(packet)?;
    write_frame(writer, &bytes).await
}

/// Read and decode a packet. `Ok(None)` on a clean close.
///
/// # Errors
///
/// Returns an error if reading fails or the frame is not a valid packet.
pub async fn recv_packet<R, T>(reader: &mut R, max_len: usize) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match read_frame(reader, max_len).await? {
        Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
        None => Ok(None),
    }
}
