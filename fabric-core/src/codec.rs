//! 4-byte big-endian length prefix followed by a UTF-8 JSON payload.
//! Stateless and symmetric: a write composes `length || payload` as a
//! single send, a read blocks until the frame is complete or the peer
//! closes. The codec never reports partial progress — a zero-byte read on
//! either the length or payload phase is orderly shutdown, not an error.

use crate::error::FrameError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum accepted frame length (16 MiB). A length exceeding this is a
/// framing failure — the caller closes the connection with no response.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Read one frame. Returns `Ok(None)` on orderly shutdown (peer closed
/// before sending a length prefix), `Err` for any other framing violation.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Vec<u8>>, FrameError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(FrameError::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf);
    if len == 0 || len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    let mut payload = vec![0u8; len as usize];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => FrameError::Eof,
            _ => FrameError::Io(e),
        })?;
    Ok(Some(payload))
}

/// Write one frame: the 4-byte length prefix followed by `payload`, as a
/// single composed send.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), FrameError> {
    let len = payload.len() as u32;
    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(payload);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, b"{\"type\":\"get_status\"}").await.unwrap();
        let frame = read_frame(&mut b).await.unwrap().unwrap();
        assert_eq!(frame, b"{\"type\":\"get_status\"}");
    }

    #[tokio::test]
    async fn oversize_frame_is_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let len = (MAX_FRAME_LEN + 1).to_be_bytes();
        a.write_all(&len).await.unwrap();
        let result = read_frame(&mut b).await;
        assert!(matches!(result, Err(FrameError::TooLarge { .. })));
    }

    #[tokio::test]
    async fn orderly_shutdown_on_empty_read() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);
        let result = read_frame(&mut b).await.unwrap();
        assert!(result.is_none());
    }
}
