//! # Frame Transport
//!
//! Length-prefixed framing for sealed chunks on byte transports.
//!
//! Pipes and sockets do not keep chunk boundaries, and both stream modes need
//! them back on the receiving side. Each chunk travels as a 4-byte big-endian
//! u32 length followed by the chunk itself.
//!
//! ```text
//! ┌──────────┬───────────────┬──────────┬───────────────┬─────
//! │ len (BE) │ chunk 0       │ len (BE) │ chunk 1       │ ...
//! └──────────┴───────────────┴──────────┴───────────────┴─────
//! ```

use async_stream::try_stream;
use bytes::Bytes;
use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use futures::{Stream, StreamExt};

use crate::error::{Error, Result};

/// Size of the frame length prefix
pub const FRAME_PREFIX_SIZE: usize = 4;

/// Write one frame
pub async fn write_frame<W>(io: &mut W, payload: &[u8], max_len: usize) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > max_len {
        return Err(Error::Format(format!(
            "Frame too large: {} bytes (max {})",
            payload.len(),
            max_len
        )));
    }
    let len = u32::try_from(payload.len())
        .map_err(|_| Error::Format(format!("Frame too large: {} bytes", payload.len())))?;

    io.write_all(&len.to_be_bytes()).await?;
    io.write_all(payload).await?;
    Ok(())
}

/// Read one frame. Returns `None` on a clean end of input before a frame.
pub async fn read_frame<R>(io: &mut R, max_len: usize) -> Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    // Read 4-byte length prefix, distinguishing clean EOF from truncation
    let mut len_buf = [0u8; FRAME_PREFIX_SIZE];
    let mut filled = 0;
    while filled < FRAME_PREFIX_SIZE {
        let n = io.read(&mut len_buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(Error::Io(format!(
                "Truncated frame prefix: {} of {} bytes",
                filled, FRAME_PREFIX_SIZE
            )));
        }
        filled += n;
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_len {
        return Err(Error::Format(format!(
            "Frame too large: {} bytes (max {})",
            len, max_len
        )));
    }

    let mut buf = vec![0u8; len];
    io.read_exact(&mut buf)
        .await
        .map_err(|e| Error::Io(format!("Truncated frame body ({} bytes expected): {}", len, e)))?;

    Ok(Some(Bytes::from(buf)))
}

/// Stream the frames of a reader until it ends
pub fn frames<R>(reader: R, max_len: usize) -> impl Stream<Item = Result<Bytes>>
where
    R: AsyncRead + Unpin,
{
    try_stream! {
        let mut reader = reader;
        while let Some(frame) = read_frame(&mut reader, max_len).await? {
            yield frame;
        }
    }
}

/// Write every chunk of `chunks` as a frame, then flush. Returns the number of
/// frames written.
pub async fn write_frames<W, S>(writer: &mut W, chunks: S, max_len: usize) -> Result<u64>
where
    W: AsyncWrite + Unpin,
    S: Stream<Item = Result<Bytes>>,
{
    futures::pin_mut!(chunks);

    let mut written = 0u64;
    while let Some(chunk) = chunks.next().await {
        write_frame(writer, &chunk?, max_len).await?;
        written += 1;
    }
    writer.flush().await?;

    tracing::debug!("Wrote {} frames", written);
    Ok(written)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::RecipientKey;
    use crate::stream::{open_stream, seal_stream, OpenMode, SealMode};
    use crate::test_support::{sdk, shared_pair};
    use futures::io::Cursor;
    use futures::stream;
    use std::convert::Infallible;

    #[tokio::test]
    async fn test_frame_round_trip() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"first", 1024).await.unwrap();
        write_frame(&mut buf, b"", 1024).await.unwrap();
        write_frame(&mut buf, b"third", 1024).await.unwrap();
        assert_eq!(&buf[..4], &5u32.to_be_bytes());

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor, 1024).await.unwrap().unwrap(), "first");
        assert_eq!(read_frame(&mut cursor, 1024).await.unwrap().unwrap(), "");
        assert_eq!(read_frame(&mut cursor, 1024).await.unwrap().unwrap(), "third");
        assert!(read_frame(&mut cursor, 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_prefix_is_io_error() {
        let mut cursor = Cursor::new(vec![0u8, 0]);
        assert!(matches!(read_frame(&mut cursor, 1024).await, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_truncated_body_is_io_error() {
        let mut data = 10u32.to_be_bytes().to_vec();
        data.extend_from_slice(b"short");
        let mut cursor = Cursor::new(data);
        assert!(matches!(read_frame(&mut cursor, 1024).await, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_oversized_frames_are_rejected() {
        let mut cursor = Cursor::new(2048u32.to_be_bytes().to_vec());
        assert!(matches!(read_frame(&mut cursor, 1024).await, Err(Error::Format(_))));

        let mut buf = Vec::new();
        let result = write_frame(&mut buf, &[0u8; 17], 16).await;
        assert!(matches!(result, Err(Error::Format(_))));
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_frames_stream_stops_at_first_error() {
        let mut data = Vec::new();
        write_frame(&mut data, b"ok", 1024).await.unwrap();
        data.extend_from_slice(&[0u8, 0, 0]);

        let results: Vec<_> = frames(Cursor::new(data), 1024).collect().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), "ok");
        assert!(matches!(results[1], Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_sealed_stream_over_frames() {
        let sdk = sdk();
        let recipient = RecipientKey::from_pem(shared_pair().public_pem()).unwrap();
        let data = vec![0x41u8; 20 * 1024];
        let chunks = data
            .chunks(4096)
            .map(|c| Ok::<_, Infallible>(Bytes::copy_from_slice(c)));

        let sealed = seal_stream(sdk.clone(), SealMode::Envelope(recipient), stream::iter(chunks));
        let mut wire = Vec::new();
        let written = write_frames(&mut wire, sealed, 1024 * 1024).await.unwrap();
        assert_eq!(written, 5);

        let opened = open_stream(sdk.clone(), OpenMode::Envelope, frames(Cursor::new(wire), 1024 * 1024));
        let out: Vec<Bytes> = opened.map(|r| r.unwrap()).collect().await;
        assert_eq!(out.concat(), data);
    }
}
