use std::io;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Listing request command
pub const GET_FILES: &str = "GET_FILES";

/// File request command prefix, followed by the file name
pub const GET_FILE_PREFIX: &str = "GET_FILE ";

/// Listing response sent when no local listing has been captured
pub const NO_FILES_SENTINEL: &str = "No files available";

/// Acknowledgement prefix echoed back for unrecognized commands
pub const ACK_PREFIX: &str = "Received your message: ";

/// Out-of-band marker sent in place of the 4-byte length prefix when a file
/// request fails
pub const ERR_MARKER: [u8; 4] = *b"ERR!";

/// Framing-layer errors
#[derive(Debug, Error)]
pub enum WireError {
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("truncated transfer: got {received} of {expected} bytes")]
    Truncated { expected: usize, received: usize },

    #[error("payload too large for length prefix: {0} bytes")]
    Oversize(usize),
}

/// Decoded file-response frame.
///
/// The wire overloads the 4-byte length slot with the `ERR!` marker; this is
/// the single place that distinction is made, so downstream code never
/// inspects the raw bytes again.
#[derive(Debug)]
pub enum FileFrame {
    /// Complete payload of the requested file
    Payload(Vec<u8>),
    /// Error line reported by the serving peer
    ServerError(String),
}

/// Write one newline-terminated text line.
pub async fn write_line<W>(w: &mut W, line: &str) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    w.write_all(line.as_bytes()).await?;
    w.write_all(b"\n").await?;
    Ok(())
}

/// Read one text line, without its terminator.
///
/// Returns `None` once the stream ends before any byte of a new line.
pub async fn read_line<R>(r: &mut R) -> Result<Option<String>, WireError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    if r.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Some(line))
}

/// Write a successful file response: 4-byte big-endian length, then the raw
/// bytes with no trailing delimiter.
pub async fn write_file_payload<W>(w: &mut W, data: &[u8]) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(data.len()).map_err(|_| WireError::Oversize(data.len()))?;
    w.write_all(&len.to_be_bytes()).await?;
    w.write_all(data).await?;
    Ok(())
}

/// Write a failed file response: the `ERR!` marker, then one error line.
pub async fn write_file_error<W>(w: &mut W, message: &str) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    w.write_all(&ERR_MARKER).await?;
    w.write_all(message.as_bytes()).await?;
    w.write_all(b"\n").await?;
    Ok(())
}

/// Read a file-response frame: the 4-byte slot, then either the server's
/// error line or exactly the declared number of payload bytes.
pub async fn read_file_frame<R>(r: &mut R) -> Result<FileFrame, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut slot = [0u8; 4];
    r.read_exact(&mut slot).await?;

    if slot == ERR_MARKER {
        let mut reader = BufReader::new(r);
        let line = read_line(&mut reader).await?.unwrap_or_default();
        return Ok(FileFrame::ServerError(line));
    }

    let expected = u32::from_be_bytes(slot) as usize;
    let payload = read_exact_payload(r, expected).await?;
    Ok(FileFrame::Payload(payload))
}

/// Accumulate exactly `expected` bytes across possibly-partial reads.
///
/// A stream that ends early is a truncated transfer, never a short success.
async fn read_exact_payload<R>(r: &mut R, expected: usize) -> Result<Vec<u8>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut payload = vec![0u8; expected];
    let mut received = 0;
    while received < expected {
        let n = r.read(&mut payload[received..]).await?;
        if n == 0 {
            return Err(WireError::Truncated { expected, received });
        }
        received += n;
    }
    Ok(payload)
}
