//! Length-prefixed framing over any async byte stream.
//!
//! Wire format: `[4-byte length as u32 big-endian] + [data]`. The same
//! framing is used in both directions and over plain TCP or TLS.

use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{Result, ScriptgateError};

/// Maximum frame body size (100 MB)
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Writes one frame and flushes the stream.
///
/// # Errors
///
/// Returns an error if the body exceeds [`MAX_MESSAGE_SIZE`] or the write fails.
pub async fn write_frame<S>(stream: &mut S, data: &[u8]) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ScriptgateError::FrameTooLarge {
            size: data.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    let len = data.len() as u32;
    stream
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| map_io_error(e, "writing length prefix"))?;
    stream
        .write_all(data)
        .await
        .map_err(|e| map_io_error(e, "writing data"))?;
    stream
        .flush()
        .await
        .map_err(|e| map_io_error(e, "flushing stream"))?;

    Ok(())
}

/// Reads one frame.
///
/// Returns `Ok(None)` when the peer closed the stream before a new length
/// prefix, which is the normal end of a connection.
///
/// # Errors
///
/// Returns [`ScriptgateError::FrameTooLarge`] if the announced length exceeds
/// [`MAX_MESSAGE_SIZE`], and [`ScriptgateError::Connection`] if the stream
/// ends inside the length prefix or the frame body.
pub async fn read_frame<S>(stream: &mut S) -> Result<Option<Vec<u8>>>
where
    S: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        let n = match stream.read(&mut len_buf[filled..]).await {
            Ok(n) => n,
            // TLS streams report a peer that left without close_notify this way
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => 0,
            Err(e) => return Err(map_io_error(e, "reading length prefix")),
        };
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(ScriptgateError::Connection(format!(
                "stream ended after {} of 4 length prefix bytes",
                filled
            )));
        }
        filled += n;
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(ScriptgateError::FrameTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut buf = vec![0u8; len];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|e| map_io_error(e, "reading data"))?;

    Ok(Some(buf))
}

fn map_io_error(err: std::io::Error, context: &str) -> ScriptgateError {
    match err.kind() {
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::NotConnected
        | ErrorKind::BrokenPipe
        | ErrorKind::UnexpectedEof => {
            ScriptgateError::Connection(format!("{}: Connection lost", context))
        }
        _ => ScriptgateError::Io(err),
    }
}
