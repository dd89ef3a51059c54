use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest message the browser is allowed to send.
pub const MAX_INBOUND_FRAME: usize = 1024 * 1024;

const LENGTH_PREFIX: usize = 4;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame of {0} bytes exceeds the inbound limit")]
    TooLarge(usize),

    #[error("Stream ended after {read} of {expected} bytes")]
    Truncated { read: usize, expected: usize },

    #[error("Frame isn't valid json: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl FrameError {
    /// The stream is still aligned on a frame boundary after these, so the session can go on.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FrameError::Malformed(_))
    }
}

/// Fills `buffer` completely. Returns how much was read if the stream ended first.
async fn read_full(
    reader: &mut (impl AsyncRead + Unpin),
    buffer: &mut [u8],
) -> Result<usize, std::io::Error> {
    let mut filled = 0;
    while filled < buffer.len() {
        let read = reader.read(&mut buffer[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

/// Reads one frame: a native-endian `u32` length followed by that many bytes of json.
/// `Ok(None)` means the peer closed the stream between frames.
pub async fn read_frame(
    reader: &mut (impl AsyncRead + Unpin),
) -> Result<Option<serde_json::Value>, FrameError> {
    let mut prefix = [0u8; LENGTH_PREFIX];
    match read_full(reader, &mut prefix).await? {
        0 => return Ok(None),
        LENGTH_PREFIX => (),
        read => {
            return Err(FrameError::Truncated {
                read,
                expected: LENGTH_PREFIX,
            })
        }
    }

    let length = u32::from_ne_bytes(prefix) as usize;
    if length > MAX_INBOUND_FRAME {
        return Err(FrameError::TooLarge(length));
    }

    let mut body = vec![0u8; length];
    let read = read_full(reader, &mut body).await?;
    if read < length {
        return Err(FrameError::Truncated {
            read,
            expected: length,
        });
    }

    Ok(Some(serde_json::from_slice(&body)?))
}

pub async fn write_frame(
    writer: &mut (impl AsyncWrite + Unpin),
    message: &impl Serialize,
) -> Result<(), FrameError> {
    let body = serde_json::to_vec(message)?;
    let length = u32::try_from(body.len()).map_err(|_| FrameError::TooLarge(body.len()))?;
    writer.write_all(&length.to_ne_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}
