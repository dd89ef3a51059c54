use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use super::{
    framing::{read_frame, write_frame},
    signal::{HostMessage, HostReply},
};

/// The browser's end of the conversation. The browser writes to the host's stdin and reads
/// replies from its stdout.
pub struct NativeMessagingChannel<R, W> {
    reader: R,
    writer: W,
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> NativeMessagingChannel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Waits for the next message that the host understands. Frames that aren't json or name an
    /// unknown message type are skipped. `None` means the browser closed the channel.
    pub async fn recv(&mut self) -> Result<Option<HostMessage>> {
        loop {
            let value = match read_frame(&mut self.reader).await {
                Ok(Some(value)) => value,
                Ok(None) => return Ok(None),
                Err(e) if e.is_recoverable() => {
                    warn!("Skipping unreadable frame {e}");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            match serde_json::from_value::<HostMessage>(value) {
                Ok(message) => {
                    debug!("Received {:?}", message);
                    return Ok(Some(message));
                }
                Err(e) => warn!("Skipping unsupported message {e}"),
            }
        }
    }

    pub async fn send(&mut self, reply: &HostReply) -> Result<()> {
        write_frame(&mut self.writer, reply).await?;
        Ok(())
    }
}
