//! Low-level I/O operations for NNTP protocol communication
//!
//! Every read and write runs under a deadline from [`Timeouts`](crate::Timeouts).
//! Any failure that leaves the stream in an unknown position marks the
//! connection broken.

use super::NntpConnection;
use super::state::ConnectionState;
use crate::commands;
use crate::error::{NntpError, Result};
use crate::response::NntpResponse;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::trace;

/// Longest status line accepted before the server is considered broken
const MAX_RESPONSE_LINE: usize = 4096;

impl NntpConnection {
    /// Send a command to the server
    pub(super) async fn send_command(&mut self, command: &str) -> Result<()> {
        if command.starts_with("AUTHINFO PASS") {
            trace!("Sending command: AUTHINFO PASS ****");
        } else {
            trace!("Sending command: {}", command.trim());
        }
        self.write_all(command.as_bytes()).await
    }

    /// Write raw bytes and flush, under the write deadline
    pub(super) async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let deadline = self.timeouts.write;
        let result = timeout(deadline, async {
            let stream = self.stream.get_mut();
            stream.write_all(data).await?;
            stream.flush().await?;
            Ok::<(), NntpError>(())
        })
        .await
        .unwrap_or(Err(NntpError::Timeout));
        self.track(result)
    }

    /// Read a single-line response
    pub(super) async fn read_response(&mut self) -> Result<NntpResponse> {
        let deadline = self.timeouts.response;
        self.read_response_with_timeout(deadline).await
    }

    /// Read a single-line response with custom timeout
    pub(super) async fn read_response_with_timeout(
        &mut self,
        timeout_duration: Duration,
    ) -> Result<NntpResponse> {
        let read_future = async {
            let mut line_bytes = Vec::with_capacity(512);
            (&mut self.stream)
                .take(MAX_RESPONSE_LINE as u64)
                .read_until(b'\n', &mut line_bytes)
                .await?;

            if line_bytes.is_empty() {
                return Err(NntpError::ConnectionClosed);
            }
            if line_bytes.last() != Some(&b'\n') {
                return Err(NntpError::InvalidResponse(format!(
                    "status line exceeds {} bytes or is unterminated",
                    MAX_RESPONSE_LINE
                )));
            }

            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end();
            trace!("Received: {}", line);

            commands::parse_single_response(line)
        };

        let result = timeout(timeout_duration, read_future)
            .await
            .unwrap_or(Err(NntpError::Timeout));
        self.track(result)
    }

    /// Mark the connection broken when an error leaves the stream unusable
    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result
            && e.breaks_connection()
        {
            self.mark_broken();
            if matches!(e, NntpError::ConnectionClosed) {
                self.state = ConnectionState::Closed;
            }
        }
        result
    }
}
