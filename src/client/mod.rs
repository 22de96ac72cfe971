//! NNTP posting client with optional TLS

mod auth;
mod connection;
mod io;
mod posting;
mod state;
mod stream;

use crate::config::{ServerConfig, Timeouts};
use std::sync::Arc;
use stream::NntpStream;
use tokio::io::BufReader;
use tracing::trace;

pub use state::ConnectionState;

/// One live session to an NNTP server
///
/// # Example
///
/// ```no_run
/// use nntp_poster::{NntpConnection, ServerConfig, Timeouts};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ServerConfig::tls("news.example.com", "user", "pass");
/// let mut conn = NntpConnection::connect(Arc::new(config), Timeouts::default()).await?;
/// conn.authenticate().await?;
/// # Ok(())
/// # }
/// ```
#[must_use]
pub struct NntpConnection {
    /// Buffered transport (both reader and writer)
    stream: BufReader<NntpStream>,
    /// Connection state
    state: ConnectionState,
    /// Server configuration
    config: Arc<ServerConfig>,
    /// Network deadlines
    timeouts: Timeouts,
    /// Whether this connection is broken (I/O failure, timeout, garbage data)
    is_broken: bool,
    /// A command was sent and its final reply not yet read
    mid_exchange: bool,
}

impl NntpConnection {
    /// Check if this connection is broken and should be discarded
    pub fn is_broken(&self) -> bool {
        self.is_broken || self.mid_exchange || self.state == ConnectionState::Closed
    }

    /// Mark this connection as broken so the pool discards it
    pub fn mark_broken(&mut self) {
        self.is_broken = true;
    }

    /// Current protocol state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if the client is currently authenticated
    pub fn is_authenticated(&self) -> bool {
        self.state == ConnectionState::Authenticated
    }

    /// Whether the session runs over TLS
    pub fn is_tls(&self) -> bool {
        self.stream.get_ref().is_tls()
    }

    /// Server this session talks to
    pub fn server(&self) -> &ServerConfig {
        &self.config
    }
}

impl std::fmt::Debug for NntpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NntpConnection")
            .field("server", &self.config.address())
            .field("state", &self.state)
            .field("tls", &self.is_tls())
            .field("is_broken", &self.is_broken)
            .field("mid_exchange", &self.mid_exchange)
            .finish()
    }
}

impl Drop for NntpConnection {
    fn drop(&mut self) {
        trace!(server = %self.config.address(), "NntpConnection dropped");
    }
}
