//! Per-server connection pooling using bb8

use crate::client::NntpConnection;
use crate::config::{ServerConfig, Timeouts};
use crate::error::{NntpError, Result};
use bb8::{ErrorSink, Pool, PooledConnection, RunError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;
use tracing::{debug, trace};

/// Deadline for checking out an idle session while draining
const DRAIN_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(1);

/// A session checked out of a [`ServerPool`]
///
/// Dropping the guard returns the session to the pool. Sessions marked broken
/// are discarded instead.
pub type PooledSession<'a> = PooledConnection<'a, NntpConnectionManager>;

/// Connection manager for bb8 pool
///
/// Opens the TCP/TLS session, checks the greeting and authenticates.
pub struct NntpConnectionManager {
    config: Arc<ServerConfig>,
    timeouts: Timeouts,
}

impl NntpConnectionManager {
    /// Create a new connection manager
    pub fn new(config: Arc<ServerConfig>, timeouts: Timeouts) -> Self {
        Self { config, timeouts }
    }
}

impl bb8::ManageConnection for NntpConnectionManager {
    type Connection = NntpConnection;
    type Error = NntpError;

    async fn connect(&self) -> Result<Self::Connection> {
        let mut conn = NntpConnection::connect(self.config.clone(), self.timeouts).await?;
        conn.authenticate().await?;
        Ok(conn)
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<()> {
        if conn.is_broken() {
            Err(NntpError::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_broken()
    }
}

/// Hands connection errors from bb8's background tasks back to `acquire`
///
/// With connection retry disabled bb8 reports a failed connect only through
/// the error sink; the waiting caller would otherwise just time out.
#[derive(Debug, Clone)]
struct ForwardErrors(mpsc::UnboundedSender<NntpError>);

impl ErrorSink<NntpError> for ForwardErrors {
    fn sink(&self, error: NntpError) {
        let _ = self.0.send(error);
    }

    fn boxed_clone(&self) -> Box<dyn ErrorSink<NntpError>> {
        Box::new(self.clone())
    }
}

/// Bounded set of sessions to one server
///
/// The pool is lazy: no session is opened before the first
/// [`acquire`](Self::acquire), and at most `connections` sessions are ever
/// live at once.
///
/// # Example
///
/// ```no_run
/// use nntp_poster::{ServerConfig, ServerPool, Timeouts};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ServerConfig::tls("news.example.com", "user", "pass").with_connections(4);
/// let pool = ServerPool::new("primary", config, Timeouts::default());
///
/// let session = pool.acquire().await?;
/// assert!(session.is_authenticated());
/// drop(session);
///
/// pool.drain().await;
/// # Ok(())
/// # }
/// ```
pub struct ServerPool {
    name: String,
    config: Arc<ServerConfig>,
    pool: Pool<NntpConnectionManager>,
    errors: Mutex<mpsc::UnboundedReceiver<NntpError>>,
}

impl ServerPool {
    /// Create the pool for one server
    pub fn new(name: impl Into<String>, config: ServerConfig, timeouts: Timeouts) -> Self {
        let name = name.into();
        let config = Arc::new(config);
        debug!(
            "Creating NNTP connection pool {} for {} (max size: {})",
            name,
            config.address(),
            config.connections
        );

        // Long enough for connect, handshake, greeting and both AUTHINFO lines
        let checkout_timeout =
            timeouts.connect + timeouts.tls_handshake + timeouts.response * 3;

        let (tx, rx) = mpsc::unbounded_channel();
        let manager = NntpConnectionManager::new(config.clone(), timeouts);
        let pool = Pool::builder()
            .max_size(config.connections.max(1))
            .retry_connection(false)
            .test_on_check_out(false)
            .connection_timeout(checkout_timeout)
            .idle_timeout(Some(timeouts.idle))
            .error_sink(Box::new(ForwardErrors(tx)))
            .build_unchecked(manager);

        Self {
            name,
            config,
            pool,
            errors: Mutex::new(rx),
        }
    }

    /// Registry name of the server
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Check out a session, opening one if none is idle
    ///
    /// # Errors
    ///
    /// Returns the error of the failed connection attempt (see
    /// [`NntpConnection::connect`] and [`NntpConnection::authenticate`]), or
    /// [`NntpError::Timeout`] if no session became available in time.
    pub async fn acquire(&self) -> Result<PooledSession<'_>> {
        // Left by attempts whose caller gave up; a held lock means a waiter
        // is already consuming them
        if let Ok(mut errors) = self.errors.try_lock() {
            while let Ok(stale) = errors.try_recv() {
                trace!("Discarding stale connect error on {}: {}", self.name, stale);
            }
        }

        tokio::select! {
            conn = self.pool.get() => match conn {
                Ok(conn) => Ok(conn),
                Err(RunError::User(e)) => Err(e),
                Err(RunError::TimedOut) => Err(NntpError::Timeout),
            },
            err = async { self.errors.lock().await.recv().await } => {
                Err(err.unwrap_or_else(|| NntpError::Pool("error channel closed".to_string())))
            }
        }
    }

    /// Close every idle session with QUIT
    ///
    /// Sessions still checked out are closed when their guard drops after the
    /// pool itself is gone.
    pub async fn drain(&self) {
        let idle = self.pool.state().idle_connections;
        debug!("Draining {} idle sessions from pool {}", idle, self.name);

        for _ in 0..idle {
            match timeout(DRAIN_CHECKOUT_TIMEOUT, self.pool.get()).await {
                Ok(Ok(mut conn)) => {
                    if let Err(e) = conn.quit().await {
                        trace!("QUIT on {} failed: {}", self.name, e);
                    }
                }
                _ => break,
            }
        }
    }

    /// Get current pool state (for monitoring)
    pub fn state(&self) -> bb8::State {
        self.pool.state()
    }

    /// Get the number of connections currently in use
    pub fn connections_in_use(&self) -> u32 {
        let state = self.pool.state();
        state.connections - state.idle_connections
    }
}

impl std::fmt::Debug for ServerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerPool")
            .field("name", &self.name)
            .field("server", &self.config.address())
            .field("max_size", &self.config.connections)
            .finish()
    }
}
