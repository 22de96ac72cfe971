//! Posting and server configuration
//!
//! The whole run is driven by one immutable [`Config`] value built by the
//! caller, validated once with [`Config::validate`] and passed explicitly into
//! the dispatcher and the connection pools.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{PostError, PostResult};
use crate::response::ResponsePolicy;
use crate::retry::RetryConfig;

/// Chunk size used when the configuration leaves it unset
pub const DEFAULT_CHUNK_SIZE: u64 = 10_240;

/// Default yEnc line length
pub const DEFAULT_LINE_LENGTH: usize = 128;

/// Largest accepted chunk or article size, each is held in memory whole
pub const MAX_SEGMENT_SIZE: u64 = 256 * 1024 * 1024;

/// NNTP server configuration
///
/// Contains all the information needed to connect and post to one upstream.
///
/// # Example
///
/// ```
/// use nntp_poster::ServerConfig;
///
/// let config = ServerConfig::tls("news.example.com", "user", "pass").with_connections(8);
/// assert_eq!(config.port, 563);
/// assert_eq!(config.connections, 8);
/// ```
#[must_use]
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServerConfig {
    /// Server hostname (e.g., "news.example.com")
    pub host: String,

    /// Server port (typically 119 for plain, 563 for TLS)
    pub port: u16,

    /// Negotiate TLS right after the TCP connection is established
    #[cfg_attr(feature = "serde", serde(default))]
    pub tls: bool,

    /// Allow insecure TLS connections (self-signed certificates, expired certificates)
    ///
    /// **Security Warning:** Setting this to `true` disables certificate validation,
    /// making your connection vulnerable to man-in-the-middle attacks.
    #[cfg_attr(feature = "serde", serde(default))]
    pub allow_insecure_tls: bool,

    /// Username for AUTHINFO; an empty username skips authentication
    #[cfg_attr(feature = "serde", serde(default))]
    pub username: String,

    /// Password for AUTHINFO
    #[cfg_attr(feature = "serde", serde(default))]
    pub password: String,

    /// Maximum number of concurrent sessions to this server
    #[cfg_attr(feature = "serde", serde(default = "default_connections"))]
    pub connections: u32,
}

#[cfg(feature = "serde")]
fn default_connections() -> u32 {
    1
}

impl ServerConfig {
    /// Create a new server configuration with a single connection
    pub fn new(
        host: impl Into<String>,
        port: u16,
        tls: bool,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            tls,
            allow_insecure_tls: false,
            username: username.into(),
            password: password.into(),
            connections: 1,
        }
    }

    /// Create a configuration for a TLS connection on the standard secure port (563)
    pub fn tls(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::new(host, 563, true, username, password)
    }

    /// Create a configuration for a plain connection on the standard port (119)
    ///
    /// **Warning:** Plain connections transmit credentials in clear text.
    pub fn plain(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::new(host, 119, false, username, password)
    }

    /// Create a TLS configuration that accepts self-signed certificates
    pub fn tls_insecure(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let mut config = Self::tls(host, username, password);
        config.allow_insecure_tls = true;
        config
    }

    /// Set the maximum number of concurrent sessions
    pub fn with_connections(mut self, connections: u32) -> Self {
        self.connections = connections;
        self
    }

    /// `host:port`, used in log lines
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn validate(&self, name: &str) -> PostResult<()> {
        if self.host.trim().is_empty() {
            return Err(PostError::Config(format!("server {name}: empty host")));
        }
        if self.port == 0 {
            return Err(PostError::Config(format!("server {name}: port must not be 0")));
        }
        if self.connections == 0 {
            return Err(PostError::Config(format!(
                "server {name}: connections must be at least 1"
            )));
        }
        Ok(())
    }
}

/// Named set of upstream servers, resolved once before posting starts
///
/// Iteration order is the lexical order of the names.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ServerRegistry {
    servers: BTreeMap<String, ServerConfig>,
}

impl ServerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a server
    #[must_use]
    pub fn with_server(mut self, name: impl Into<String>, server: ServerConfig) -> Self {
        self.insert(name, server);
        self
    }

    /// Add or replace a server, returning the previous entry under that name
    pub fn insert(&mut self, name: impl Into<String>, server: ServerConfig) -> Option<ServerConfig> {
        self.servers.insert(name.into(), server)
    }

    /// Look up a server by name
    pub fn get(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.get(name)
    }

    /// Iterate over `(name, server)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ServerConfig)> {
        self.servers.iter().map(|(name, server)| (name.as_str(), server))
    }

    /// Number of configured servers
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Whether no server is configured
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Sum of every server's connection limit
    pub fn total_connections(&self) -> u32 {
        self.servers.values().map(|s| s.connections).sum()
    }
}

impl FromIterator<(String, ServerConfig)> for ServerRegistry {
    fn from_iter<I: IntoIterator<Item = (String, ServerConfig)>>(iter: I) -> Self {
        Self {
            servers: iter.into_iter().collect(),
        }
    }
}

/// Global posting parameters
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PostingConfig {
    /// Sender identity for the From header (e.g. `Poster <poster@example.com>`)
    pub from: String,
    /// Newsgroup(s) used when the request has no override, comma separated
    pub default_group: String,
    /// Text placed in front of every subject
    pub subject_prefix: String,
    /// Upper bound of one article's decoded payload; `None` uses the chunk size
    pub article_size: Option<u64>,
    /// Size of the file reads the segmenter works in; `None` uses [`DEFAULT_CHUNK_SIZE`]
    pub chunk_size: Option<u64>,
    /// yEnc line length (1..=997)
    pub line_length: usize,
    /// Right-hand side of generated Message-IDs; derived from `from` when unset
    pub message_id_domain: Option<String>,
    /// Decode every encoded body and compare it with the source before sending
    pub verify_encoding: bool,
}

impl Default for PostingConfig {
    fn default() -> Self {
        Self {
            from: String::new(),
            default_group: String::new(),
            subject_prefix: String::new(),
            article_size: None,
            chunk_size: None,
            line_length: DEFAULT_LINE_LENGTH,
            message_id_domain: None,
            verify_encoding: true,
        }
    }
}

impl PostingConfig {
    /// Create posting parameters with the sender and default newsgroup set
    pub fn new(from: impl Into<String>, default_group: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            default_group: default_group.into(),
            ..Default::default()
        }
    }

    /// Chunk size with the default applied
    pub fn effective_chunk_size(&self) -> u64 {
        self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    /// The default newsgroup list, split on commas
    pub fn default_groups(&self) -> Vec<String> {
        split_groups(&self.default_group)
    }

    fn validate(&self) -> PostResult<()> {
        if self.from.trim().is_empty() {
            return Err(PostError::Config("from must not be empty".to_string()));
        }
        if self.chunk_size == Some(0) {
            return Err(PostError::Config("chunk size must not be 0".to_string()));
        }
        if self.article_size == Some(0) {
            return Err(PostError::Config("article size must not be 0".to_string()));
        }
        for (name, size) in [("chunk", self.chunk_size), ("article", self.article_size)] {
            if let Some(size) = size
                && size > MAX_SEGMENT_SIZE
            {
                return Err(PostError::Config(format!(
                    "{} size {} exceeds {} bytes",
                    name, size, MAX_SEGMENT_SIZE
                )));
            }
        }
        if self.line_length == 0 || self.line_length > 997 {
            return Err(PostError::Config(format!(
                "line length {} out of range 1-997",
                self.line_length
            )));
        }
        Ok(())
    }
}

/// Split a comma separated newsgroup list, dropping blanks
pub fn split_groups(groups: &str) -> Vec<String> {
    groups
        .split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}

/// Deadlines for network operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Timeouts {
    /// TCP connect
    pub connect: Duration,
    /// TLS handshake
    pub tls_handshake: Duration,
    /// Waiting for one status line
    pub response: Duration,
    /// Writing one command or one article
    pub write: Duration,
    /// Idle sessions older than this are closed by the pool
    pub idle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(120),
            tls_handshake: Duration::from_secs(60),
            response: Duration::from_secs(60),
            write: Duration::from_secs(120),
            idle: Duration::from_secs(300),
        }
    }
}

/// Complete configuration of a posting run
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Global posting parameters
    pub posting: PostingConfig,
    /// Upstream servers by name
    pub servers: ServerRegistry,
    /// Retry budget and backoff
    #[cfg_attr(feature = "serde", serde(default))]
    pub retry: RetryConfig,
    /// Network deadlines
    #[cfg_attr(feature = "serde", serde(default))]
    pub timeouts: Timeouts,
    /// Classification of failure responses
    #[cfg_attr(feature = "serde", serde(default))]
    pub responses: ResponsePolicy,
    /// Cap on concurrent sessions across all servers
    #[cfg_attr(feature = "serde", serde(default))]
    pub max_connections: Option<u32>,
    /// How long in-flight posts may run after cancellation
    #[cfg_attr(feature = "serde", serde(default = "default_shutdown_grace"))]
    pub shutdown_grace: Duration,
}

#[cfg(feature = "serde")]
fn default_shutdown_grace() -> Duration {
    Duration::from_secs(30)
}

impl Config {
    /// Create a configuration with default retry, timeout and response policies
    pub fn new(posting: PostingConfig, servers: ServerRegistry) -> Self {
        Self {
            posting,
            servers,
            retry: RetryConfig::default(),
            timeouts: Timeouts::default(),
            responses: ResponsePolicy::default(),
            max_connections: None,
            shutdown_grace: Duration::from_secs(30),
        }
    }

    /// Check every invariant the posting engine relies on
    ///
    /// # Errors
    ///
    /// Returns [`PostError::Config`] naming the first offending setting.
    pub fn validate(&self) -> PostResult<()> {
        self.posting.validate()?;
        if self.servers.is_empty() {
            return Err(PostError::Config("no servers configured".to_string()));
        }
        for (name, server) in self.servers.iter() {
            server.validate(name)?;
        }
        if self.retry.max_attempts == 0 {
            return Err(PostError::Config(
                "retry budget must allow at least one attempt".to_string(),
            ));
        }
        if self.max_connections == Some(0) {
            return Err(PostError::Config(
                "max connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of worker slots the dispatcher will run
    pub fn worker_slots(&self) -> u32 {
        let total = self.servers.total_connections();
        match self.max_connections {
            Some(cap) => total.min(cap),
            None => total,
        }
    }
}
