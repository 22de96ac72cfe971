//! Error types for connections, posting and job planning

use std::path::PathBuf;
use thiserror::Error;

use crate::response::ResponsePolicy;

/// NNTP protocol and connection errors
#[derive(Error, Debug)]
pub enum NntpError {
    /// IO error during network operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS error during secure connection
    #[error("TLS error: {0}")]
    Tls(String),

    /// Network operation exceeded its deadline
    #[error("Connection timeout")]
    Timeout,

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// NNTP protocol error with response code
    #[error("NNTP error {code}: {message}")]
    Protocol {
        /// NNTP response code (e.g., 400, 441, 502)
        code: u16,
        /// Error message from server
        message: String,
    },

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Server greeted with 201 (no posting allowed)
    #[error("Posting not permitted")]
    PostingNotPermitted,

    /// Connection closed unexpectedly
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connection pool failure
    #[error("Pool error: {0}")]
    Pool(String),
}

/// Result type alias using NntpError
pub type Result<T> = std::result::Result<T, NntpError>;

/// How the dispatcher must react to a failed delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FailureKind {
    /// Transient; the article goes back on the queue
    Retryable,
    /// The server refused the content; the article fails without another attempt
    Rejected,
    /// The server cannot be used any more (authentication, TLS, posting denied)
    ServerFatal,
}

impl NntpError {
    /// Classify this error for the retry policy
    ///
    /// Server responses go through `policy`; everything that is not an explicit
    /// authentication, TLS or permission failure is retryable.
    pub fn failure_kind(&self, policy: &ResponsePolicy) -> FailureKind {
        match self {
            NntpError::Protocol { code, .. } => policy.classify(*code),
            NntpError::AuthFailed(_) | NntpError::Tls(_) | NntpError::PostingNotPermitted => {
                FailureKind::ServerFatal
            }
            NntpError::Io(_)
            | NntpError::Timeout
            | NntpError::InvalidResponse(_)
            | NntpError::ConnectionClosed
            | NntpError::Pool(_) => FailureKind::Retryable,
        }
    }

    /// Whether the session that produced this error can no longer be trusted
    pub fn breaks_connection(&self) -> bool {
        matches!(
            self,
            NntpError::Io(_)
                | NntpError::Timeout
                | NntpError::InvalidResponse(_)
                | NntpError::ConnectionClosed
        )
    }
}

/// Job- and article-level posting errors
#[derive(Error, Debug)]
pub enum PostError {
    /// Invalid configuration or request, detected before posting starts
    #[error("configuration error: {0}")]
    Config(String),

    /// Source file could not be opened or read
    #[error("cannot read {}: {source}", .path.display())]
    File {
        /// Path that failed
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Source file has no content
    #[error("{} is empty, nothing to post", .0.display())]
    EmptyFile(PathBuf),

    /// Source data could not be encoded, or changed since it was scanned
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Delivery to a server failed
    #[error("server {server}: {source}")]
    Nntp {
        /// Registry name of the server
        server: String,
        /// Underlying protocol or connection error
        #[source]
        source: NntpError,
    },

    /// Every configured server was disabled before the article could be posted
    #[error("no server available: {0}")]
    NoServerAvailable(String),

    /// The run was cancelled before the article completed
    #[error("interrupted before completion")]
    Interrupted,
}

/// Result type alias using PostError
pub type PostResult<T> = std::result::Result<T, PostError>;
