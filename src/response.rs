//! NNTP response types, status codes and failure classification

use crate::error::FailureKind;

/// Single-line NNTP response
#[derive(Debug, Clone)]
pub struct NntpResponse {
    /// 3-digit NNTP response code
    pub code: u16,
    /// Status message from server
    pub message: String,
}

impl NntpResponse {
    /// Check if response indicates success (2xx)
    pub fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// Check if response indicates continuation (3xx)
    pub fn is_continuation(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// Check if response indicates error (4xx or 5xx)
    pub fn is_error(&self) -> bool {
        self.code >= 400
    }
}

/// NNTP response codes used on the posting path (RFC 3977, RFC 4643)
pub mod codes {
    /// Server ready, posting allowed
    pub const READY_POSTING_ALLOWED: u16 = 200;
    /// Server ready, no posting
    pub const READY_NO_POSTING: u16 = 201;
    /// Closing connection
    pub const CLOSING_CONNECTION: u16 = 205;
    /// Article posted successfully (RFC 3977 Section 6.3.1)
    pub const ARTICLE_POSTED: u16 = 240;
    /// Authentication accepted
    pub const AUTH_ACCEPTED: u16 = 281;

    /// Send article to be posted
    pub const SEND_ARTICLE: u16 = 340;
    /// Continue with authentication
    pub const AUTH_CONTINUE: u16 = 381;

    /// Service temporarily unavailable
    pub const SERVICE_UNAVAILABLE: u16 = 400;
    /// Internal fault or server resource problem
    pub const INTERNAL_FAULT: u16 = 403;
    /// Transfer not possible; try again later
    pub const TRANSFER_NOT_POSSIBLE: u16 = 436;
    /// Posting not permitted (RFC 3977 Section 6.3.1)
    pub const POSTING_NOT_PERMITTED: u16 = 440;
    /// Posting failed (RFC 3977 Section 6.3.1)
    pub const POSTING_FAILED: u16 = 441;
    /// Authentication required (RFC 4643)
    pub const AUTH_REQUIRED: u16 = 480;
    /// Authentication rejected
    pub const AUTH_REJECTED: u16 = 481;
    /// Authentication out of sequence
    pub const AUTH_OUT_OF_SEQUENCE: u16 = 482;
    /// Encryption or authentication required (RFC 4643)
    pub const ENCRYPTION_REQUIRED: u16 = 483;

    /// Access denied / command unavailable
    pub const ACCESS_DENIED: u16 = 502;
}

/// Classification of server failure responses
///
/// Servers disagree on which codes mean "try later" and which mean "never",
/// so the mapping is data. Codes listed in none of the sets are retryable.
///
/// # Example
///
/// ```
/// use nntp_poster::{FailureKind, ResponsePolicy};
///
/// let mut policy = ResponsePolicy::default();
/// assert_eq!(policy.classify(441), FailureKind::Rejected);
///
/// // This provider answers 441 for transient spool problems
/// policy.retryable.push(441);
/// assert_eq!(policy.classify(441), FailureKind::Retryable);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ResponsePolicy {
    /// Codes that refuse the content; the article is not retried
    pub rejected: Vec<u16>,
    /// Codes that disable the whole server (authorization problems)
    pub server_fatal: Vec<u16>,
    /// Codes that are explicitly transient
    pub retryable: Vec<u16>,
}

impl Default for ResponsePolicy {
    fn default() -> Self {
        Self {
            rejected: vec![codes::POSTING_FAILED],
            server_fatal: vec![
                codes::POSTING_NOT_PERMITTED,
                codes::AUTH_REQUIRED,
                codes::AUTH_REJECTED,
                codes::AUTH_OUT_OF_SEQUENCE,
                codes::ENCRYPTION_REQUIRED,
                codes::ACCESS_DENIED,
            ],
            retryable: vec![
                codes::SERVICE_UNAVAILABLE,
                codes::INTERNAL_FAULT,
                codes::TRANSFER_NOT_POSSIBLE,
            ],
        }
    }
}

impl ResponsePolicy {
    /// Classify a failure response code
    ///
    /// Server-fatal wins over retryable, retryable over rejected.
    pub fn classify(&self, code: u16) -> FailureKind {
        if self.server_fatal.contains(&code) {
            FailureKind::ServerFatal
        } else if self.retryable.contains(&code) || !self.rejected.contains(&code) {
            FailureKind::Retryable
        } else {
            FailureKind::Rejected
        }
    }
}
