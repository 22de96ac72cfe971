//! Connection state types for NNTP client

/// NNTP connection state tracking authentication progress
///
/// A session only exists once TCP, TLS and the greeting succeeded, so it
/// starts in `Ready`. Idle and busy are tracked by the pool, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connected and ready for commands (not authenticated)
    Ready,
    /// Authentication in progress (AUTHINFO USER sent, waiting for PASS)
    InProgress,
    /// Successfully authenticated
    Authenticated,
    /// QUIT sent or the server went away
    Closed,
}

impl ConnectionState {
    /// Whether POST may be issued in this state
    pub fn can_post(self) -> bool {
        matches!(self, ConnectionState::Ready | ConnectionState::Authenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_post() {
        assert!(ConnectionState::Ready.can_post());
        assert!(ConnectionState::Authenticated.can_post());
        assert!(!ConnectionState::InProgress.can_post());
        assert!(!ConnectionState::Closed.can_post());
    }
}
