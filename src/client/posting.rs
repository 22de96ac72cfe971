use crate::article::EncodedArticle;
use crate::commands;
use crate::error::{NntpError, Result};
use crate::response::codes;
use std::time::Duration;
use tracing::debug;

use super::NntpConnection;
use super::state::ConnectionState;

/// Deadline for the QUIT exchange
const QUIT_TIMEOUT: Duration = Duration::from_secs(5);

impl NntpConnection {
    /// Post an article to the server (RFC 3977 Section 6.3.1)
    ///
    /// # Two-Phase Protocol
    ///
    /// 1. Client sends POST command
    /// 2. Server responds:
    ///    - 340: Send the article (posting is allowed)
    ///    - 440: Posting not permitted
    /// 3. If 340 received, client sends the dot-stuffed article and ".\r\n"
    /// 4. Server responds:
    ///    - 240: Article posted successfully
    ///    - 441: Posting failed
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - [`NntpError::PostingNotPermitted`] - Server does not allow posting (440)
    /// - [`NntpError::Protocol`] - Any other non-success response, including 441
    /// - [`NntpError::Timeout`] - Server did not respond in time
    /// - [`NntpError::Io`] / [`NntpError::ConnectionClosed`] - Transport failure
    pub async fn post(&mut self, article: &EncodedArticle) -> Result<()> {
        debug!("Posting article {}", article.message_id());

        if !self.state.can_post() {
            return Err(NntpError::Protocol {
                code: codes::AUTH_REQUIRED,
                message: format!("Connection not ready for posting ({:?})", self.state),
            });
        }

        // Stays set if this future is dropped or fails before a full reply
        self.mid_exchange = true;

        // Phase 1: POST
        self.send_command(commands::post()).await?;
        let response = self.read_response().await?;
        self.mid_exchange = false;

        if response.code == codes::POSTING_NOT_PERMITTED {
            return Err(NntpError::PostingNotPermitted);
        }
        if response.code != codes::SEND_ARTICLE {
            return Err(NntpError::Protocol {
                code: response.code,
                message: response.message,
            });
        }

        // Phase 2: article text plus terminator in one write
        let mut wire = article.serialize_for_posting();
        wire.extend_from_slice(commands::TERMINATOR);
        self.mid_exchange = true;
        if let Err(e) = self.write_all(&wire).await {
            // The server may be stuck mid-article
            self.mark_broken();
            return Err(e);
        }

        let response = self.read_response().await?;
        self.mid_exchange = false;
        if response.code != codes::ARTICLE_POSTED {
            return Err(NntpError::Protocol {
                code: response.code,
                message: response.message,
            });
        }

        debug!("Article {} posted", article.message_id());
        Ok(())
    }

    /// Send QUIT and close the session
    ///
    /// Best effort: a failure only means the server went away first. The
    /// connection is marked broken either way so it is never reused.
    pub async fn quit(&mut self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        let result = async {
            self.send_command(commands::quit()).await?;
            let response = self.read_response_with_timeout(QUIT_TIMEOUT).await?;
            if response.code != codes::CLOSING_CONNECTION {
                debug!("Unexpected QUIT response: {} {}", response.code, response.message);
            }
            Ok(())
        }
        .await;

        self.state = ConnectionState::Closed;
        self.mark_broken();
        result
    }
}
