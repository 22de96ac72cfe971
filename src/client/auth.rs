//! NNTP authentication support (AUTHINFO USER/PASS, RFC 4643)

use super::NntpConnection;
use super::state::ConnectionState;
use crate::commands;
use crate::error::{NntpError, Result};
use crate::response::codes;
use tracing::debug;

impl NntpConnection {
    /// Authenticate with username and password (AUTHINFO USER/PASS)
    ///
    /// A server configured without a username is used unauthenticated and
    /// this call returns immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - [`NntpError::AuthFailed`] - Credentials rejected (481, 482, 502)
    /// - [`NntpError::Protocol`] - Any other unexpected response (e.g. 400 busy)
    /// - [`NntpError::ConnectionClosed`] - Server closed the connection
    /// - [`NntpError::Timeout`] - Server did not respond in time
    pub async fn authenticate(&mut self) -> Result<()> {
        if self.config.username.is_empty() {
            debug!("No credentials configured for {}, skipping authentication", self.config.address());
            return Ok(());
        }
        if self.state == ConnectionState::Authenticated {
            return Ok(());
        }

        debug!("Authenticating as {}", self.config.username);

        let cmd = commands::authinfo_user(&self.config.username);
        self.send_command(&cmd).await?;
        self.state = ConnectionState::InProgress;

        let mut response = self.read_response().await?;
        if response.code == codes::AUTH_CONTINUE {
            let cmd = commands::authinfo_pass(&self.config.password);
            self.send_command(&cmd).await?;
            response = self.read_response().await?;
        }

        match response.code {
            codes::AUTH_ACCEPTED => {
                self.state = ConnectionState::Authenticated;
                debug!("Authentication successful");
                Ok(())
            }
            codes::AUTH_REJECTED | codes::AUTH_OUT_OF_SEQUENCE | codes::ACCESS_DENIED => {
                self.state = ConnectionState::Ready;
                Err(NntpError::AuthFailed(format!(
                    "{} {}",
                    response.code, response.message
                )))
            }
            code => {
                self.state = ConnectionState::Ready;
                Err(NntpError::Protocol {
                    code,
                    message: response.message,
                })
            }
        }
    }
}
