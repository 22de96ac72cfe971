//! Article builder for constructing postable articles
//!
//! Pure construction: no network or disk I/O happens here.

use chrono::Utc;
use uuid::Uuid;

use super::types::{ArticleHeaders, EncodedArticle};
use crate::error::{PostError, PostResult};

/// Fallback right-hand side of Message-IDs
pub const DEFAULT_MESSAGE_ID_DOMAIN: &str = "nntp-poster";

/// User-Agent header value
pub const USER_AGENT: &str = concat!("nntp-poster/", env!("CARGO_PKG_VERSION"));

/// Builder for one postable article
///
/// From, Subject and at least one newsgroup are required. Date, Message-ID
/// and Path are filled in by [`build`](Self::build) when left unset; the
/// Message-ID takes its domain from the From address.
///
/// # Example
///
/// ```
/// use nntp_poster::ArticleBuilder;
///
/// let article = ArticleBuilder::new()
///     .from("Poster <poster@example.com>")
///     .subject("holiday \"img001.jpg\" yEnc (1/2)")
///     .newsgroups(vec!["alt.binaries.test"])
///     .body(b"=ybegin part=1 line=128 size=4 name=img001.jpg\r\n".to_vec())
///     .build()
///     .unwrap();
///
/// assert!(article.message_id().ends_with("@example.com>"));
/// assert!(ArticleBuilder::new().subject("no sender").build().is_err());
/// ```
#[must_use]
#[derive(Debug, Clone, Default)]
pub struct ArticleBuilder {
    from: Option<String>,
    subject: Option<String>,
    newsgroups: Vec<String>,
    body: Vec<u8>,
    date: Option<String>,
    message_id: Option<String>,
    path: Option<String>,
    user_agent: Option<String>,
}

impl ArticleBuilder {
    /// Create a new ArticleBuilder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the From header (required)
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Set the Subject header (required)
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set the Newsgroups header (required, at least one newsgroup)
    pub fn newsgroups(mut self, newsgroups: Vec<impl Into<String>>) -> Self {
        self.newsgroups = newsgroups.into_iter().map(|s| s.into()).collect();
        self
    }

    /// Set the encoded article body
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Set the Date header (auto-generated if not provided)
    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    /// Set the Message-ID header (auto-generated if not provided)
    pub fn message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Set the Path header (default: "not-for-mail")
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the User-Agent header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Build the article, validating required fields and generating defaults
    ///
    /// Header values are folded onto one line: CR and LF become spaces.
    ///
    /// # Errors
    ///
    /// [`PostError::Config`] if From, Subject or Newsgroups is missing.
    pub fn build(self) -> PostResult<EncodedArticle> {
        let from = self
            .from
            .filter(|f| !f.trim().is_empty())
            .ok_or_else(|| PostError::Config("From header is required".to_string()))?;
        let subject = self
            .subject
            .ok_or_else(|| PostError::Config("Subject header is required".to_string()))?;
        if self.newsgroups.is_empty() {
            return Err(PostError::Config(
                "At least one newsgroup is required".to_string(),
            ));
        }

        let date = self
            .date
            .unwrap_or_else(|| Utc::now().format("%a, %d %b %Y %H:%M:%S %z").to_string());
        let message_id = self.message_id.unwrap_or_else(|| {
            format!("<{}@{}>", Uuid::new_v4().simple(), message_id_domain(&from))
        });

        let headers = ArticleHeaders {
            date: single_line(date),
            message_id: single_line(message_id),
            newsgroups: self.newsgroups.into_iter().map(single_line).collect(),
            path: single_line(self.path.unwrap_or_else(|| "not-for-mail".to_string())),
            subject: single_line(subject),
            user_agent: self.user_agent.map(single_line),
            from: single_line(from),
        };

        Ok(EncodedArticle {
            headers,
            body: self.body,
        })
    }
}

fn single_line(value: String) -> String {
    if value.contains(['\r', '\n']) {
        value.replace(['\r', '\n'], " ")
    } else {
        value
    }
}

/// Domain part of an address such as `Poster <poster@example.com>`
///
/// Falls back to [`DEFAULT_MESSAGE_ID_DOMAIN`] when the address has none.
pub fn message_id_domain(from: &str) -> &str {
    from.rsplit_once('@')
        .and_then(|(_, domain)| domain.split(['>', ' ', ')']).next())
        .filter(|domain| !domain.is_empty() && !domain.contains('<'))
        .unwrap_or(DEFAULT_MESSAGE_ID_DOMAIN)
}

/// Generate a Message-ID unique across the run and across runs
///
/// Format: `<uuid.job.part@domain>`. The random UUID makes repeated runs of
/// the same job distinct.
pub fn generate_message_id(job: usize, part: u32, domain: &str) -> String {
    format!("<{}.{}.{}@{}>", Uuid::new_v4().simple(), job, part, domain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn header_block(article: &EncodedArticle) -> String {
        let wire = article.serialize_for_posting();
        let text = String::from_utf8_lossy(&wire).into_owned();
        text.split("\r\n\r\n").next().unwrap().to_string()
    }

    #[test]
    fn test_build_minimal() {
        let article = ArticleBuilder::new()
            .from("Poster <poster@example.com>")
            .subject("My Upload - \"a.bin\" yEnc (1/2)")
            .newsgroups(vec!["alt.binaries.test", "alt.binaries.misc"])
            .body(b"body\r\n".to_vec())
            .build()
            .unwrap();

        let headers = header_block(&article);
        assert!(headers.contains("From: Poster <poster@example.com>\r\n"));
        assert!(headers.contains("Newsgroups: alt.binaries.test,alt.binaries.misc\r\n"));
        assert!(headers.contains("Subject: My Upload - \"a.bin\" yEnc (1/2)\r\n"));
        assert!(headers.contains("Path: not-for-mail\r\n"));
        assert!(headers.contains("Date: "));
        assert!(article.message_id().starts_with('<'));
        assert!(article.message_id().ends_with("@example.com>"));
    }

    #[test]
    fn test_build_requires_fields() {
        assert!(
            ArticleBuilder::new()
                .subject("s")
                .newsgroups(vec!["g"])
                .build()
                .is_err()
        );
        assert!(
            ArticleBuilder::new()
                .from("a@b")
                .newsgroups(vec!["g"])
                .build()
                .is_err()
        );
        assert!(
            ArticleBuilder::new()
                .from("a@b")
                .subject("s")
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_header_injection_is_folded() {
        let article = ArticleBuilder::new()
            .from("a@example.com")
            .subject("evil\r\nX-Injected: yes")
            .newsgroups(vec!["alt.test"])
            .build()
            .unwrap();
        assert_eq!(article.headers.subject, "evil  X-Injected: yes");
        assert!(!header_block(&article).contains("\r\nX-Injected"));
    }

    #[test]
    fn test_body_dot_stuffing() {
        let article = ArticleBuilder::new()
            .from("a@example.com")
            .subject("s")
            .newsgroups(vec!["alt.test"])
            .body(b"first\r\n.\r\n..two\r\nlast".to_vec())
            .build()
            .unwrap();
        let wire = article.serialize_for_posting();
        assert!(wire.ends_with(b"\r\n\r\nfirst\r\n..\r\n...two\r\nlast\r\n"));
    }

    #[test]
    fn test_message_id_domain() {
        assert_eq!(message_id_domain("Poster <poster@example.com>"), "example.com");
        assert_eq!(message_id_domain("poster@news.example.org"), "news.example.org");
        assert_eq!(message_id_domain("poster@example.com (Poster)"), "example.com");
        assert_eq!(message_id_domain("Anonymous"), DEFAULT_MESSAGE_ID_DOMAIN);
        assert_eq!(message_id_domain("broken@"), DEFAULT_MESSAGE_ID_DOMAIN);
    }

    #[test]
    fn test_generate_message_id_unique() {
        let ids: HashSet<String> = (0..1000)
            .map(|i| generate_message_id(i % 3, (i % 7) as u32 + 1, "example.com"))
            .collect();
        assert_eq!(ids.len(), 1000);

        let id = generate_message_id(4, 12, "example.com");
        assert!(id.starts_with('<') && id.ends_with(".4.12@example.com>"));
    }

    #[test]
    fn test_user_agent_header() {
        let article = ArticleBuilder::new()
            .from("a@example.com")
            .subject("s")
            .newsgroups(vec!["alt.test"])
            .user_agent(USER_AGENT)
            .build()
            .unwrap();
        assert!(header_block(&article).contains("User-Agent: nntp-poster/"));
    }
}
