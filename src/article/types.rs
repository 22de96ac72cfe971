//! Article data structures

/// Subject of every article of one job, minus the per-article part counter
///
/// Renders as `[prefix ]base[ [i/n]] - "file name" yEnc (part/total)`.
///
/// # Example
///
/// ```
/// use nntp_poster::article::SubjectTemplate;
///
/// let template = SubjectTemplate {
///     prefix: "[REPOST]".to_string(),
///     base: "Holiday".to_string(),
///     position: Some((2, 5)),
/// };
/// assert_eq!(
///     template.render("beach.jpg", 1, 3),
///     r#"[REPOST] Holiday [2/5] - "beach.jpg" yEnc (1/3)"#
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectTemplate {
    /// Configured prefix, may be empty
    pub prefix: String,
    /// Explicit subject or directory name
    pub base: String,
    /// File position `(i, n)` when several files share the base
    pub position: Option<(usize, usize)>,
}

impl SubjectTemplate {
    /// Subject for one article
    pub fn render(&self, file_name: &str, part: u32, total: u32) -> String {
        let mut subject = String::with_capacity(
            self.prefix.len() + self.base.len() + file_name.len() + 32,
        );
        if !self.prefix.is_empty() {
            subject.push_str(&self.prefix);
            subject.push(' ');
        }
        subject.push_str(&self.base);
        if let Some((index, count)) = self.position {
            subject.push_str(&format!(" [{}/{}]", index, count));
        }
        subject.push_str(&format!(
            " - \"{}\" yEnc ({}/{})",
            file_name, part, total
        ));
        subject
    }
}

/// Headers of one outgoing article (RFC 5536 Section 3.1 plus User-Agent)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleHeaders {
    /// Date: when the article was created
    pub date: String,
    /// From: poster identity
    pub from: String,
    /// Message-ID: unique identifier, including angle brackets
    pub message_id: String,
    /// Newsgroups: target groups
    pub newsgroups: Vec<String>,
    /// Path: transit path, `not-for-mail` on injection
    pub path: String,
    /// Subject
    pub subject: String,
    /// User-Agent: posting software
    pub user_agent: Option<String>,
}

/// An article ready to be posted: headers plus yEnc body
#[derive(Debug, Clone)]
pub struct EncodedArticle {
    /// Article headers
    pub headers: ArticleHeaders,
    /// Encoded body with CRLF line endings, not dot-stuffed
    pub body: Vec<u8>,
}

impl EncodedArticle {
    /// Message-ID of the article
    pub fn message_id(&self) -> &str {
        &self.headers.message_id
    }

    /// Serialize the article for transmission after a 340 response
    ///
    /// Produces CRLF lines, the blank separator line and the dot-stuffed body.
    /// The terminating `.` line is not included.
    ///
    /// # Example
    ///
    /// ```
    /// use nntp_poster::article::ArticleBuilder;
    ///
    /// let article = ArticleBuilder::new()
    ///     .from("poster@example.com")
    ///     .subject("test")
    ///     .newsgroups(vec!["alt.test"])
    ///     .body(b".hidden\r\nline\r\n".to_vec())
    ///     .build()
    ///     .unwrap();
    /// let wire = article.serialize_for_posting();
    /// assert!(wire.ends_with(b"\r\n\r\n..hidden\r\nline\r\n"));
    /// ```
    pub fn serialize_for_posting(&self) -> Vec<u8> {
        let headers = &self.headers;
        let mut result = Vec::with_capacity(512 + self.body.len() + self.body.len() / 64);

        push_header(&mut result, "From", &headers.from);
        push_header(&mut result, "Newsgroups", &headers.newsgroups.join(","));
        push_header(&mut result, "Subject", &headers.subject);
        push_header(&mut result, "Message-ID", &headers.message_id);
        push_header(&mut result, "Date", &headers.date);
        push_header(&mut result, "Path", &headers.path);
        if let Some(user_agent) = &headers.user_agent {
            push_header(&mut result, "User-Agent", user_agent);
        }

        // Blank line separates headers from body
        result.extend_from_slice(b"\r\n");

        let body = self.body.strip_suffix(b"\n").unwrap_or(&self.body);
        if !self.body.is_empty() {
            for line in body.split(|&b| b == b'\n') {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                if line.first() == Some(&b'.') {
                    result.push(b'.');
                }
                result.extend_from_slice(line);
                result.extend_from_slice(b"\r\n");
            }
        }

        result
    }
}

fn push_header(out: &mut Vec<u8>, name: &str, value: &str) {
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(b"\r\n");
}
