//! In-process mock NNTP server for integration tests
//!
//! Speaks just enough RFC 3977 / RFC 4643 for the posting path: greeting,
//! AUTHINFO USER/PASS, POST and QUIT. Every accepted article is recorded
//! (dot-unstuffed) so tests can decode and compare it.

#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nntp_poster::{
    Config, PostingConfig, RetryConfig, ServerConfig, ServerRegistry, Timeouts,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// How the mock server behaves
#[derive(Debug, Clone)]
pub struct Behavior {
    /// Greeting code
    pub greeting: u16,
    /// Required credentials; `None` accepts posts without AUTHINFO
    pub credentials: Option<(String, String)>,
    /// Reply to POST instead of 340 (e.g. 440)
    pub post_reply: Option<u16>,
    /// Reply to the first `fail_first` articles with `failure_code`
    pub fail_first: usize,
    /// Code for failed articles
    pub failure_code: u16,
    /// Hold every article this long before answering
    pub delay: Duration,
    /// Wait this long before sending the greeting
    pub greeting_delay: Duration,
    /// Answer the first `reject_auth_first` AUTHINFO PASS with 481
    pub reject_auth_first: usize,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            greeting: 200,
            credentials: None,
            post_reply: None,
            fail_first: 0,
            failure_code: 441,
            delay: Duration::ZERO,
            greeting_delay: Duration::ZERO,
            reject_auth_first: 0,
        }
    }
}

/// An article the server accepted
#[derive(Debug, Clone)]
pub struct ReceivedArticle {
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ReceivedArticle {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn subject(&self) -> &str {
        self.header("Subject").unwrap_or_default()
    }

    pub fn message_id(&self) -> &str {
        self.header("Message-ID").unwrap_or_default()
    }
}

#[derive(Debug, Default)]
pub struct Stats {
    pub articles: Mutex<Vec<ReceivedArticle>>,
    pub connections: AtomicUsize,
    pub auth_attempts: AtomicUsize,
    pub posts_received: AtomicUsize,
    pub failures_sent: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub quits: AtomicUsize,
}

/// A running mock server
pub struct MockServer {
    pub addr: SocketAddr,
    pub stats: Arc<Stats>,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub async fn start(behavior: Behavior) -> Self {
        Self::start_shared(behavior, Arc::new(Stats::default())).await
    }

    /// Start a server that counts into `stats`, possibly shared with others
    pub async fn start_shared(behavior: Behavior, stats: Arc<Stats>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let behavior = Arc::new(behavior);

        let handle = {
            let stats = stats.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((socket, _)) = listener.accept().await else {
                        break;
                    };
                    stats.connections.fetch_add(1, Ordering::SeqCst);
                    let stats = stats.clone();
                    let behavior = behavior.clone();
                    tokio::spawn(async move {
                        let _ = serve(socket, &behavior, &stats).await;
                    });
                }
            })
        };

        Self {
            addr,
            stats,
            handle,
        }
    }

    /// Server config pointing at this mock
    pub fn server_config(&self, connections: u32) -> ServerConfig {
        ServerConfig::new("127.0.0.1", self.addr.port(), false, "", "")
            .with_connections(connections)
    }

    pub fn articles(&self) -> Vec<ReceivedArticle> {
        self.stats.articles.lock().unwrap().clone()
    }

    pub fn message_ids(&self) -> HashSet<String> {
        self.articles()
            .iter()
            .map(|a| a.message_id().to_string())
            .collect()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(socket: TcpStream, behavior: &Behavior, stats: &Stats) -> std::io::Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);

    if !behavior.greeting_delay.is_zero() {
        tokio::time::sleep(behavior.greeting_delay).await;
    }
    let greeting = match behavior.greeting {
        200 => "200 mock server ready, posting allowed".to_string(),
        code => format!("{} mock server not available", code),
    };
    reply(&mut writer, &greeting).await?;

    let mut user: Option<String> = None;
    let mut authenticated = behavior.credentials.is_none();
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(());
        }
        let command = String::from_utf8_lossy(&line).trim_end().to_string();
        let upper = command.to_ascii_uppercase();

        if upper.starts_with("AUTHINFO USER ") {
            stats.auth_attempts.fetch_add(1, Ordering::SeqCst);
            user = Some(command[14..].to_string());
            reply(&mut writer, "381 password required").await?;
        } else if upper.starts_with("AUTHINFO PASS ") {
            let pass = &command[14..];
            let rejected =
                stats.auth_attempts.load(Ordering::SeqCst) <= behavior.reject_auth_first;
            let ok = !rejected
                && match (&behavior.credentials, &user) {
                    (Some((u, p)), Some(given)) => u == given && p == pass,
                    (None, _) => true,
                    _ => false,
                };
            if ok {
                authenticated = true;
                reply(&mut writer, "281 authentication accepted").await?;
            } else {
                reply(&mut writer, "481 authentication failed").await?;
            }
        } else if upper == "POST" {
            if !authenticated {
                reply(&mut writer, "480 authentication required").await?;
                continue;
            }
            if let Some(code) = behavior.post_reply {
                reply(&mut writer, &format!("{} posting not permitted", code)).await?;
                continue;
            }
            reply(&mut writer, "340 send article").await?;

            let current = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            stats.max_in_flight.fetch_max(current, Ordering::SeqCst);

            let article = read_article(&mut reader).await?;
            if !behavior.delay.is_zero() {
                tokio::time::sleep(behavior.delay).await;
            }

            let attempt = stats.posts_received.fetch_add(1, Ordering::SeqCst);
            let response = if attempt < behavior.fail_first {
                stats.failures_sent.fetch_add(1, Ordering::SeqCst);
                format!("{} posting failed", behavior.failure_code)
            } else {
                stats.articles.lock().unwrap().push(article);
                "240 article received".to_string()
            };
            stats.in_flight.fetch_sub(1, Ordering::SeqCst);
            reply(&mut writer, &response).await?;
        } else if upper == "QUIT" {
            stats.quits.fetch_add(1, Ordering::SeqCst);
            reply(&mut writer, "205 bye").await?;
            return Ok(());
        } else {
            reply(&mut writer, "500 unknown command").await?;
        }
    }
}

async fn reply(writer: &mut tokio::net::tcp::OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await
}

/// Read a dot-terminated article and undo dot-stuffing
async fn read_article(
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
) -> std::io::Result<ReceivedArticle> {
    let mut headers = Vec::new();
    let mut body = Vec::new();
    let mut in_body = false;
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        if line == b".\r\n" {
            break;
        }
        let content: &[u8] = if line.starts_with(b"..") {
            &line[1..]
        } else {
            &line
        };

        if in_body {
            body.extend_from_slice(content);
        } else if content == b"\r\n" {
            in_body = true;
        } else {
            let text = String::from_utf8_lossy(content);
            if let Some((name, value)) = text.trim_end().split_once(": ") {
                headers.push((name.to_string(), value.to_string()));
            }
        }
    }

    Ok(ReceivedArticle { headers, body })
}

/// Fast retry settings so failure tests finish quickly
pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_backoff_ms: 10,
        max_backoff_ms: 50,
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

/// Short network deadlines for tests
pub fn fast_timeouts() -> Timeouts {
    Timeouts {
        connect: Duration::from_secs(5),
        tls_handshake: Duration::from_secs(5),
        response: Duration::from_secs(5),
        write: Duration::from_secs(5),
        idle: Duration::from_secs(30),
    }
}

/// Config posting to the given servers with fast retries
pub fn config_for(servers: Vec<(&str, ServerConfig)>) -> Config {
    let registry: ServerRegistry = servers
        .into_iter()
        .map(|(name, server)| (name.to_string(), server))
        .collect();
    let mut config = Config::new(
        PostingConfig::new("Poster <poster@example.com>", "alt.binaries.test"),
        registry,
    );
    config.retry = fast_retry(3);
    config.timeouts = fast_timeouts();
    config.shutdown_grace = Duration::from_secs(2);
    config
}

/// Deterministic test data
pub fn test_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + 7) % 256) as u8).collect()
}

/// Write a file with deterministic content into `dir`
pub fn write_file(dir: &std::path::Path, name: &str, len: usize) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, test_data(len)).unwrap();
    path
}

/// Decode the articles of one file (by yEnc name) in part order
pub fn reassemble(articles: &[ReceivedArticle], name: &str) -> Vec<u8> {
    let mut parts: Vec<(u32, Vec<u8>)> = articles
        .iter()
        .filter_map(|a| nntp_poster::yenc_decode(&a.body).ok())
        .filter(|d| d.header.name == name)
        .map(|d| {
            assert!(d.verify_crc32(), "part CRC mismatch for {}", name);
            (d.header.part.unwrap_or(1), d.data)
        })
        .collect();
    parts.sort_by_key(|(part, _)| *part);
    parts.dedup_by_key(|(part, _)| *part);
    parts.into_iter().flat_map(|(_, data)| data).collect()
}

/// Install a tracing subscriber once, honoring RUST_LOG
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
