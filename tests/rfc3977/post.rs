//! RFC 3977 Section 6.3.1 - POST
//!
//! Two-phase exchange: POST, 340, article and terminator, then 240/441.
//! The greeting rules of Section 5.1.1 decide whether posting is possible.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::common::{Behavior, MockServer, fast_timeouts};
use nntp_poster::article::ArticleBuilder;
use nntp_poster::{
    ConnectionState, EncodedArticle, NntpConnection, NntpError, ServerConfig, ServerPool,
};

fn article(body: &[u8]) -> EncodedArticle {
    ArticleBuilder::new()
        .from("Poster <poster@example.com>")
        .subject("test \"a.bin\" yEnc (1/1)")
        .newsgroups(vec!["alt.binaries.test"])
        .body(body.to_vec())
        .build()
        .unwrap()
}

async fn connect(server: &MockServer) -> nntp_poster::Result<NntpConnection> {
    NntpConnection::connect(Arc::new(server.server_config(1)), fast_timeouts()).await
}

#[tokio::test]
async fn test_post_accepted_with_dot_stuffing() {
    let server = MockServer::start(Behavior::default()).await;
    let mut conn = connect(&server).await.unwrap();
    assert_eq!(conn.state(), ConnectionState::Ready);
    assert!(!conn.is_tls());

    let body = b"first line\r\n.leading dot\r\n..two dots\r\n.\r\nlast\r\n";
    let article = article(body);
    conn.post(&article).await.unwrap();

    let received = server.articles();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].body, body);
    assert_eq!(received[0].message_id(), article.message_id());
    assert_eq!(received[0].header("Newsgroups"), Some("alt.binaries.test"));
    assert!(!conn.is_broken());
}

#[tokio::test]
async fn test_session_reused_for_several_posts() {
    let server = MockServer::start(Behavior::default()).await;
    let mut conn = connect(&server).await.unwrap();

    for i in 0..3 {
        conn.post(&article(format!("part {}\r\n", i).as_bytes()))
            .await
            .unwrap();
    }

    assert_eq!(server.articles().len(), 3);
    assert_eq!(server.stats.connections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_post_440_not_permitted() {
    let server = MockServer::start(Behavior {
        post_reply: Some(440),
        ..Default::default()
    })
    .await;
    let mut conn = connect(&server).await.unwrap();

    let err = conn.post(&article(b"data\r\n")).await.unwrap_err();
    assert!(matches!(err, NntpError::PostingNotPermitted));
    assert!(!err.breaks_connection());
}

#[tokio::test]
async fn test_post_441_failed() {
    let server = MockServer::start(Behavior {
        fail_first: 1,
        failure_code: 441,
        ..Default::default()
    })
    .await;
    let mut conn = connect(&server).await.unwrap();

    let err = conn.post(&article(b"data\r\n")).await.unwrap_err();
    assert!(matches!(err, NntpError::Protocol { code: 441, .. }));

    // The session stays in sync after a failed article
    conn.post(&article(b"again\r\n")).await.unwrap();
    assert_eq!(server.articles().len(), 1);
}

#[tokio::test]
async fn test_post_cancelled_before_reply_breaks_session() {
    let server = MockServer::start(Behavior {
        delay: Duration::from_millis(500),
        ..Default::default()
    })
    .await;
    let mut conn = connect(&server).await.unwrap();

    let cancelled =
        tokio::time::timeout(Duration::from_millis(50), conn.post(&article(b"slow\r\n"))).await;
    assert!(cancelled.is_err());
    assert!(conn.is_broken(), "240 may still arrive on this session");
}

#[tokio::test]
async fn test_pool_discards_session_cancelled_mid_post() {
    let server = MockServer::start(Behavior {
        delay: Duration::from_millis(500),
        ..Default::default()
    })
    .await;
    let pool = ServerPool::new("slow", server.server_config(1), fast_timeouts());

    {
        let mut session = pool.acquire().await.unwrap();
        let cancelled =
            tokio::time::timeout(Duration::from_millis(50), session.post(&article(b"a\r\n")))
                .await;
        assert!(cancelled.is_err());
    }
    assert_eq!(pool.state().connections, 0);

    // A fresh session is opened instead of the half-finished one
    let mut session = pool.acquire().await.unwrap();
    session.post(&article(b"b\r\n")).await.unwrap();
    assert_eq!(server.stats.connections.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_greeting_201_refuses_posting() {
    let server = MockServer::start(Behavior {
        greeting: 201,
        ..Default::default()
    })
    .await;

    let err = connect(&server).await.unwrap_err();
    assert!(matches!(err, NntpError::PostingNotPermitted));
}

#[tokio::test]
async fn test_greeting_400_is_protocol_error() {
    let server = MockServer::start(Behavior {
        greeting: 400,
        ..Default::default()
    })
    .await;

    let err = connect(&server).await.unwrap_err();
    assert!(matches!(err, NntpError::Protocol { code: 400, .. }));
}

#[tokio::test]
async fn test_connection_refused_is_io_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = ServerConfig::new("127.0.0.1", port, false, "", "");

    let err = NntpConnection::connect(Arc::new(config), fast_timeouts())
        .await
        .unwrap_err();
    assert!(matches!(err, NntpError::Io(_)));
}

#[tokio::test]
async fn test_quit_closes_session() {
    let server = MockServer::start(Behavior::default()).await;
    let mut conn = connect(&server).await.unwrap();

    conn.quit().await.unwrap();
    assert_eq!(conn.state(), ConnectionState::Closed);
    assert!(conn.is_broken());
    assert_eq!(server.stats.quits.load(Ordering::SeqCst), 1);

    let err = conn.post(&article(b"late\r\n")).await.unwrap_err();
    assert!(matches!(err, NntpError::Protocol { code: 480, .. }));
}
