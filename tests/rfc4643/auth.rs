//! RFC 4643 Section 2.3 - AUTHINFO USER/PASS
//!
//! 381 asks for the password, 281 accepts, 481/482/502 reject. A rejected
//! session is left unauthenticated.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::common::{Behavior, MockServer, fast_timeouts};
use nntp_poster::article::ArticleBuilder;
use nntp_poster::{
    ConnectionState, FailureKind, NntpConnection, NntpError, ResponsePolicy, ServerConfig,
    ServerPool,
};

fn strict() -> Behavior {
    Behavior {
        credentials: Some(("alice".to_string(), "secret".to_string())),
        ..Default::default()
    }
}

fn credentials(server: &MockServer, user: &str, pass: &str) -> Arc<ServerConfig> {
    Arc::new(ServerConfig::new(
        "127.0.0.1",
        server.addr.port(),
        false,
        user,
        pass,
    ))
}

#[tokio::test]
async fn test_auth_accepted() {
    let server = MockServer::start(strict()).await;
    let mut conn = NntpConnection::connect(credentials(&server, "alice", "secret"), fast_timeouts())
        .await
        .unwrap();

    conn.authenticate().await.unwrap();
    assert!(conn.is_authenticated());
    assert_eq!(conn.state(), ConnectionState::Authenticated);

    // Already authenticated: nothing is sent again
    conn.authenticate().await.unwrap();
    assert_eq!(server.stats.auth_attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_auth_rejected_481() {
    let server = MockServer::start(strict()).await;
    let mut conn = NntpConnection::connect(credentials(&server, "alice", "wrong"), fast_timeouts())
        .await
        .unwrap();

    let err = conn.authenticate().await.unwrap_err();
    match &err {
        NntpError::AuthFailed(msg) => assert!(msg.starts_with("481")),
        other => panic!("expected AuthFailed, got {:?}", other),
    }
    assert_eq!(conn.state(), ConnectionState::Ready);
    assert_eq!(
        err.failure_kind(&ResponsePolicy::default()),
        FailureKind::ServerFatal
    );
}

#[tokio::test]
async fn test_no_username_skips_auth() {
    let server = MockServer::start(Behavior::default()).await;
    let mut conn = NntpConnection::connect(credentials(&server, "", ""), fast_timeouts())
        .await
        .unwrap();

    conn.authenticate().await.unwrap();
    assert!(!conn.is_authenticated());
    assert_eq!(conn.state(), ConnectionState::Ready);
    assert_eq!(server.stats.auth_attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_post_without_auth_gets_480() {
    let server = MockServer::start(strict()).await;
    let mut conn = NntpConnection::connect(credentials(&server, "", ""), fast_timeouts())
        .await
        .unwrap();
    conn.authenticate().await.unwrap();

    let article = ArticleBuilder::new()
        .from("poster@example.com")
        .subject("needs auth")
        .newsgroups(vec!["alt.test"])
        .body(b"body\r\n".to_vec())
        .build()
        .unwrap();

    let err = conn.post(&article).await.unwrap_err();
    assert!(matches!(err, NntpError::Protocol { code: 480, .. }));
    assert_eq!(
        err.failure_kind(&ResponsePolicy::default()),
        FailureKind::ServerFatal
    );
}

#[tokio::test]
async fn test_pool_sessions_are_authenticated() {
    let server = MockServer::start(strict()).await;
    let config = ServerConfig::new("127.0.0.1", server.addr.port(), false, "alice", "secret")
        .with_connections(2);
    let pool = ServerPool::new("strict", config, fast_timeouts());

    let session = pool.acquire().await.unwrap();
    assert!(session.is_authenticated());
    assert_eq!(pool.connections_in_use(), 1);
}

#[tokio::test]
async fn test_pool_surfaces_auth_failure() {
    let server = MockServer::start(strict()).await;
    let config = ServerConfig::new("127.0.0.1", server.addr.port(), false, "alice", "nope");
    let pool = ServerPool::new("strict", config, fast_timeouts());

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, NntpError::AuthFailed(_)));
}

#[tokio::test]
async fn test_pool_ignores_errors_of_abandoned_attempts() {
    let server = MockServer::start(Behavior {
        greeting_delay: Duration::from_millis(100),
        reject_auth_first: 1,
        ..Default::default()
    })
    .await;
    let config = ServerConfig::new("127.0.0.1", server.addr.port(), false, "alice", "secret")
        .with_connections(2);
    let pool = ServerPool::new("flaky", config, fast_timeouts());

    // The caller gives up while the first attempt is still connecting
    let abandoned = tokio::time::timeout(Duration::from_millis(20), pool.acquire()).await;
    assert!(abandoned.is_err());

    // Let that attempt get its 481 and report it to nobody
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(server.stats.auth_attempts.load(Ordering::SeqCst), 1);

    // The server accepts from now on; old errors must not leak into new checkouts
    for _ in 0..2 {
        let session = pool.acquire().await.unwrap();
        assert!(session.is_authenticated());
    }
    assert_eq!(server.stats.auth_attempts.load(Ordering::SeqCst), 2);
}
