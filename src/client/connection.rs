//! Connection management for NNTP client
//!
//! This module handles TCP/TLS connection establishment, socket tuning,
//! and server greeting validation.

use crate::config::{ServerConfig, Timeouts};
use crate::error::{NntpError, Result};
use crate::response::codes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::{debug, warn};

use super::NntpConnection;
use super::state::ConnectionState;
use super::stream::NntpStream;

/// BufReader capacity; responses on the posting path are single lines
const BUFREADER_CAPACITY: usize = 16 * 1024;

/// Send buffer for article uploads (4MB)
const SEND_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Receive buffer (256KB)
const RECV_BUFFER_SIZE: usize = 256 * 1024;

/// Dangerous certificate verifier that accepts all certificates
///
/// **Security Warning:** This verifier disables all certificate validation,
/// making connections vulnerable to man-in-the-middle attacks. Only use this
/// for testing or with servers you trust on a secure network.
#[derive(Debug)]
pub(super) struct DangerousAcceptAnyCertificate;

impl ServerCertVerifier for DangerousAcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
            SignatureScheme::ED448,
        ]
    }
}

/// Build the rustls client configuration for a server
fn tls_config(config: &ServerConfig) -> ClientConfig {
    use tokio_rustls::rustls::crypto::{CryptoProvider, ring};
    // Another component may have installed a provider already
    let _ = CryptoProvider::install_default(ring::default_provider());

    if config.allow_insecure_tls {
        warn!(
            server = %config.address(),
            "TLS certificate validation disabled - connection vulnerable to MITM attacks"
        );
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DangerousAcceptAnyCertificate))
            .with_no_client_auth()
    } else {
        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth()
    }
}

/// Open a tuned TCP connection
///
/// `socket2::Socket::connect()` is blocking, so it runs on the blocking pool.
async fn connect_tcp(socket_addr: SocketAddr, timeouts: &Timeouts) -> Result<TcpStream> {
    use socket2::{Domain, Protocol, Socket, Type};

    let domain = if socket_addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // Request/response command pattern
    socket.set_nodelay(true)?;

    if let Err(e) = socket.set_send_buffer_size(SEND_BUFFER_SIZE) {
        warn!(
            "Failed to set send buffer size to {} bytes: {}",
            SEND_BUFFER_SIZE, e
        );
    } else if let Ok(actual_size) = socket.send_buffer_size() {
        debug!(
            "TCP send buffer: requested {} bytes, actual {} bytes",
            SEND_BUFFER_SIZE, actual_size
        );
    }
    if let Err(e) = socket.set_recv_buffer_size(RECV_BUFFER_SIZE) {
        warn!(
            "Failed to set receive buffer size to {} bytes: {}",
            RECV_BUFFER_SIZE, e
        );
    }

    // Connect BEFORE setting non-blocking mode
    let std_stream = timeout(
        timeouts.connect,
        tokio::task::spawn_blocking(move || -> std::io::Result<std::net::TcpStream> {
            socket.connect(&socket_addr.into())?;
            socket.set_nonblocking(true)?;
            Ok(socket.into())
        }),
    )
    .await
    .map_err(|_| NntpError::Timeout)?
    .map_err(|e| NntpError::Io(std::io::Error::other(format!("Task join error: {}", e))))??;

    Ok(TcpStream::from_std(std_stream)?)
}

impl NntpConnection {
    /// Connect to an NNTP server and read its greeting
    ///
    /// TLS is negotiated right after the TCP connection when the server
    /// requires it. Does not authenticate; call
    /// [`authenticate`](Self::authenticate) after connecting.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - [`NntpError::Io`] - TCP connection fails (DNS resolution, refused, unreachable)
    /// - [`NntpError::Tls`] - TLS handshake fails (invalid certificate, protocol error)
    /// - [`NntpError::Timeout`] - Connection, handshake or greeting times out
    /// - [`NntpError::PostingNotPermitted`] - Server greets with 201
    /// - [`NntpError::Protocol`] - Server greets with any other non-200 code
    pub async fn connect(config: Arc<ServerConfig>, timeouts: Timeouts) -> Result<Self> {
        let addr = config.address();
        debug!("Connecting to NNTP server {}", addr);

        let socket_addr = tokio::net::lookup_host(addr.as_str())
            .await
            .map_err(|e| {
                NntpError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("Failed to resolve address {}: {}", addr, e),
                ))
            })?
            .next()
            .ok_or_else(|| {
                NntpError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("No address resolved for {}", addr),
                ))
            })?;

        let tcp_stream = connect_tcp(socket_addr, &timeouts).await?;

        let stream = if config.tls {
            let connector = TlsConnector::from(Arc::new(tls_config(&config)));
            let server_name = ServerName::try_from(config.host.as_str())
                .map_err(|e| NntpError::Tls(format!("Invalid domain: {}", e)))?
                .to_owned();

            let tls_stream = timeout(
                timeouts.tls_handshake,
                connector.connect(server_name, tcp_stream),
            )
            .await
            .map_err(|_| NntpError::Timeout)?
            .map_err(|e| NntpError::Tls(format!("TLS handshake failed: {}", e)))?;
            NntpStream::Tls(Box::new(tls_stream))
        } else {
            NntpStream::Plain(tcp_stream)
        };

        let mut client = Self {
            stream: BufReader::with_capacity(BUFREADER_CAPACITY, stream),
            state: ConnectionState::Ready,
            config,
            timeouts,
            is_broken: false,
            mid_exchange: false,
        };

        let greeting = client.read_response().await?;
        debug!("Server greeting: {} {}", greeting.code, greeting.message);

        match greeting.code {
            codes::READY_POSTING_ALLOWED => Ok(client),
            codes::READY_NO_POSTING => Err(NntpError::PostingNotPermitted),
            code => Err(NntpError::Protocol {
                code,
                message: greeting.message,
            }),
        }
    }
}
