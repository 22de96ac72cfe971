//! Transport stream: plain TCP or TLS over TCP

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

/// Byte stream underneath an NNTP session
pub(crate) enum NntpStream {
    /// Unencrypted TCP (port 119)
    Plain(TcpStream),
    /// TLS negotiated right after connect (port 563)
    Tls(Box<TlsStream<TcpStream>>),
}

impl NntpStream {
    pub(crate) fn is_tls(&self) -> bool {
        matches!(self, NntpStream::Tls(_))
    }
}

impl AsyncRead for NntpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            NntpStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            NntpStream::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for NntpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            NntpStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            NntpStream::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            NntpStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            NntpStream::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            NntpStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            NntpStream::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}
