use std::io;
use std::mem::replace;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_rustls::client::TlsStream;

use crate::error::Error;
use crate::net::Socket;

mod rustls;

/// X.509 Certificate input, either a file path or a PEM encoded inline certificate(s).
#[derive(Clone, Debug)]
pub enum CertificateInput {
    /// PEM encoded certificate(s)
    Inline(Vec<u8>),
    /// Path to a file containing PEM encoded certificate(s)
    File(PathBuf),
}

impl From<String> for CertificateInput {
    fn from(value: String) -> Self {
        let trimmed = value.trim();
        // Some heuristics according to https://tools.ietf.org/html/rfc7468
        if trimmed.starts_with("-----BEGIN CERTIFICATE-----")
            && trimmed.contains("-----END CERTIFICATE-----")
        {
            CertificateInput::Inline(value.as_bytes().to_vec())
        } else {
            CertificateInput::File(PathBuf::from(value))
        }
    }
}

impl CertificateInput {
    async fn data(&self) -> Result<Vec<u8>, io::Error> {
        match self {
            CertificateInput::Inline(v) => Ok(v.clone()),
            CertificateInput::File(path) => tokio::fs::read(path).await,
        }
    }
}

impl std::fmt::Display for CertificateInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CertificateInput::Inline(v) => write!(f, "{}", String::from_utf8_lossy(v.as_slice())),
            CertificateInput::File(path) => write!(f, "file: {}", path.display()),
        }
    }
}

/// Everything the TLS upgrade needs to know about the peer and how strictly to verify it.
pub struct TlsConfig<'a> {
    pub accept_invalid_certs: bool,
    pub accept_invalid_hostnames: bool,
    pub hostname: &'a str,
    pub root_cert_path: Option<&'a CertificateInput>,
    /// Protocol versions to offer, e.g. `"TLSv1.2"`. Empty means the library defaults.
    pub tls_versions: &'a [String],
}

/// A stream that starts out in plaintext and may be upgraded to TLS in place.
pub enum MaybeTlsStream {
    Raw(Box<dyn Socket>),
    Tls(Box<TlsStream<Box<dyn Socket>>>),
    Upgrading,
}

impl MaybeTlsStream {
    pub fn new(socket: impl Socket) -> Self {
        MaybeTlsStream::Raw(Box::new(socket))
    }

    #[inline]
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Performs the TLS handshake over the current plaintext stream.
    ///
    /// Any buffered writes must have been flushed by the caller. Upgrading a stream that
    /// is already encrypted is a no-op.
    pub async fn upgrade(&mut self, config: TlsConfig<'_>) -> Result<(), Error> {
        let connector = rustls::configure_tls_connector(&config).await?;

        let stream = match replace(self, MaybeTlsStream::Upgrading) {
            MaybeTlsStream::Raw(stream) => stream,

            MaybeTlsStream::Tls(stream) => {
                // ignore upgrade, we are already a TLS connection
                *self = MaybeTlsStream::Tls(stream);
                return Ok(());
            }

            MaybeTlsStream::Upgrading => {
                // we previously failed to upgrade and now hold no connection
                // this should only happen from an internal misuse of this method
                return Err(Error::Io(io::ErrorKind::ConnectionAborted.into()));
            }
        };

        let host = ::rustls::pki_types::ServerName::try_from(config.hostname.to_owned())
            .map_err(Error::tls)?;

        *self = MaybeTlsStream::Tls(Box::new(connector.connect(host, stream).await?));

        Ok(())
    }
}

macro_rules! exec_on_stream {
    ($stream:ident, $fn_name:ident, $($arg:ident),*) => (
        match &mut *$stream {
            MaybeTlsStream::Raw(s) => Pin::new(s).$fn_name($($arg,)*),
            MaybeTlsStream::Tls(s) => Pin::new(s).$fn_name($($arg,)*),

            MaybeTlsStream::Upgrading => Poll::Ready(Err(io::ErrorKind::ConnectionAborted.into())),
        }
    )
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        exec_on_stream!(self, poll_read, cx, buf)
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        exec_on_stream!(self, poll_write, cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        exec_on_stream!(self, poll_flush, cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        exec_on_stream!(self, poll_shutdown, cx)
    }
}
