use std::io;
#[cfg(unix)]
use std::path::Path;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

// Tokio, async-std, and std all use this as the default capacity for their buffered I/O.
const DEFAULT_BUF_SIZE: usize = 8192;

/// A bidirectional byte stream the protocol can be spoken over.
///
/// Implemented for every `tokio` stream that is `Unpin + Send + Sync + 'static`, which
/// covers TCP and Unix sockets, TLS streams and `tokio::io::duplex` pipes used in tests.
pub trait Socket: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static {}

impl<S> Socket for S where S: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static {}

pub async fn connect_tcp(host: &str, port: u16) -> io::Result<TcpStream> {
    let stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;

    Ok(stream)
}

#[cfg(unix)]
pub async fn connect_uds(path: impl AsRef<Path>) -> io::Result<tokio::net::UnixStream> {
    tokio::net::UnixStream::connect(path).await
}

/// A socket with a read buffer and a write buffer.
///
/// Reads are cancel-safe: [`fill`](Self::fill) only ever appends to the read buffer and
/// nothing is consumed until the caller asks for it with [`consume`](Self::consume).
/// Dropping a read future halfway therefore never loses bytes.
pub struct BufferedSocket<S> {
    socket: S,
    write_buf: Vec<u8>,
    read_buf: BytesMut,
}

impl<S: Socket> BufferedSocket<S> {
    pub fn new(socket: S) -> Self {
        BufferedSocket {
            socket,
            write_buf: Vec::with_capacity(DEFAULT_BUF_SIZE),
            read_buf: BytesMut::with_capacity(DEFAULT_BUF_SIZE),
        }
    }

    /// Waits until at least `len` bytes are buffered, without consuming any of them.
    pub async fn fill(&mut self, len: usize) -> io::Result<()> {
        while self.read_buf.len() < len {
            self.read_buf.reserve((len - self.read_buf.len()).max(DEFAULT_BUF_SIZE));

            let read = self.socket.read_buf(&mut self.read_buf).await?;

            if read == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "expected to read {} bytes, got {} bytes at EOF",
                        len,
                        self.read_buf.len()
                    ),
                ));
            }
        }

        Ok(())
    }

    /// The bytes currently buffered but not yet consumed.
    pub fn buffered(&self) -> &[u8] {
        &self.read_buf
    }

    /// Removes and returns the first `len` buffered bytes.
    ///
    /// The caller must have observed at least `len` bytes through [`fill`](Self::fill).
    pub fn consume(&mut self, len: usize) -> BytesMut {
        let len = len.min(self.read_buf.len());
        self.read_buf.split_to(len)
    }

    pub async fn read_buffered(&mut self, len: usize) -> io::Result<BytesMut> {
        self.fill(len).await?;

        Ok(self.consume(len))
    }

    pub fn write_buffer_mut(&mut self) -> &mut Vec<u8> {
        &mut self.write_buf
    }

    pub fn write_buffer_is_empty(&self) -> bool {
        self.write_buf.is_empty()
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.write_buf.extend_from_slice(bytes);
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        if !self.write_buf.is_empty() {
            self.socket.write_all(&self.write_buf).await?;
            self.write_buf.clear();
        }

        self.socket.flush().await
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.flush().await?;
        self.socket.shutdown().await
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    pub fn socket_mut(&mut self) -> &mut S {
        &mut self.socket
    }

    pub fn into_inner(self) -> S {
        self.socket
    }

    pub fn boxed(self) -> BufferedSocket<Box<dyn Socket>> {
        BufferedSocket {
            socket: Box::new(self.socket),
            write_buf: self.write_buf,
            read_buf: self.read_buf,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn it_keeps_partial_reads_buffered() -> io::Result<()> {
        let (client, mut server) = tokio::io::duplex(64);
        let mut socket = BufferedSocket::new(client);

        server.write_all(b"\x05\x00\x00").await?;
        server.write_all(b"\x00hello").await?;

        socket.fill(4).await?;
        assert!(socket.buffered().len() >= 4);
        assert_eq!(&socket.buffered()[..3], b"\x05\x00\x00");

        socket.fill(9).await?;
        let header = socket.consume(4);
        let payload = socket.consume(5);

        assert_eq!(&header[..], b"\x05\x00\x00\x00");
        assert_eq!(&payload[..], b"hello");

        Ok(())
    }

    #[tokio::test]
    async fn it_reports_eof() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut socket = BufferedSocket::new(client);

        server.write_all(b"ab").await.unwrap();
        drop(server);

        let err = socket.fill(4).await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(socket.buffered(), b"ab");
    }
}
