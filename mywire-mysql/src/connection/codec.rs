use std::io;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use mywire_core::net::tls::{MaybeTlsStream, TlsConfig};
use mywire_core::net::BufferedSocket;

use crate::connection::compression::{parse_header, Compression, ENVELOPE_HEADER_LEN};
use crate::error::Error;

const PACKET_HEADER_LEN: usize = 4;

/// The largest payload a single packet can carry.
pub(crate) const MAX_PAYLOAD_CHUNK: usize = 0xFF_FF_FF;

/// Upper bound for a reassembled inbound message.
pub(crate) const DEFAULT_MAX_READ: usize = 64 * 1024 * 1024;

/// Packet framing over a buffered, possibly encrypted and possibly compressed socket.
///
/// Owns the packet sequence counter. Reads are cancel-safe: bytes stay buffered until a
/// complete packet is available and partially reassembled messages survive a dropped
/// read future.
pub(crate) struct PacketIo {
    socket: BufferedSocket<MaybeTlsStream>,
    compression: Option<Compression>,
    sequence_id: u8,
    chunk_size: usize,
    max_read: usize,
    max_write: usize,
    read_timeout: Option<Duration>,
    partial: BytesMut,
}

impl PacketIo {
    pub(crate) fn new(socket: MaybeTlsStream) -> Self {
        Self {
            socket: BufferedSocket::new(socket),
            compression: None,
            sequence_id: 0,
            chunk_size: MAX_PAYLOAD_CHUNK,
            max_read: DEFAULT_MAX_READ,
            max_write: usize::MAX,
            read_timeout: None,
            partial: BytesMut::new(),
        }
    }

    pub(crate) fn set_max_write(&mut self, max: usize) {
        self.max_write = max;
    }

    pub(crate) fn set_max_read(&mut self, max: usize) {
        self.max_read = max;
    }

    pub(crate) fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    /// Splits outbound and expects inbound messages at `size` instead of `0xFFFFFF`.
    pub(crate) fn set_chunk_size(&mut self, size: usize) {
        self.chunk_size = size.clamp(1, MAX_PAYLOAD_CHUNK);
    }

    pub(crate) fn sequence_id(&self) -> u8 {
        self.sequence_id
    }

    /// Restarts both sequence counters; called at the start of every command.
    pub(crate) fn reset_sequence(&mut self) {
        self.sequence_id = 0;

        if let Some(compression) = &mut self.compression {
            compression.sequence_id = 0;
        }
    }

    pub(crate) fn enable_compression(&mut self, level: u32) {
        self.compression = Some(Compression::new(level));
    }

    pub(crate) fn is_tls(&self) -> bool {
        self.socket.socket().is_tls()
    }

    pub(crate) fn has_pending_writes(&self) -> bool {
        !self.socket.write_buffer_is_empty()
            || self
                .compression
                .as_ref()
                .is_some_and(|c| !c.outbox.is_empty())
    }

    /// Encrypts the transport in place. Pending writes are flushed first.
    pub(crate) async fn upgrade(&mut self, config: TlsConfig<'_>) -> Result<(), Error> {
        self.flush().await?;
        self.socket.socket_mut().upgrade(config).await
    }

    pub(crate) async fn read_message(&mut self) -> Result<Bytes, Error> {
        match self.read_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.read_message_inner())
                .await
                .map_err(|_| {
                    Error::Io(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "timed out waiting for the server",
                    ))
                })?,

            None => self.read_message_inner().await,
        }
    }

    async fn read_message_inner(&mut self) -> Result<Bytes, Error> {
        loop {
            self.fill_packet(PACKET_HEADER_LEN).await?;

            let header = &self.buffered()[..PACKET_HEADER_LEN];
            let len = u24_le(header);
            let sequence_id = header[3];

            if sequence_id != self.sequence_id {
                return Err(Error::PacketOutOfOrder {
                    expected: self.sequence_id,
                    found: sequence_id,
                });
            }

            let total = self.partial.len() + len;
            if total > self.max_read {
                return Err(Error::PacketTooLarge {
                    len: total,
                    max: self.max_read,
                });
            }

            self.fill_packet(PACKET_HEADER_LEN + len).await?;

            let mut packet = self.consume(PACKET_HEADER_LEN + len);
            packet.advance(PACKET_HEADER_LEN);

            self.sequence_id = sequence_id.wrapping_add(1);

            if len < self.chunk_size {
                if self.partial.is_empty() {
                    return Ok(packet.freeze());
                }

                self.partial.extend_from_slice(&packet);
                return Ok(self.partial.split().freeze());
            }

            // a full chunk means the message continues in the next packet
            self.partial.extend_from_slice(&packet);
        }
    }

    /// Frames `payload` into the write buffer, splitting it into as many packets as needed.
    ///
    /// A payload that is an exact multiple of the chunk size (including an empty one) is
    /// terminated by a zero-length packet. A payload over the write limit is refused with
    /// nothing buffered.
    pub(crate) fn write_message(&mut self, payload: &[u8]) -> Result<(), Error> {
        if payload.len() > self.max_write {
            return Err(Error::MessageTooLarge {
                len: payload.len(),
                max: self.max_write,
            });
        }

        let chunk_size = self.chunk_size;
        let mut sequence_id = self.sequence_id;

        let out = match &mut self.compression {
            Some(compression) => &mut compression.outbox,
            None => self.socket.write_buffer_mut(),
        };

        for chunk in payload.chunks(chunk_size) {
            write_packet(out, chunk, sequence_id);
            sequence_id = sequence_id.wrapping_add(1);
        }

        if payload.len() % chunk_size == 0 {
            write_packet(out, &[], sequence_id);
            sequence_id = sequence_id.wrapping_add(1);
        }

        self.sequence_id = sequence_id;

        Ok(())
    }

    pub(crate) async fn flush(&mut self) -> Result<(), Error> {
        if let Some(compression) = &mut self.compression {
            compression.seal(self.socket.write_buffer_mut())?;
        }

        self.socket.flush().await?;

        Ok(())
    }

    pub(crate) async fn shutdown(&mut self) -> Result<(), Error> {
        self.flush().await?;
        self.socket.shutdown().await?;

        Ok(())
    }

    async fn fill_packet(&mut self, len: usize) -> Result<(), Error> {
        match self.fill(len).await {
            Err(Error::Io(e))
                if e.kind() == io::ErrorKind::UnexpectedEof && !self.buffered().is_empty() =>
            {
                Err(Error::TruncatedPacket {
                    expected: len,
                    actual: self.buffered().len(),
                })
            }

            res => res,
        }
    }

    /// Waits until `len` bytes of plain packet data are buffered.
    async fn fill(&mut self, len: usize) -> Result<(), Error> {
        match &mut self.compression {
            None => self.socket.fill(len).await?,

            Some(compression) => {
                while compression.inbox.len() < len {
                    self.socket.fill(ENVELOPE_HEADER_LEN).await?;

                    let header = parse_header(self.socket.buffered())?;
                    let envelope_len = ENVELOPE_HEADER_LEN + header.compressed_len;

                    self.socket.fill(envelope_len).await?;

                    let envelope = self.socket.consume(envelope_len);
                    compression.open(&envelope)?;
                }
            }
        }

        Ok(())
    }

    fn buffered(&self) -> &[u8] {
        match &self.compression {
            Some(compression) => &compression.inbox,
            None => self.socket.buffered(),
        }
    }

    fn consume(&mut self, len: usize) -> BytesMut {
        match &mut self.compression {
            Some(compression) => {
                let len = len.min(compression.inbox.len());
                compression.inbox.split_to(len)
            }

            None => self.socket.consume(len),
        }
    }
}

fn write_packet(out: &mut Vec<u8>, chunk: &[u8], sequence_id: u8) {
    out.extend_from_slice(&chunk.len().to_le_bytes()[..3]);
    out.push(sequence_id);
    out.extend_from_slice(chunk);
}

fn u24_le(buf: &[u8]) -> usize {
    usize::from(buf[0]) | usize::from(buf[1]) << 8 | usize::from(buf[2]) << 16
}
