//! The compressed protocol envelope.
//!
//! Once `COMPRESS` is negotiated every group of plain packets travels inside a 7 byte
//! envelope: compressed length (3), sequence id (1) and uncompressed length (3). An
//! uncompressed length of zero means the payload was sent as-is.
//!
//! <https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_basic_compression.html>

use std::io::Write;

use bytes::BytesMut;
use flate2::write::ZlibEncoder;
use flate2::{Decompress, FlushDecompress, Status};

use crate::error::Error;

pub(crate) const ENVELOPE_HEADER_LEN: usize = 7;

/// Payloads shorter than this are not worth deflating and are sent verbatim.
pub(crate) const MIN_COMPRESS_LENGTH: usize = 50;

const MAX_ENVELOPE_PAYLOAD: usize = 0xFF_FF_FF;

/// The zlib level used when none is configured.
pub(crate) const DEFAULT_LEVEL: u32 = 6;

/// Compression state of one connection.
///
/// Inbound envelopes are inflated into `inbox` where the packet codec picks them up;
/// outbound packets accumulate in `outbox` until the next flush wraps them.
#[derive(Debug)]
pub(crate) struct Compression {
    level: u32,
    /// The compressed sequence counter, independent of the packet sequence.
    pub(crate) sequence_id: u8,
    pub(crate) inbox: BytesMut,
    pub(crate) outbox: Vec<u8>,
}

impl Compression {
    pub(crate) fn new(level: u32) -> Self {
        Self {
            level: level.min(9),
            sequence_id: 0,
            inbox: BytesMut::new(),
            outbox: Vec::new(),
        }
    }

    /// Wraps everything in the outbox into envelopes appended to `out`.
    pub(crate) fn seal(&mut self, out: &mut Vec<u8>) -> Result<(), Error> {
        if self.outbox.is_empty() {
            return Ok(());
        }

        let outbox = std::mem::take(&mut self.outbox);

        for chunk in outbox.chunks(MAX_ENVELOPE_PAYLOAD) {
            write_envelope(out, chunk, self.sequence_id, self.level)?;
            self.sequence_id = self.sequence_id.wrapping_add(1);
        }

        // keep the allocation around for the next command
        self.outbox = outbox;
        self.outbox.clear();

        Ok(())
    }

    /// Accepts one complete envelope read off the socket.
    pub(crate) fn open(&mut self, envelope: &[u8]) -> Result<(), Error> {
        let header = parse_header(envelope)?;

        if header.sequence_id != self.sequence_id {
            return Err(Error::PacketOutOfOrder {
                expected: self.sequence_id,
                found: header.sequence_id,
            });
        }

        let body = &envelope[ENVELOPE_HEADER_LEN..];
        if body.len() != header.compressed_len {
            return Err(Error::TruncatedPacket {
                expected: header.compressed_len,
                actual: body.len(),
            });
        }

        if header.uncompressed_len == 0 {
            self.inbox.extend_from_slice(body);
        } else {
            let inflated = inflate(body, header.uncompressed_len)?;
            self.inbox.extend_from_slice(&inflated);
        }

        self.sequence_id = header.sequence_id.wrapping_add(1);

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct EnvelopeHeader {
    pub(crate) compressed_len: usize,
    pub(crate) sequence_id: u8,
    pub(crate) uncompressed_len: usize,
}

pub(crate) fn parse_header(buf: &[u8]) -> Result<EnvelopeHeader, Error> {
    if buf.len() < ENVELOPE_HEADER_LEN {
        return Err(Error::TruncatedPacket {
            expected: ENVELOPE_HEADER_LEN,
            actual: buf.len(),
        });
    }

    Ok(EnvelopeHeader {
        compressed_len: u24_le(&buf[..3]),
        sequence_id: buf[3],
        uncompressed_len: u24_le(&buf[4..7]),
    })
}

fn u24_le(buf: &[u8]) -> usize {
    usize::from(buf[0]) | usize::from(buf[1]) << 8 | usize::from(buf[2]) << 16
}

fn write_envelope(
    out: &mut Vec<u8>,
    chunk: &[u8],
    sequence_id: u8,
    level: u32,
) -> Result<(), Error> {
    if chunk.len() < MIN_COMPRESS_LENGTH {
        out.extend_from_slice(&chunk.len().to_le_bytes()[..3]);
        out.push(sequence_id);
        out.extend_from_slice(&[0, 0, 0]);
        out.extend_from_slice(chunk);

        return Ok(());
    }

    let mut encoder = ZlibEncoder::new(
        Vec::with_capacity(chunk.len() / 2),
        flate2::Compression::new(level),
    );
    encoder.write_all(chunk)?;
    let compressed = encoder.finish()?;

    out.extend_from_slice(&compressed.len().to_le_bytes()[..3]);
    out.push(sequence_id);
    out.extend_from_slice(&chunk.len().to_le_bytes()[..3]);
    out.extend_from_slice(&compressed);

    Ok(())
}

fn inflate(input: &[u8], expected: usize) -> Result<Vec<u8>, Error> {
    let mut decoder = Decompress::new(true);

    // one spare byte so an oversized payload shows up as a length mismatch
    let mut output = Vec::with_capacity(expected + 1);

    let status = decoder
        .decompress_vec(input, &mut output, FlushDecompress::Finish)
        .map_err(|e| err_protocol!("failed to inflate compressed packet: {}", e))?;

    if status != Status::StreamEnd || output.len() != expected {
        return Err(err_protocol!(
            "compressed packet inflated to {} bytes, header announced {}",
            output.len(),
            expected
        ));
    }

    Ok(output)
}
