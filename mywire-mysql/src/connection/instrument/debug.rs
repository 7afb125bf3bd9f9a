use std::collections::VecDeque;
use std::fmt::Write;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_core::future::BoxFuture;

use super::{lock, Layer, PacketReader, PacketWriter, PACKET_TARGET};
use crate::connection::codec::PacketIo;
use crate::error::Error;

/// Bytes of each payload kept in the log.
const KEPT_BYTES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Sent,
    Received,
}

#[derive(Debug)]
struct LoggedPacket {
    direction: Direction,
    len: usize,
    head: Bytes,
}

/// Ring buffer of the most recent packets, oldest first.
#[derive(Debug)]
pub(crate) struct PacketLog {
    capacity: usize,
    packets: VecDeque<LoggedPacket>,
}

impl PacketLog {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            packets: VecDeque::with_capacity(capacity),
        }
    }

    pub(crate) fn resize(&mut self, capacity: usize) {
        self.capacity = capacity;

        while self.packets.len() > capacity {
            self.packets.pop_front();
        }
    }

    fn push(&mut self, direction: Direction, payload: &[u8]) {
        if self.capacity == 0 {
            return;
        }

        if self.packets.len() == self.capacity {
            self.packets.pop_front();
        }

        self.packets.push_back(LoggedPacket {
            direction,
            len: payload.len(),
            head: Bytes::copy_from_slice(&payload[..payload.len().min(KEPT_BYTES)]),
        });
    }

    /// One line per packet: direction, full length and a hex prefix of the payload.
    pub(crate) fn dump(&self) -> String {
        let mut out = String::new();

        for packet in &self.packets {
            let arrow = match packet.direction {
                Direction::Sent => "->",
                Direction::Received => "<-",
            };

            let _ = write!(out, "{arrow} {:>8} bytes:", packet.len);

            for byte in &packet.head {
                let _ = write!(out, " {byte:02x}");
            }

            if packet.len > packet.head.len() {
                out.push_str(" ..");
            }

            out.push('\n');
        }

        out
    }
}

fn is_desync(error: &Error) -> bool {
    matches!(
        error,
        Error::Protocol(_)
            | Error::PacketOutOfOrder { .. }
            | Error::TruncatedPacket { .. }
            | Error::PacketTooLarge { .. }
    )
}

pub(super) struct DebugBufferReader {
    inner: Box<dyn PacketReader>,
    log: Arc<Mutex<PacketLog>>,
}

impl DebugBufferReader {
    pub(super) fn new(inner: Box<dyn PacketReader>, log: Arc<Mutex<PacketLog>>) -> Self {
        Self { inner, log }
    }
}

impl PacketReader for DebugBufferReader {
    fn read_message<'a>(&'a mut self, io: &'a mut PacketIo) -> BoxFuture<'a, Result<Bytes, Error>> {
        Box::pin(async move {
            match self.inner.read_message(io).await {
                Ok(message) => {
                    lock(&self.log).push(Direction::Received, &message);
                    Ok(message)
                }

                Err(error) => {
                    if is_desync(&error) {
                        tracing::debug!(
                            target: PACKET_TARGET,
                            %error,
                            "recent packets:\n{}",
                            lock(&self.log).dump()
                        );
                    }

                    Err(error)
                }
            }
        })
    }

    fn layer(&self) -> Layer {
        Layer::Debug
    }

    fn inner(&self) -> Option<&dyn PacketReader> {
        Some(&*self.inner)
    }

    fn into_inner(self: Box<Self>) -> Option<Box<dyn PacketReader>> {
        Some(self.inner)
    }
}

pub(super) struct DebugBufferWriter {
    inner: Box<dyn PacketWriter>,
    log: Arc<Mutex<PacketLog>>,
}

impl DebugBufferWriter {
    pub(super) fn new(inner: Box<dyn PacketWriter>, log: Arc<Mutex<PacketLog>>) -> Self {
        Self { inner, log }
    }
}

impl PacketWriter for DebugBufferWriter {
    fn write_message<'a>(
        &'a mut self,
        io: &'a mut PacketIo,
        payload: &'a [u8],
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            self.inner.write_message(io, payload).await?;
            lock(&self.log).push(Direction::Sent, payload);

            Ok(())
        })
    }

    fn layer(&self) -> Layer {
        Layer::Debug
    }

    fn into_inner(self: Box<Self>) -> Option<Box<dyn PacketWriter>> {
        Some(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_keeps_the_most_recent_packets() {
        let mut log = PacketLog::new(2);

        log.push(Direction::Sent, b"\x03SELECT 1");
        log.push(Direction::Received, b"\x01");
        log.push(Direction::Received, b"\x00\x00\x00\x02\x00\x00\x00");

        assert_eq!(
            log.dump(),
            "<-        1 bytes: 01\n<-        7 bytes: 00 00 00 02 00 00 00\n"
        );
    }

    #[test]
    fn it_marks_cut_payloads() {
        let mut log = PacketLog::new(1);
        log.push(Direction::Sent, &[0xab; 100]);

        let dump = log.dump();

        assert!(dump.starts_with("->      100 bytes: ab ab"));
        assert!(dump.ends_with(" ..\n"));
    }

    #[test]
    fn it_shrinks_on_resize() {
        let mut log = PacketLog::new(3);

        log.push(Direction::Sent, b"a");
        log.push(Direction::Sent, b"b");
        log.push(Direction::Sent, b"c");
        log.resize(1);

        assert_eq!(log.dump(), "->        1 bytes: 63\n");

        log.resize(0);
        log.push(Direction::Sent, b"d");
        assert_eq!(log.dump(), "");
    }
}
