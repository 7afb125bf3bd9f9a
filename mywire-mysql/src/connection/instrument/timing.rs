use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_core::future::BoxFuture;

use super::{lock, Layer, PacketReader, PacketWriter};
use crate::connection::codec::PacketIo;
use crate::error::Error;

/// Packet traffic statistics of one connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketTimings {
    pub last_packet_sent: Option<Instant>,
    pub last_packet_received: Option<Instant>,
    pub packets_sent: u64,
    pub packets_received: u64,
    /// Total time spent waiting for inbound messages.
    pub read_wait: Duration,
}

impl PacketTimings {
    /// Time since the server last sent anything.
    pub fn since_last_received(&self) -> Option<Duration> {
        self.last_packet_received.map(|at| at.elapsed())
    }

    pub fn since_last_sent(&self) -> Option<Duration> {
        self.last_packet_sent.map(|at| at.elapsed())
    }

    /// Time since a packet last crossed the connection in either direction.
    pub fn since_last_activity(&self) -> Option<Duration> {
        match (self.since_last_received(), self.since_last_sent()) {
            (Some(received), Some(sent)) => Some(received.min(sent)),
            (received, sent) => received.or(sent),
        }
    }
}

pub(super) struct TimingReader {
    inner: Box<dyn PacketReader>,
    timings: Arc<Mutex<PacketTimings>>,
}

impl TimingReader {
    pub(super) fn new(inner: Box<dyn PacketReader>, timings: Arc<Mutex<PacketTimings>>) -> Self {
        Self { inner, timings }
    }
}

impl PacketReader for TimingReader {
    fn read_message<'a>(&'a mut self, io: &'a mut PacketIo) -> BoxFuture<'a, Result<Bytes, Error>> {
        Box::pin(async move {
            let started = Instant::now();
            let message = self.inner.read_message(io).await?;

            let mut timings = lock(&self.timings);
            timings.last_packet_received = Some(Instant::now());
            timings.packets_received += 1;
            timings.read_wait += started.elapsed();

            Ok(message)
        })
    }

    fn layer(&self) -> Layer {
        Layer::Timing
    }

    fn inner(&self) -> Option<&dyn PacketReader> {
        Some(&*self.inner)
    }

    fn into_inner(self: Box<Self>) -> Option<Box<dyn PacketReader>> {
        Some(self.inner)
    }
}

pub(super) struct TimingWriter {
    inner: Box<dyn PacketWriter>,
    timings: Arc<Mutex<PacketTimings>>,
}

impl TimingWriter {
    pub(super) fn new(inner: Box<dyn PacketWriter>, timings: Arc<Mutex<PacketTimings>>) -> Self {
        Self { inner, timings }
    }
}

impl PacketWriter for TimingWriter {
    fn write_message<'a>(
        &'a mut self,
        io: &'a mut PacketIo,
        payload: &'a [u8],
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            self.inner.write_message(io, payload).await?;

            let mut timings = lock(&self.timings);
            timings.last_packet_sent = Some(Instant::now());
            timings.packets_sent += 1;

            Ok(())
        })
    }

    fn layer(&self) -> Layer {
        Layer::Timing
    }

    fn into_inner(self: Box<Self>) -> Option<Box<dyn PacketWriter>> {
        Some(self.inner)
    }
}
