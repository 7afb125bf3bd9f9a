//! Decorators around the packet codec.
//!
//! Every message read or written goes through a chain of layers. From the outside in:
//!
//! * a debug buffer remembering the last few packets, dumped on protocol errors;
//! * a tracing layer emitting one event per packet on the `mywire::packet` target;
//! * a timing layer recording when packets were last sent and received;
//! * the raw codec.
//!
//! Layers are object-safe so the chain can be rebuilt when the options change at runtime.
//! A rebuild only replaces the layers from the innermost changed one outwards. State worth
//! keeping across rebuilds lives in the [`PacketChain`] and is shared with the layers.

use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use futures_core::future::BoxFuture;

use crate::connection::codec::PacketIo;
use crate::error::Error;

mod debug;
mod timing;
mod trace;

pub(crate) use debug::PacketLog;
pub use timing::PacketTimings;

use debug::{DebugBufferReader, DebugBufferWriter};
use timing::{TimingReader, TimingWriter};
use trace::{TracingReader, TracingWriter};

pub(crate) const PACKET_TARGET: &str = "mywire::packet";

/// Which decorators wrap the packet codec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentationOptions {
    /// Number of recent packets kept for [`packet_dump`][crate::MySqlConnection::packet_dump].
    /// `0` disables the buffer.
    pub debug_buffer_packets: usize,
    /// Emit a `TRACE` event for every packet.
    pub trace_packets: bool,
    /// Record when packets were last sent and received.
    pub track_timing: bool,
}

/// The kinds of layer, ordered from the innermost outwards.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Layer {
    Raw,
    Timing,
    Trace,
    Debug,
}

impl Layer {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Layer::Raw => "raw",
            Layer::Timing => "timing",
            Layer::Trace => "trace",
            Layer::Debug => "debug",
        }
    }
}

/// A layer on the inbound side of the chain.
pub(crate) trait PacketReader: Send + Sync {
    fn read_message<'a>(&'a mut self, io: &'a mut PacketIo) -> BoxFuture<'a, Result<Bytes, Error>>;

    fn layer(&self) -> Layer;

    fn inner(&self) -> Option<&dyn PacketReader>;

    /// Unwraps this layer, returning the layer it decorates.
    fn into_inner(self: Box<Self>) -> Option<Box<dyn PacketReader>>;
}

/// A layer on the outbound side of the chain.
pub(crate) trait PacketWriter: Send + Sync {
    fn write_message<'a>(
        &'a mut self,
        io: &'a mut PacketIo,
        payload: &'a [u8],
    ) -> BoxFuture<'a, Result<(), Error>>;

    fn layer(&self) -> Layer;

    fn into_inner(self: Box<Self>) -> Option<Box<dyn PacketWriter>>;
}

pub(crate) struct RawReader;

impl PacketReader for RawReader {
    fn read_message<'a>(&'a mut self, io: &'a mut PacketIo) -> BoxFuture<'a, Result<Bytes, Error>> {
        Box::pin(io.read_message())
    }

    fn layer(&self) -> Layer {
        Layer::Raw
    }

    fn inner(&self) -> Option<&dyn PacketReader> {
        None
    }

    fn into_inner(self: Box<Self>) -> Option<Box<dyn PacketReader>> {
        None
    }
}

pub(crate) struct RawWriter;

impl PacketWriter for RawWriter {
    fn write_message<'a>(
        &'a mut self,
        io: &'a mut PacketIo,
        payload: &'a [u8],
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move { io.write_message(payload) })
    }

    fn layer(&self) -> Layer {
        Layer::Raw
    }

    fn into_inner(self: Box<Self>) -> Option<Box<dyn PacketWriter>> {
        None
    }
}

/// The active reader and writer stacks of a connection.
pub(crate) struct PacketChain {
    pub(crate) reader: Box<dyn PacketReader>,
    pub(crate) writer: Box<dyn PacketWriter>,
    options: InstrumentationOptions,
    timings: Arc<Mutex<PacketTimings>>,
    log: Arc<Mutex<PacketLog>>,
}

impl PacketChain {
    pub(crate) fn new(options: &InstrumentationOptions) -> Self {
        let chain = Self {
            reader: Box::new(RawReader),
            writer: Box::new(RawWriter),
            options: InstrumentationOptions::default(),
            timings: Arc::default(),
            log: Arc::new(Mutex::new(PacketLog::new(0))),
        };

        chain.rebuild(options)
    }

    pub(crate) fn options(&self) -> &InstrumentationOptions {
        &self.options
    }

    /// Re-composes the layers for `options`.
    ///
    /// Layers inside the innermost one whose setting changed are kept, so toggling the
    /// debug buffer leaves the timing layer alone. Timing statistics and the packet log are
    /// owned by the chain, so they also survive layers being toggled off and on again.
    pub(crate) fn rebuild(self, options: &InstrumentationOptions) -> Self {
        let Self {
            mut reader,
            mut writer,
            options: current,
            timings,
            log,
        } = self;

        lock(&log).resize(options.debug_buffer_packets);

        let changed = if current.track_timing != options.track_timing {
            Some(Layer::Timing)
        } else if current.trace_packets != options.trace_packets {
            Some(Layer::Trace)
        } else if (current.debug_buffer_packets > 0) != (options.debug_buffer_packets > 0) {
            Some(Layer::Debug)
        } else {
            None
        };

        if let Some(changed) = changed {
            while reader.layer() >= changed {
                reader = reader
                    .into_inner()
                    .unwrap_or_else(|| Box::new(RawReader));
            }

            while writer.layer() >= changed {
                writer = writer
                    .into_inner()
                    .unwrap_or_else(|| Box::new(RawWriter));
            }

            if changed <= Layer::Timing && options.track_timing {
                reader = Box::new(TimingReader::new(reader, timings.clone()));
                writer = Box::new(TimingWriter::new(writer, timings.clone()));
            }

            if changed <= Layer::Trace && options.trace_packets {
                reader = Box::new(TracingReader::new(reader));
                writer = Box::new(TracingWriter::new(writer));
            }

            if options.debug_buffer_packets > 0 {
                reader = Box::new(DebugBufferReader::new(reader, log.clone()));
                writer = Box::new(DebugBufferWriter::new(writer, log.clone()));
            }
        }

        Self {
            reader,
            writer,
            options: options.clone(),
            timings,
            log,
        }
    }

    /// Names of the reader layers, outermost first.
    pub(crate) fn layers(&self) -> Vec<&'static str> {
        let mut layers = Vec::new();
        let mut layer = Some(&*self.reader);

        while let Some(current) = layer {
            layers.push(current.layer().as_str());
            layer = current.inner();
        }

        layers
    }

    pub(crate) fn timings(&self) -> PacketTimings {
        lock(&self.timings).clone()
    }

    pub(crate) fn dump(&self) -> String {
        lock(&self.log).dump()
    }
}

/// A panic while holding one of these locks cannot leave the data half-updated.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_stacks_layers_in_order() {
        let chain = PacketChain::new(&InstrumentationOptions {
            debug_buffer_packets: 4,
            trace_packets: true,
            track_timing: true,
        });

        assert_eq!(chain.layers(), ["debug", "trace", "timing", "raw"]);
    }

    #[test]
    fn it_omits_disabled_layers() {
        let chain = PacketChain::new(&InstrumentationOptions {
            debug_buffer_packets: 0,
            trace_packets: false,
            track_timing: false,
        });

        assert_eq!(chain.layers(), ["raw"]);
    }

    #[test]
    fn it_keeps_timings_across_rebuilds() {
        let timing = InstrumentationOptions {
            track_timing: true,
            ..InstrumentationOptions::default()
        };

        let chain = PacketChain::new(&timing);

        super::lock(&chain.timings).packets_sent = 3;

        let chain = chain.rebuild(&InstrumentationOptions::default());
        assert_eq!(chain.layers(), ["raw"]);

        let chain = chain.rebuild(&timing);

        assert_eq!(chain.layers(), ["timing", "raw"]);
        assert_eq!(chain.timings().packets_sent, 3);
    }

    fn timing_reader(chain: &PacketChain) -> *const () {
        let mut layer = Some(&*chain.reader);

        while let Some(current) = layer {
            if current.layer() == Layer::Timing {
                return current as *const dyn PacketReader as *const ();
            }

            layer = current.inner();
        }

        panic!("no timing layer in {:?}", chain.layers());
    }

    #[test]
    fn it_keeps_inner_layers_when_toggling_outer_ones() {
        let timing = InstrumentationOptions {
            track_timing: true,
            ..InstrumentationOptions::default()
        };

        let chain = PacketChain::new(&timing);
        let before = timing_reader(&chain);

        let chain = chain.rebuild(&InstrumentationOptions {
            debug_buffer_packets: 8,
            trace_packets: true,
            ..timing.clone()
        });

        assert_eq!(chain.layers(), ["debug", "trace", "timing", "raw"]);
        assert_eq!(timing_reader(&chain), before);

        let chain = chain.rebuild(&InstrumentationOptions {
            debug_buffer_packets: 2,
            ..timing.clone()
        });

        assert_eq!(chain.layers(), ["debug", "timing", "raw"]);
        assert_eq!(timing_reader(&chain), before);
    }

    #[test]
    fn it_rebuilds_outer_layers_around_a_new_inner_one() {
        let chain = PacketChain::new(&InstrumentationOptions {
            debug_buffer_packets: 4,
            trace_packets: true,
            track_timing: false,
        });

        let chain = chain.rebuild(&InstrumentationOptions {
            debug_buffer_packets: 4,
            trace_packets: true,
            track_timing: true,
        });

        assert_eq!(chain.layers(), ["debug", "trace", "timing", "raw"]);
    }
}
