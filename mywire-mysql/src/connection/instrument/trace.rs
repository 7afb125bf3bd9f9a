use bytes::Bytes;
use futures_core::future::BoxFuture;

use super::{Layer, PacketReader, PacketWriter, PACKET_TARGET};
use crate::connection::codec::PacketIo;
use crate::error::Error;

pub(super) struct TracingReader {
    inner: Box<dyn PacketReader>,
}

impl TracingReader {
    pub(super) fn new(inner: Box<dyn PacketReader>) -> Self {
        Self { inner }
    }
}

impl PacketReader for TracingReader {
    fn read_message<'a>(&'a mut self, io: &'a mut PacketIo) -> BoxFuture<'a, Result<Bytes, Error>> {
        Box::pin(async move {
            match self.inner.read_message(io).await {
                Ok(message) => {
                    tracing::trace!(
                        target: PACKET_TARGET,
                        direction = "recv",
                        len = message.len(),
                        sequence_id = io.sequence_id().wrapping_sub(1),
                        kind = describe(&message),
                    );

                    Ok(message)
                }

                Err(error) => {
                    tracing::trace!(target: PACKET_TARGET, direction = "recv", %error);
                    Err(error)
                }
            }
        })
    }

    fn layer(&self) -> Layer {
        Layer::Trace
    }

    fn inner(&self) -> Option<&dyn PacketReader> {
        Some(&*self.inner)
    }

    fn into_inner(self: Box<Self>) -> Option<Box<dyn PacketReader>> {
        Some(self.inner)
    }
}

pub(super) struct TracingWriter {
    inner: Box<dyn PacketWriter>,
}

impl TracingWriter {
    pub(super) fn new(inner: Box<dyn PacketWriter>) -> Self {
        Self { inner }
    }
}

impl PacketWriter for TracingWriter {
    fn write_message<'a>(
        &'a mut self,
        io: &'a mut PacketIo,
        payload: &'a [u8],
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            let sequence_id = io.sequence_id();

            self.inner.write_message(io, payload).await?;

            tracing::trace!(
                target: PACKET_TARGET,
                direction = "send",
                len = payload.len(),
                sequence_id,
                kind = command_name(payload),
            );

            Ok(())
        })
    }

    fn layer(&self) -> Layer {
        Layer::Trace
    }

    fn into_inner(self: Box<Self>) -> Option<Box<dyn PacketWriter>> {
        Some(self.inner)
    }
}

/// Best-effort name of a server message from its header byte.
fn describe(message: &[u8]) -> &'static str {
    match message.first() {
        None => "empty",
        Some(0x00) => "ok",
        Some(0xff) => "err",
        Some(0xfe) if message.len() < 9 => "eof",
        Some(0xfb) => "local-infile",
        Some(_) => "data",
    }
}

fn command_name(payload: &[u8]) -> &'static str {
    match payload.first() {
        Some(0x01) => "COM_QUIT",
        Some(0x03) => "COM_QUERY",
        Some(0x0e) => "COM_PING",
        Some(0x16) => "COM_STMT_PREPARE",
        Some(0x17) => "COM_STMT_EXECUTE",
        Some(0x19) => "COM_STMT_CLOSE",
        Some(0x1c) => "COM_STMT_FETCH",
        _ => "data",
    }
}
