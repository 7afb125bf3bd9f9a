//! Command-level reads and writes.
//!
//! Every message goes through the instrumentation chain to the packet codec. The stream
//! also remembers how far the response to the last command has been consumed, so a result
//! that was dropped half read can be drained before the next command is sent.

use std::io;

use bytes::Bytes;

use crate::connection::codec::PacketIo;
use crate::connection::instrument::PacketChain;
use crate::connection::session::SessionState;
use crate::error::{Error, MySqlDatabaseError};
use crate::io::{MySqlBufExt, ProtocolDecode, ProtocolEncode};
use crate::protocol::response::{EofPacket, ErrPacket, OkPacket};
use crate::protocol::text::ColumnDefinition;
use crate::protocol::statement::StmtClose;
use crate::protocol::{Capabilities, Packet};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Busy {
    NotBusy,

    // waiting for a result set, an OK or an ERR
    Result,

    // reading rows of a result set until its terminating EOF
    Row,
}

pub(crate) struct MySqlStream {
    pub(crate) io: PacketIo,
    pub(crate) chain: PacketChain,
    pub(crate) session: SessionState,
    pub(crate) busy: Busy,

    // statements evicted while no command could be sent; closed before the next command
    pub(crate) pending_closes: Vec<u32>,
}

impl MySqlStream {
    pub(crate) fn new(io: PacketIo, chain: PacketChain, session: SessionState) -> Self {
        Self {
            io,
            chain,
            session,
            busy: Busy::NotBusy,
            pending_closes: Vec::new(),
        }
    }

    pub(crate) fn capabilities(&self) -> Capabilities {
        self.session.capabilities
    }

    /// Starts a new command: resets the sequence, writes `payload` and flushes.
    pub(crate) async fn send_packet<T>(&mut self, payload: T) -> Result<(), Error>
    where
        T: ProtocolEncode,
    {
        self.io.reset_sequence();
        self.write_packet(payload).await?;
        self.flush().await
    }

    /// Writes one message continuing the current sequence, without flushing.
    pub(crate) async fn write_packet<T>(&mut self, payload: T) -> Result<(), Error>
    where
        T: ProtocolEncode,
    {
        self.write_packet_with(payload, ()).await
    }

    pub(crate) async fn write_packet_with<T, C>(&mut self, payload: T, context: C) -> Result<(), Error>
    where
        T: ProtocolEncode<C>,
    {
        let mut buf = Vec::with_capacity(64);
        payload.encode_with(&mut buf, context)?;

        self.chain.writer.write_message(&mut self.io, &buf).await
    }

    pub(crate) async fn flush(&mut self) -> Result<(), Error> {
        self.io.flush().await
    }

    /// Reads the next message.
    ///
    /// An ERR packet ends the current command and is returned as a database error.
    pub(crate) async fn recv_packet(&mut self) -> Result<Packet<Bytes>, Error> {
        let payload = match self.chain.reader.read_message(&mut self.io).await {
            Ok(payload) => payload,

            Err(Error::Io(error)) if error.kind() == io::ErrorKind::TimedOut => {
                return Err(self.describe_timeout(error).into());
            }

            Err(error) => return Err(error),
        };

        if payload.is_empty() {
            return Err(err_protocol!("received an empty packet"));
        }

        let packet = Packet(payload);

        if packet.is_err() {
            self.busy = Busy::NotBusy;

            let err: ErrPacket = packet.err()?;
            return Err(MySqlDatabaseError(err).into());
        }

        Ok(packet)
    }

    // adds the packet timings, when tracked, to a socket read timeout
    fn describe_timeout(&self, error: io::Error) -> io::Error {
        let timings = self.chain.timings();

        if timings.last_packet_received.is_none() && timings.last_packet_sent.is_none() {
            return error;
        }

        io::Error::new(
            io::ErrorKind::TimedOut,
            format!(
                "{error}; last packet received {:?} ago, last packet sent {:?} ago",
                timings.since_last_received().unwrap_or_default(),
                timings.since_last_sent().unwrap_or_default(),
            ),
        )
    }

    pub(crate) async fn recv<T>(&mut self) -> Result<T, Error>
    where
        T: ProtocolDecode<()>,
    {
        self.recv_packet().await?.decode()
    }

    /// Reads an OK packet, recording the status it reports.
    pub(crate) async fn recv_ok(&mut self) -> Result<OkPacket, Error> {
        let packet = self.recv_packet().await?;

        if !packet.is_ok() && !packet.is_eof(self.capabilities()) {
            return Err(err_protocol!(
                "expected OK (0x00), got 0x{:02x}",
                packet.header().unwrap_or_default()
            ));
        }

        let ok = packet.ok()?;
        self.session.apply_status(ok.status);

        Ok(ok)
    }

    /// Reads the EOF packet that follows column definitions unless EOF is deprecated.
    pub(crate) async fn maybe_recv_eof(&mut self) -> Result<Option<EofPacket>, Error> {
        if self.capabilities().contains(Capabilities::DEPRECATE_EOF) {
            Ok(None)
        } else {
            let capabilities = self.capabilities();
            let eof = self.recv_packet().await?.eof(capabilities)?;

            Ok(Some(eof))
        }
    }

    /// Reads the column definitions announced by a result set header, and the EOF packet
    /// after them if EOF is not deprecated.
    pub(crate) async fn recv_column_definitions(
        &mut self,
        mut header: Packet<Bytes>,
    ) -> Result<(Vec<ColumnDefinition>, Option<EofPacket>), Error> {
        let num_columns = header.get_uint_lenenc()?;
        let mut definitions = Vec::with_capacity(usize::try_from(num_columns).unwrap_or(0).min(4096));

        for _ in 0..num_columns {
            definitions.push(self.recv::<ColumnDefinition>().await?);
        }

        let eof = self.maybe_recv_eof().await?;

        Ok((definitions, eof))
    }

    /// Decodes the packet ending a result set, recording its status.
    pub(crate) fn end_of_rows(&mut self, packet: Packet<Bytes>) -> Result<EofPacket, Error> {
        let eof = packet.eof(self.capabilities())?;
        self.session.apply_status(eof.status);

        Ok(eof)
    }

    /// Finishes reading the response to the previous command, then closes the statements
    /// waiting to be closed.
    ///
    /// An error the server reported for that command is returned once the connection is
    /// ready again, so it reaches whoever sends the next command.
    pub(crate) async fn wait_until_ready(&mut self) -> Result<(), Error> {
        if self.io.has_pending_writes() {
            self.flush().await?;
        }

        let mut abandoned = None;

        while self.busy != Busy::NotBusy {
            match self.drain_one().await {
                Ok(()) => {}

                // `recv_packet` has already marked the command as finished
                Err(error @ Error::Database(_)) => abandoned = Some(error),

                Err(error) => return Err(error),
            }
        }

        for statement in std::mem::take(&mut self.pending_closes) {
            // COM_STMT_CLOSE has no response
            if let Err(error) = self.send_packet(StmtClose { statement }).await {
                if error.is_fatal() {
                    return Err(error);
                }

                tracing::warn!(statement, %error, "failed to close prepared statement");
            }
        }

        match abandoned {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn drain_one(&mut self) -> Result<(), Error> {
        match self.busy {
            Busy::NotBusy => {}

            Busy::Row => {
                let packet = self.recv_packet().await?;

                if packet.is_eof(self.capabilities()) {
                    let eof = self.end_of_rows(packet)?;

                    self.busy = if eof.status.has_more() {
                        Busy::Result
                    } else {
                        Busy::NotBusy
                    };
                }
            }

            Busy::Result => {
                let packet = self.recv_packet().await?;

                if packet.is_ok() {
                    let ok = packet.ok()?;
                    self.session.apply_status(ok.status);

                    if !ok.status.has_more() {
                        self.busy = Busy::NotBusy;
                    }
                } else {
                    self.busy = Busy::Row;
                    self.recv_column_definitions(packet).await?;
                }
            }
        }

        Ok(())
    }

    /// Shuts the transport down without a goodbye.
    pub(crate) async fn shutdown(&mut self) -> Result<(), Error> {
        self.io.shutdown().await
    }

    /// The sequence id the next packet will carry.
    #[cfg(test)]
    pub(crate) fn sequence_id(&self) -> u8 {
        self.io.sequence_id()
    }
}
