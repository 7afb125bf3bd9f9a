use std::ops::{Deref, DerefMut};

use bytes::Bytes;

use crate::error::Error;
use crate::io::ProtocolDecode;
use crate::protocol::response::{EofPacket, ErrPacket, OkPacket};
use crate::protocol::Capabilities;

/// The payload of one logical message, as returned by the packet codec.
#[derive(Debug)]
pub(crate) struct Packet<T>(pub(crate) T);

impl Packet<Bytes> {
    pub(crate) fn decode<T>(self) -> Result<T, Error>
    where
        T: ProtocolDecode<()>,
    {
        self.decode_with(())
    }

    pub(crate) fn decode_with<T, C>(self, context: C) -> Result<T, Error>
    where
        T: ProtocolDecode<C>,
    {
        T::decode_with(self.0, context)
    }

    /// The first byte of the payload, if any.
    pub(crate) fn header(&self) -> Option<u8> {
        self.0.first().copied()
    }

    pub(crate) fn is_err(&self) -> bool {
        self.header() == Some(0xff)
    }

    /// An OK packet, or an EOF packet standing in for one (`0xfe` with a short payload).
    pub(crate) fn is_ok(&self) -> bool {
        self.header() == Some(0x00)
    }

    /// An EOF packet, or an OK packet with an `0xfe` header when EOF is deprecated.
    ///
    /// The length check distinguishes the marker from a length-encoded integer with an
    /// `0xfe` prefix, which only occurs in rows of at least 9 bytes.
    pub(crate) fn is_eof(&self, capabilities: Capabilities) -> bool {
        if self.header() != Some(0xfe) {
            return false;
        }

        if capabilities.contains(Capabilities::DEPRECATE_EOF) {
            self.0.len() < 0xFF_FF_FF
        } else {
            self.0.len() < 9
        }
    }

    pub(crate) fn ok(self) -> Result<OkPacket, Error> {
        self.decode()
    }

    pub(crate) fn err(self) -> Result<ErrPacket, Error> {
        self.decode()
    }

    pub(crate) fn eof(self, capabilities: Capabilities) -> Result<EofPacket, Error> {
        if capabilities.contains(Capabilities::DEPRECATE_EOF) {
            let ok = self.ok()?;

            Ok(EofPacket {
                warnings: ok.warnings,
                status: ok.status,
            })
        } else {
            self.decode_with(capabilities)
        }
    }
}

impl Deref for Packet<Bytes> {
    type Target = Bytes;

    fn deref(&self) -> &Bytes {
        &self.0
    }
}

impl DerefMut for Packet<Bytes> {
    fn deref_mut(&mut self) -> &mut Bytes {
        &mut self.0
    }
}
