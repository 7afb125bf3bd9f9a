use bytes::{Buf, Bytes};

use crate::error::Error;
use crate::io::ProtocolDecode;
use crate::protocol::response::Status;
use crate::protocol::Capabilities;

/// Marks the end of a result set, returning status and warnings.
///
/// # Note
///
/// The EOF packet is deprecated as of MySQL 5.7.5. It is only decoded as such when
/// `DEPRECATE_EOF` was not negotiated; otherwise an OK packet takes its place.
#[derive(Debug)]
pub struct EofPacket {
    pub warnings: u16,
    pub status: Status,
}

impl ProtocolDecode<Capabilities> for EofPacket {
    fn decode_with(mut buf: Bytes, _: Capabilities) -> Result<Self, Error> {
        if buf.remaining() < 5 {
            return Err(err_protocol!(
                "expected EOF_Packet of 5 bytes, got {} bytes",
                buf.remaining()
            ));
        }

        let header = buf.get_u8();
        if header != 0xfe {
            return Err(err_protocol!(
                "expected 0xfe (EOF_Packet) but found 0x{:x}",
                header
            ));
        }

        let warnings = buf.get_u16_le();
        let status = Status::from_bits_truncate(buf.get_u16_le());

        Ok(Self { warnings, status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_decodes_eof() {
        let eof =
            EofPacket::decode_with(Bytes::from_static(b"\xfe\x01\x00\x82\x00"), Capabilities::empty())
                .unwrap();

        assert_eq!(eof.warnings, 1);
        assert!(eof.status.contains(Status::AUTOCOMMIT | Status::LAST_ROW_SENT));
    }

    #[test]
    fn it_rejects_short_eof() {
        assert!(
            EofPacket::decode_with(Bytes::from_static(b"\xfe\x00"), Capabilities::empty()).is_err()
        );
    }
}
