use bytes::{Buf, Bytes};

use crate::error::Error;
use crate::io::{MySqlBufExt, ProtocolDecode};
use crate::protocol::response::Status;

/// Indicates successful completion of a previous command sent by the client.
///
/// <https://dev.mysql.com/doc/internals/en/packet-OK_Packet.html>
/// <https://mariadb.com/kb/en/ok_packet/>
#[derive(Debug)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status: Status,
    pub warnings: u16,
    /// Human readable status information, e.g. `Records: 2  Duplicates: 0  Warnings: 0`.
    pub info: String,
}

impl ProtocolDecode for OkPacket {
    fn decode_with(mut buf: Bytes, _: ()) -> Result<Self, Error> {
        if !buf.has_remaining() {
            return Err(err_protocol!("expected OK_Packet, got an empty packet"));
        }

        let header = buf.get_u8();
        if header != 0 && header != 0xfe {
            return Err(err_protocol!(
                "expected 0x00 or 0xfe (OK_Packet) but found 0x{:02x}",
                header
            ));
        }

        let affected_rows = buf.get_uint_lenenc()?;
        let last_insert_id = buf.get_uint_lenenc()?;

        if buf.remaining() < 4 {
            return Err(err_protocol!("OK_Packet truncated before status flags"));
        }

        let status = Status::from_bits_truncate(buf.get_u16_le());
        let warnings = buf.get_u16_le();

        // with SESSION_TRACK the info is length-encoded and followed by state changes,
        // which this client does not request
        let info = String::from_utf8_lossy(&buf).into_owned();

        Ok(Self {
            affected_rows,
            last_insert_id,
            status,
            warnings,
            info,
        })
    }
}
