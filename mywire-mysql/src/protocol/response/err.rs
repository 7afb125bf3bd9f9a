use bytes::{Buf, Bytes};

use crate::error::Error;
use crate::io::{BufExt, ProtocolDecode};

// https://dev.mysql.com/doc/internals/en/packet-ERR_Packet.html
// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_basic_err_packet.html
// https://mariadb.com/kb/en/err_packet/

/// Indicates that an error occurred.
#[derive(Debug, Clone)]
pub struct ErrPacket {
    pub error_code: u16,
    pub sql_state: Option<String>,
    pub error_message: String,
}

impl ErrPacket {
    /// A client-side error rendered the way the server reports errors.
    pub(crate) fn new(code: u16, message: &str) -> Self {
        Self {
            error_code: code,
            sql_state: Some("HY000".to_owned()),
            error_message: message.to_owned(),
        }
    }
}

impl ProtocolDecode for ErrPacket {
    fn decode_with(mut buf: Bytes, _: ()) -> Result<Self, Error> {
        if buf.remaining() < 3 {
            return Err(err_protocol!("ERR_Packet too short: {} bytes", buf.remaining()));
        }

        let header = buf.get_u8();
        if header != 0xff {
            return Err(err_protocol!(
                "expected 0xff (ERR_Packet) but found 0x{:x}",
                header
            ));
        }

        let error_code = buf.get_u16_le();

        // the SQL STATE marker is always present with PROTOCOL_41,
        // except for errors raised before the handshake completes
        let sql_state = if buf.first() == Some(&b'#') {
            buf.advance(1);

            Some(buf.get_str(5)?)
        } else {
            None
        };

        let error_message = String::from_utf8_lossy(&buf).into_owned();

        Ok(Self {
            error_code,
            sql_state,
            error_message,
        })
    }
}
