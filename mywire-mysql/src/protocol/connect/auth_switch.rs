use bytes::{Buf, Bytes};

use crate::error::{Error, MySqlDatabaseError};
use crate::io::{BufExt, ProtocolDecode};
use crate::protocol::response::{ErrPacket, OkPacket};

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_connection_phase_packets_protocol_auth_switch_request.html

/// The server asks the client to restart authentication with another plugin.
#[derive(Debug)]
pub(crate) struct AuthSwitchRequest {
    pub(crate) plugin: String,
    pub(crate) data: Bytes,
}

impl ProtocolDecode for AuthSwitchRequest {
    fn decode_with(mut buf: Bytes, _: ()) -> Result<Self, Error> {
        if buf.first() != Some(&0xfe) {
            return Err(err_protocol!("expected 0xfe (AUTH_SWITCH)"));
        }

        buf.advance(1);

        // the old pre-4.1 switch carries no plugin name at all
        if buf.is_empty() {
            return Ok(Self {
                plugin: "mysql_old_password".to_owned(),
                data: Bytes::new(),
            });
        }

        let plugin = buf.get_str_nul()?;

        // the challenge is NUL terminated; AWS Aurora sends none for mysql_clear_password
        let data = match buf.last() {
            Some(0) => buf.slice(..buf.len() - 1),
            _ => buf,
        };

        Ok(Self { plugin, data })
    }
}

/// Everything the server may answer while the client is authenticating.
#[derive(Debug)]
pub(crate) enum AuthResult {
    Ok(OkPacket),
    Err(ErrPacket),
    /// `0x01`: plugin specific data for the current plugin.
    MoreData(Bytes),
    Switch(AuthSwitchRequest),
}

impl ProtocolDecode for AuthResult {
    fn decode_with(buf: Bytes, _: ()) -> Result<Self, Error> {
        match buf.first() {
            Some(0x00) => OkPacket::decode(buf).map(Self::Ok),
            Some(0xff) => ErrPacket::decode(buf).map(Self::Err),
            Some(0x01) => Ok(Self::MoreData(buf.slice(1..))),
            Some(0xfe) => AuthSwitchRequest::decode(buf).map(Self::Switch),

            Some(tag) => Err(Error::Authentication(Box::new(
                MySqlDatabaseError::malformed_packet(&format!(
                    "Received 0x{tag:x} but expected one of: 0x0, 0x1, 0xfe or 0xff"
                )),
            ))),

            None => Err(err_protocol!("expected authentication result, got an empty packet")),
        }
    }
}
