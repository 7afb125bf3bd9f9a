use bytes::{Buf, Bytes};

use crate::error::Error;
use crate::io::{BufExt, ProtocolDecode};
use crate::protocol::response::Status;
use crate::protocol::Capabilities;

// https://dev.mysql.com/doc/internals/en/connection-phase-packets.html#packet-Protocol::Handshake
// https://mariadb.com/kb/en/connection/#initial-handshake-packet

/// The greeting the server sends as soon as the transport is established (HandshakeV10).
#[derive(Debug)]
pub(crate) struct Handshake {
    pub(crate) server_version: String,
    pub(crate) connection_id: u32,
    pub(crate) server_capabilities: Capabilities,
    pub(crate) status: Status,
    pub(crate) auth_plugin_name: Option<String>,
    /// The full challenge, with the NUL terminator of the second part stripped.
    pub(crate) auth_plugin_data: Bytes,
}

impl ProtocolDecode for Handshake {
    fn decode_with(mut buf: Bytes, _: ()) -> Result<Self, Error> {
        if !buf.has_remaining() {
            return Err(err_protocol!("expected server greeting, got an empty packet"));
        }

        let protocol_version = buf.get_u8();
        if protocol_version == 0xff {
            // the server refused the connection before the handshake, e.g. "Too many connections"
            return Err(err_protocol!("server rejected the connection before the handshake"));
        }

        if protocol_version != 10 {
            return Err(err_protocol!(
                "unsupported handshake protocol version {}",
                protocol_version
            ));
        }

        let server_version = buf.get_str_nul()?;

        // connection id, 8 bytes of challenge, filler, lower capabilities
        if buf.remaining() < 4 + 8 + 1 + 2 {
            return Err(err_protocol!("server greeting truncated"));
        }

        let connection_id = buf.get_u32_le();
        let auth_plugin_data_1 = buf.get_bytes(8)?;

        // filler : int<1>
        buf.advance(1);

        let capabilities_1 = buf.get_u16_le();
        let mut capabilities = Capabilities::from_bits_truncate(u64::from(capabilities_1));

        let mut status = Status::empty();
        let mut auth_plugin_data_len = 0;

        if buf.remaining() >= 1 + 2 + 2 + 1 + 10 {
            // server default collation : int<1>; the client picks its own
            buf.advance(1);
            status = Status::from_bits_truncate(buf.get_u16_le());

            let capabilities_2 = buf.get_u16_le();
            capabilities |= Capabilities::from_bits_truncate(u64::from(capabilities_2) << 16);

            auth_plugin_data_len = buf.get_u8();

            // reserved : string<10>
            buf.advance(10);
        }

        let mut auth_plugin_data = auth_plugin_data_1.to_vec();

        if capabilities.contains(Capabilities::SECURE_CONNECTION) {
            let len = usize::from(auth_plugin_data_len.saturating_sub(8)).max(13);
            let auth_plugin_data_2 = buf.get_bytes(len.min(buf.remaining()))?;

            // the second part is NUL terminated
            let trimmed = match auth_plugin_data_2.last() {
                Some(0) => &auth_plugin_data_2[..auth_plugin_data_2.len() - 1],
                _ => &auth_plugin_data_2[..],
            };

            auth_plugin_data.extend_from_slice(trimmed);
        }

        let auth_plugin_name = if capabilities.contains(Capabilities::PLUGIN_AUTH) {
            // some servers omit the terminator on the last field
            if buf.contains(&0) {
                Some(buf.get_str_nul()?)
            } else {
                Some(String::from_utf8_lossy(&buf).into_owned())
            }
        } else {
            None
        };

        Ok(Self {
            server_version,
            connection_id,
            server_capabilities: capabilities,
            status,
            auth_plugin_name,
            auth_plugin_data: Bytes::from(auth_plugin_data),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HANDSHAKE_MARIA_DB_10_4_7: &[u8] = b"\n5.5.5-10.4.7-MariaDB-1:10.4.7+maria~bionic\x00\x0b\x00\x00\x00t6L\\j\"dS\x00\xfe\xf7\x08\x02\x00\xff\x81\x15\x00\x00\x00\x00\x00\x00\x07\x00\x00\x00U14Oph9\"<H5n\x00mysql_native_password\x00";
    const HANDSHAKE_MYSQL_8_0_18: &[u8] = b"\n8.0.18\x00\x19\x00\x00\x00\x114aB0c\x06g\x00\xff\xff\xff\x02\x00\xff\xc7\x15\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00L\x03s\x0f[4\rl4. !\x00caching_sha2_password\x00";

    #[test]
    fn handshake_mysql_8_0_18() {
        let p = Handshake::decode(Bytes::from_static(HANDSHAKE_MYSQL_8_0_18)).unwrap();

        assert_eq!(p.server_version, "8.0.18");
        assert_eq!(p.connection_id, 25);
        assert!(p.status.contains(Status::AUTOCOMMIT));
        assert_eq!(p.auth_plugin_name.as_deref(), Some("caching_sha2_password"));

        assert!(p.server_capabilities.contains(
            Capabilities::PROTOCOL_41
                | Capabilities::SECURE_CONNECTION
                | Capabilities::PLUGIN_AUTH
                | Capabilities::DEPRECATE_EOF
                | Capabilities::SSL
                | Capabilities::COMPRESS
        ));

        assert_eq!(&p.auth_plugin_data[..], b"\x114aB0c\x06gL\x03s\x0f[4\rl4. !");
    }

    #[test]
    fn handshake_mariadb_10_4_7() {
        let p = Handshake::decode(Bytes::from_static(HANDSHAKE_MARIA_DB_10_4_7)).unwrap();

        assert_eq!(p.server_version, "5.5.5-10.4.7-MariaDB-1:10.4.7+maria~bionic");
        assert_eq!(p.connection_id, 11);
        assert_eq!(p.auth_plugin_name.as_deref(), Some("mysql_native_password"));
        assert!(p.server_capabilities.contains(Capabilities::PLUGIN_AUTH | Capabilities::SECURE_CONNECTION));
        assert_eq!(&p.auth_plugin_data[..], b"t6L\\j\"dSU14Oph9\"<H5n");
    }
}
