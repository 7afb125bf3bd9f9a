use crate::error::Error;
use crate::io::{BufMutExt, MySqlBufMutExt, ProtocolEncode};
use crate::protocol::connect::SslRequest;
use crate::protocol::Capabilities;

// https://dev.mysql.com/doc/internals/en/connection-phase-packets.html#packet-Protocol::HandshakeResponse
// https://mariadb.com/kb/en/connection/#client-handshake-response

#[derive(Debug)]
pub(crate) struct HandshakeResponse<'a> {
    pub(crate) database: Option<&'a str>,

    /// Max size of a command packet that the client wants to send to the server
    pub(crate) max_packet_size: u32,

    /// Default collation for the connection
    pub(crate) collation: u8,

    /// Name of the SQL account which client wants to log in
    pub(crate) username: &'a str,

    /// Authentication method used by the client
    pub(crate) auth_plugin: Option<&'a str>,

    /// Opaque authentication response
    pub(crate) auth_response: &'a [u8],

    /// Pre-encoded connection attributes, sent when `CONNECT_ATTRS` was negotiated
    pub(crate) attributes: Option<&'a [u8]>,
}

impl ProtocolEncode<Capabilities> for HandshakeResponse<'_> {
    fn encode_with(&self, buf: &mut Vec<u8>, mut context: Capabilities) -> Result<(), Error> {
        if self.auth_plugin.is_none() {
            // ensure PLUGIN_AUTH is set *only* if we have a defined plugin
            context.remove(Capabilities::PLUGIN_AUTH);
        }

        // NOTE: Half of this packet is identical to the SSL Request packet
        SslRequest {
            max_packet_size: self.max_packet_size,
            collation: self.collation,
        }
        .encode_with(buf, context)?;

        buf.put_str_nul(self.username);

        if context.contains(Capabilities::PLUGIN_AUTH_LENENC_DATA) {
            buf.put_bytes_lenenc(self.auth_response);
        } else if context.contains(Capabilities::SECURE_CONNECTION) {
            let response_len = u8::try_from(self.auth_response.len()).map_err(|_| {
                err_protocol!("auth_response.len() too long: {}", self.auth_response.len())
            })?;

            buf.push(response_len);
            buf.extend_from_slice(self.auth_response);
        } else {
            buf.put_bytes_nul(self.auth_response);
        }

        if context.contains(Capabilities::CONNECT_WITH_DB) {
            buf.put_str_nul(self.database.unwrap_or_default());
        }

        if context.contains(Capabilities::PLUGIN_AUTH) {
            buf.put_str_nul(self.auth_plugin.unwrap_or_default());
        }

        if context.contains(Capabilities::CONNECT_ATTRS) {
            if let Some(attributes) = self.attributes {
                buf.extend_from_slice(attributes);
            }
        }

        Ok(())
    }
}
