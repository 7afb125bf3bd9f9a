use crate::error::Error;
use crate::io::ProtocolEncode;
use crate::protocol::Capabilities;

// https://dev.mysql.com/doc/internals/en/connection-phase-packets.html#packet-Protocol::SSLRequest
// https://mariadb.com/kb/en/connection/#sslrequest-packet

/// Asks the server to switch to TLS. Identical to the first 32 bytes of the handshake response.
#[derive(Debug)]
pub(crate) struct SslRequest {
    pub(crate) max_packet_size: u32,
    pub(crate) collation: u8,
}

impl ProtocolEncode<Capabilities> for SslRequest {
    fn encode_with(&self, buf: &mut Vec<u8>, context: Capabilities) -> Result<(), Error> {
        // client capabilities : int<4>, only the lower half is sent
        buf.extend_from_slice(&context.bits().to_le_bytes()[..4]);

        // max packet size : int<4>
        buf.extend_from_slice(&self.max_packet_size.to_le_bytes());

        // client character collation : int<1>
        buf.push(self.collation);

        // reserved : string<23>
        buf.extend_from_slice(&[0_u8; 23]);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_encodes_the_32_byte_prefix() {
        let mut buf = Vec::new();

        SslRequest {
            max_packet_size: 0x0100_0000,
            collation: 45,
        }
        .encode_with(&mut buf, Capabilities::PROTOCOL_41 | Capabilities::SSL)
        .unwrap();

        assert_eq!(buf.len(), 32);
        assert_eq!(&buf[..9], b"\x00\x0a\x00\x00\x00\x00\x00\x01\x2d");
        assert!(buf[9..].iter().all(|&b| b == 0));
    }
}
