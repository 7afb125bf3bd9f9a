use crate::error::Error;
use crate::io::ProtocolEncode;

/// Check if the server is alive.
///
/// <https://dev.mysql.com/doc/internals/en/com-ping.html>
/// <https://mariadb.com/kb/en/com_ping/>
#[derive(Debug)]
pub(crate) struct Ping;

impl ProtocolEncode for Ping {
    fn encode_with(&self, buf: &mut Vec<u8>, _: ()) -> Result<(), Error> {
        buf.push(0x0e); // COM_PING
        Ok(())
    }
}
