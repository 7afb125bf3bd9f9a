use crate::error::Error;
use crate::io::ProtocolEncode;

/// Tells the server that the client wants to close the connection.
///
/// <https://dev.mysql.com/doc/internals/en/com-quit.html>
#[derive(Debug)]
pub(crate) struct Quit;

impl ProtocolEncode for Quit {
    fn encode_with(&self, buf: &mut Vec<u8>, _: ()) -> Result<(), Error> {
        buf.push(0x01); // COM_QUIT
        Ok(())
    }
}
