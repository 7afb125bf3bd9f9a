use crate::error::Error;
use crate::io::ProtocolEncode;

// https://dev.mysql.com/doc/internals/en/com-stmt-close.html

/// Deallocates a prepared statement. The server sends no response.
#[derive(Debug)]
pub(crate) struct StmtClose {
    pub(crate) statement: u32,
}

impl ProtocolEncode for StmtClose {
    fn encode_with(&self, buf: &mut Vec<u8>, _: ()) -> Result<(), Error> {
        buf.push(0x19); // COM_STMT_CLOSE
        buf.extend_from_slice(&self.statement.to_le_bytes());

        Ok(())
    }
}
