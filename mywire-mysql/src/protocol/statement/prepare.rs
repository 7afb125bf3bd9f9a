use crate::error::Error;
use crate::io::ProtocolEncode;

/// Creates a prepared statement from the passed query string.
///
/// <https://dev.mysql.com/doc/internals/en/com-stmt-prepare.html>
/// <https://mariadb.com/kb/en/com_stmt_prepare/>
#[derive(Debug)]
pub(crate) struct Prepare<'q> {
    pub(crate) query: &'q str,
}

impl ProtocolEncode for Prepare<'_> {
    fn encode_with(&self, buf: &mut Vec<u8>, _: ()) -> Result<(), Error> {
        buf.push(0x16); // COM_STMT_PREPARE
        buf.extend_from_slice(self.query.as_bytes());

        Ok(())
    }
}
