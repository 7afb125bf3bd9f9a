use crate::error::Error;
use crate::io::ProtocolEncode;

// https://mariadb.com/kb/en/library/com_stmt_fetch/
/// Fetch rows from the cursor opened by a prepared statement execution.
#[derive(Debug)]
pub(crate) struct StmtFetch {
    pub(crate) statement: u32,
    pub(crate) rows: u32,
}

impl ProtocolEncode for StmtFetch {
    fn encode_with(&self, buf: &mut Vec<u8>, _: ()) -> Result<(), Error> {
        // COM_STMT_FETCH : int<1>
        buf.push(0x1c);

        // statement id : int<4>
        buf.extend_from_slice(&self.statement.to_le_bytes());

        // number of rows to fetch : int<4>
        buf.extend_from_slice(&self.rows.to_le_bytes());

        Ok(())
    }
}
