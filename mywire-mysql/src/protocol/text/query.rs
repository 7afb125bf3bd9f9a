use crate::error::Error;
use crate::io::ProtocolEncode;

// https://dev.mysql.com/doc/internals/en/com-query.html

#[derive(Debug)]
pub(crate) struct Query<'q>(pub(crate) &'q str);

impl ProtocolEncode for Query<'_> {
    fn encode_with(&self, buf: &mut Vec<u8>, _: ()) -> Result<(), Error> {
        buf.push(0x03); // COM_QUERY
        buf.extend_from_slice(self.0.as_bytes());

        Ok(())
    }
}
