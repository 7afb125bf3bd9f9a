use crate::error::Error;

/// Encode a protocol message into an outgoing payload buffer.
pub trait ProtocolEncode<Context = ()> {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), Error>
    where
        Self: ProtocolEncode<()>,
    {
        self.encode_with(buf, ())
    }

    fn encode_with(&self, buf: &mut Vec<u8>, context: Context) -> Result<(), Error>;
}

impl<C> ProtocolEncode<C> for &'_ [u8] {
    fn encode_with(&self, buf: &mut Vec<u8>, _context: C) -> Result<(), Error> {
        buf.extend_from_slice(self);
        Ok(())
    }
}
