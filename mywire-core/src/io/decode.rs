use bytes::Bytes;

use crate::error::Error;

/// Decode a protocol message from a complete payload.
///
/// `Context` carries whatever connection state the layout depends on, such as the
/// negotiated capability flags.
pub trait ProtocolDecode<Context = ()>
where
    Self: Sized,
{
    fn decode(buf: Bytes) -> Result<Self, Error>
    where
        Self: ProtocolDecode<()>,
    {
        Self::decode_with(buf, ())
    }

    fn decode_with(buf: Bytes, context: Context) -> Result<Self, Error>;
}

impl ProtocolDecode<()> for Bytes {
    fn decode_with(buf: Bytes, _: ()) -> Result<Self, Error> {
        Ok(buf)
    }
}

impl ProtocolDecode<()> for () {
    fn decode_with(_: Bytes, _: ()) -> Result<(), Error> {
        Ok(())
    }
}
