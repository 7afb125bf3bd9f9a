use bytes::{Buf, Bytes};

use crate::error::Error;
use crate::io::BufExt;

pub trait MySqlBufExt: Buf {
    // Read a length-encoded integer.
    // NOTE: 0xfb or NULL is only returned for text row encoding to indicate NULL.
    // NOTE: 0xff is only returned during a result set to indicate ERR.
    // <https://dev.mysql.com/doc/internals/en/integer.html#packet-Protocol::LengthEncodedInteger>
    fn get_uint_lenenc(&mut self) -> Result<u64, Error>;

    // Read a length-encoded string.
    fn get_str_lenenc(&mut self) -> Result<String, Error>;

    // Read a length-encoded byte sequence.
    fn get_bytes_lenenc(&mut self) -> Result<Bytes, Error>;

    // Read a fixed-width integer, checking that enough bytes remain.
    fn try_get_uint_le(&mut self, width: usize) -> Result<u64, Error>;
}

impl MySqlBufExt for Bytes {
    fn get_uint_lenenc(&mut self) -> Result<u64, Error> {
        if !self.has_remaining() {
            return Err(err_protocol!("expected length-encoded integer, got end of packet"));
        }

        match self.get_u8() {
            0xfc => MySqlBufExt::try_get_uint_le(self, 2),
            0xfd => MySqlBufExt::try_get_uint_le(self, 3),
            0xfe => MySqlBufExt::try_get_uint_le(self, 8),

            0xfb => Err(err_protocol!("unexpected NULL in length-encoded integer")),
            0xff => Err(err_protocol!("unexpected ERR marker in length-encoded integer")),

            v => Ok(u64::from(v)),
        }
    }

    fn get_str_lenenc(&mut self) -> Result<String, Error> {
        let size = self.get_uint_lenenc()?;
        let size = usize::try_from(size)
            .map_err(|_| err_protocol!("string length overflows usize: {size}"))?;

        self.get_str(size)
    }

    fn get_bytes_lenenc(&mut self) -> Result<Bytes, Error> {
        let size = self.get_uint_lenenc()?;
        let size = usize::try_from(size)
            .map_err(|_| err_protocol!("byte sequence length overflows usize: {size}"))?;

        self.get_bytes(size)
    }

    fn try_get_uint_le(&mut self, width: usize) -> Result<u64, Error> {
        if self.remaining() < width {
            return Err(err_protocol!(
                "expected {} byte integer, {} bytes remain in the packet",
                width,
                self.remaining()
            ));
        }

        Ok(self.get_uint_le(width))
    }
}
