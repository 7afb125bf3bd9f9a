use bytes::{Buf, Bytes};

use crate::column::MySqlColumn;
use crate::error::Error;
use crate::io::{MySqlBufExt, ProtocolDecode};
use crate::protocol::Row;

/// A result set row of the text protocol: every value is a length-encoded string, or `0xfb`
/// for `NULL`.
///
/// <https://dev.mysql.com/doc/internals/en/com-query-response.html#packet-ProtocolText::ResultsetRow>
#[derive(Debug)]
pub(crate) struct TextRow(pub(crate) Row);

impl<'de> ProtocolDecode<&'de [MySqlColumn]> for TextRow {
    fn decode_with(mut buf: Bytes, columns: &'de [MySqlColumn]) -> Result<Self, Error> {
        let storage = buf.clone();
        let offset = buf.len();

        let mut values = Vec::with_capacity(columns.len());

        for _ in columns {
            if buf.first() == Some(&0xfb) {
                // NULL is sent as 0xfb
                values.push(None);
                buf.advance(1);
            } else {
                let size = buf.get_uint_lenenc()?;
                let size = usize::try_from(size)
                    .map_err(|_| err_protocol!("text value length overflows usize: {size}"))?;

                if buf.remaining() < size {
                    return Err(err_protocol!(
                        "text row value of {} bytes exceeds the {} bytes left in the packet",
                        size,
                        buf.remaining()
                    ));
                }

                let offset = offset - buf.len();

                values.push(Some(offset..(offset + size)));

                buf.advance(size);
            }
        }

        Ok(TextRow(Row { values, storage }))
    }
}
