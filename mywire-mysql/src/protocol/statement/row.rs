use bytes::{Buf, Bytes};

use crate::column::MySqlColumn;
use crate::error::Error;
use crate::io::{MySqlBufExt, ProtocolDecode};
use crate::protocol::text::ColumnType;
use crate::protocol::Row;

// https://dev.mysql.com/doc/internals/en/binary-protocol-resultset-row.html#packet-ProtocolBinary::ResultsetRow
// https://mariadb.com/kb/en/resultset-row/#binary-resultset-row

#[derive(Debug)]
pub(crate) struct BinaryRow(pub(crate) Row);

impl<'de> ProtocolDecode<&'de [MySqlColumn]> for BinaryRow {
    fn decode_with(mut buf: Bytes, columns: &'de [MySqlColumn]) -> Result<Self, Error> {
        let storage = buf.clone();
        let offset = buf.len();

        let header = buf.first().copied();
        if header != Some(0x00) {
            return Err(err_protocol!(
                "expected 0x00 (ROW) but found {:?}",
                header.map(|b| format!("0x{b:02x}"))
            ));
        }

        buf.advance(1);

        // NULL-Bitmap : byte<(number_of_columns + 9) / 8>
        let null_bitmap_len = (columns.len() + 9) / 8;
        if buf.remaining() < null_bitmap_len {
            return Err(err_protocol!("binary row truncated inside the NULL bitmap"));
        }

        let null_bitmap = buf.split_to(null_bitmap_len);

        let mut values = Vec::with_capacity(columns.len());

        for (column_idx, column) in columns.iter().enumerate() {
            // NOTE: the column index starts at the 3rd bit
            let column_null_idx = column_idx + 2;
            let is_null =
                null_bitmap[column_null_idx / 8] & (1_u8 << (column_null_idx % 8)) != 0;

            if is_null {
                values.push(None);
                continue;
            }

            // NOTE: MySQL will never generate NULL types for non-NULL values
            let size: usize = match column.type_info.r#type {
                // All fixed-length types.
                ColumnType::LongLong => 8,
                ColumnType::Long | ColumnType::Int24 => 4,
                ColumnType::Short | ColumnType::Year => 2,
                ColumnType::Tiny => 1,
                ColumnType::Float => 4,
                ColumnType::Double => 8,

                // Blobs and strings are prefixed with their length,
                // which is itself a length-encoded integer.
                ColumnType::String
                | ColumnType::VarChar
                | ColumnType::VarString
                | ColumnType::Enum
                | ColumnType::Set
                | ColumnType::LongBlob
                | ColumnType::MediumBlob
                | ColumnType::Blob
                | ColumnType::TinyBlob
                | ColumnType::Geometry
                | ColumnType::Bit
                | ColumnType::Decimal
                | ColumnType::Json
                | ColumnType::NewDecimal => {
                    let size = buf.get_uint_lenenc()?;
                    usize::try_from(size)
                        .map_err(|_| err_protocol!("binary value length overflows usize: {size}"))?
                }

                // Like strings and blobs, these values are variable-length.
                // Unlike strings and blobs, however, they exclusively use one byte for length.
                ColumnType::Time
                | ColumnType::Timestamp
                | ColumnType::Date
                | ColumnType::Datetime => {
                    // Leave the length byte on the front of the value because decoding uses it.
                    match buf.first() {
                        Some(len) => usize::from(*len) + 1,
                        None => return Err(err_protocol!("binary row truncated at column {column_idx}")),
                    }
                }

                // NULL is only sent in the bitmap.
                ColumnType::Null => {
                    return Err(err_protocol!(
                        "unexpected non-NULL value of NULL type at column {column_idx}"
                    ))
                }
            };

            if buf.remaining() < size {
                return Err(err_protocol!(
                    "binary value of {} bytes exceeds the {} bytes left in the packet",
                    size,
                    buf.remaining()
                ));
            }

            let offset = offset - buf.len();

            values.push(Some(offset..(offset + size)));

            buf.advance(size);
        }

        Ok(BinaryRow(Row { storage, values }))
    }
}
