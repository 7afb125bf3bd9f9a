use crate::arguments::{MySqlArguments, NullBitMap};
use crate::error::Error;
use crate::io::ProtocolEncode;

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/mysql__com_8h.html#a3e5e9e744ff6f7b989a604fd669977da
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum CursorType {
    NoCursor = 0x00,
    ReadOnly = 0x01,
}

/// Asks the server to execute a prepared statement as identified.
///
/// <https://dev.mysql.com/doc/internals/en/com-stmt-execute.html>
/// <https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_stmt_execute.html>
/// <https://mariadb.com/kb/en/com_stmt_execute/>
#[derive(Debug)]
pub(crate) struct Execute<'q> {
    pub(crate) statement: u32,
    pub(crate) cursor: CursorType,
    pub(crate) arguments: &'q MySqlArguments,
}

impl ProtocolEncode for Execute<'_> {
    fn encode_with(&self, buf: &mut Vec<u8>, _: ()) -> Result<(), Error> {
        buf.push(0x17); // COM_STMT_EXECUTE
        buf.extend_from_slice(&self.statement.to_le_bytes());
        buf.push(self.cursor as u8);

        // number of times to execute the statement; can only be 1
        buf.extend_from_slice(&1_u32.to_le_bytes());

        let values = self.arguments.values();

        if !values.is_empty() {
            let mut null_bitmap = NullBitMap::default();
            for value in values {
                null_bitmap.push(value.is_null());
            }

            buf.extend_from_slice(&null_bitmap);

            // new-params-bound-flag : int<1>
            buf.push(1);

            for value in values {
                let (ty, unsigned) = value.binary_type();

                buf.push(ty as u8);
                buf.push(if unsigned { 0x80 } else { 0 });
            }

            for value in values {
                value.encode_binary(buf);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::MySqlValue;

    #[test]
    fn it_encodes_parameters() {
        let mut arguments = MySqlArguments::default();
        arguments.add(2_i64);
        arguments.add(MySqlValue::Null);
        arguments.add("ab");

        let mut buf = Vec::new();

        Execute {
            statement: 3,
            cursor: CursorType::NoCursor,
            arguments: &arguments,
        }
        .encode(&mut buf)
        .unwrap();

        assert_eq!(
            buf,
            b"\x17\x03\0\0\0\x00\x01\0\0\0\
              \x02\x01\
              \x08\x00\x06\x00\xfd\x00\
              \x02\0\0\0\0\0\0\0\
              \x02ab"
        );
    }

    #[test]
    fn it_requests_a_read_only_cursor() {
        let arguments = MySqlArguments::default();
        let mut buf = Vec::new();

        Execute {
            statement: 1,
            cursor: CursorType::ReadOnly,
            arguments: &arguments,
        }
        .encode(&mut buf)
        .unwrap();

        assert_eq!(buf, b"\x17\x01\0\0\0\x01\x01\0\0\0");
    }
}
