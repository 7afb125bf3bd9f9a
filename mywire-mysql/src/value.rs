use std::fmt::Write;
use std::str::from_utf8;

use bytes::Buf;

use crate::error::BoxDynError;
use crate::io::MySqlBufMutExt;
use crate::protocol::text::ColumnType;
use crate::type_info::MySqlTypeInfo;
use crate::types::{MySqlDate, MySqlDateTime, MySqlTime, UnexpectedNullError};

/// How the values of a row were encoded by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MySqlValueFormat {
    /// Result of `COM_QUERY`: every value is a string.
    Text,
    /// Result of `COM_STMT_EXECUTE`: values are type-tagged binary.
    Binary,
}

/// A dynamically typed SQL value, as bound to a statement or decoded from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum MySqlValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    /// Exact numeric, kept as its decimal text.
    Decimal(String),
    Bytes(Vec<u8>),
    Text(String),
    Date(MySqlDate),
    Time(MySqlTime),
    DateTime(MySqlDateTime),
}

/// A borrowed, still encoded value of a row.
#[derive(Debug, Clone, Copy)]
pub struct MySqlValueRef<'r> {
    pub(crate) value: Option<&'r [u8]>,
    pub(crate) type_info: MySqlTypeInfo,
    pub(crate) format: MySqlValueFormat,
}

impl<'r> MySqlValueRef<'r> {
    pub fn format(&self) -> MySqlValueFormat {
        self.format
    }

    pub fn type_info(&self) -> &MySqlTypeInfo {
        &self.type_info
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// The encoded bytes; for binary temporal values this includes the leading length byte.
    pub fn as_bytes(&self) -> Result<&'r [u8], BoxDynError> {
        match &self.value {
            Some(v) => Ok(v),
            None => Err(UnexpectedNullError.into()),
        }
    }

    pub fn as_str(&self) -> Result<&'r str, BoxDynError> {
        Ok(from_utf8(self.as_bytes()?)?)
    }

    /// Decodes the value according to its column type and wire format.
    ///
    /// Zero dates (`0000-00-00`) decode as [`MySqlValue::Null`].
    pub fn to_value(&self) -> Result<MySqlValue, BoxDynError> {
        if self.value.is_none() {
            return Ok(MySqlValue::Null);
        }

        match self.format {
            MySqlValueFormat::Binary => self.decode_binary(),
            MySqlValueFormat::Text => self.decode_text(),
        }
    }

    fn decode_binary(&self) -> Result<MySqlValue, BoxDynError> {
        let mut buf = self.as_bytes()?;

        Ok(match self.type_info.r#type {
            ColumnType::Tiny
            | ColumnType::Short
            | ColumnType::Year
            | ColumnType::Long
            | ColumnType::Int24
            | ColumnType::LongLong => {
                let size = buf.len().min(8);
                if size == 0 {
                    return Err(format!("empty value for {}", self.type_info).into());
                }

                if self.type_info.is_unsigned() {
                    MySqlValue::UInt(buf.get_uint_le(size))
                } else {
                    MySqlValue::Int(buf.get_int_le(size))
                }
            }

            ColumnType::Float if buf.len() == 4 => MySqlValue::Float(buf.get_f32_le()),
            ColumnType::Double if buf.len() == 8 => MySqlValue::Double(buf.get_f64_le()),

            ColumnType::Float | ColumnType::Double => {
                return Err(format!("invalid width {} for {}", buf.len(), self.type_info).into())
            }

            ColumnType::Date => MySqlDate::decode_binary(buf)?.map_or(MySqlValue::Null, MySqlValue::Date),

            ColumnType::Datetime | ColumnType::Timestamp => {
                MySqlDateTime::decode_binary(buf)?.map_or(MySqlValue::Null, MySqlValue::DateTime)
            }

            ColumnType::Time => MySqlValue::Time(MySqlTime::decode_binary(buf)?),

            _ => self.decode_text()?,
        })
    }

    fn decode_text(&self) -> Result<MySqlValue, BoxDynError> {
        let ty = &self.type_info;

        Ok(match ty.r#type {
            ColumnType::Null => MySqlValue::Null,

            ColumnType::Tiny
            | ColumnType::Short
            | ColumnType::Year
            | ColumnType::Long
            | ColumnType::Int24
            | ColumnType::LongLong => {
                let s = self.as_str()?;

                if ty.is_unsigned() {
                    MySqlValue::UInt(s.parse()?)
                } else {
                    MySqlValue::Int(s.parse()?)
                }
            }

            ColumnType::Float => MySqlValue::Float(self.as_str()?.parse()?),
            ColumnType::Double => MySqlValue::Double(self.as_str()?.parse()?),

            ColumnType::Decimal | ColumnType::NewDecimal => {
                MySqlValue::Decimal(self.as_str()?.to_owned())
            }

            ColumnType::Date => MySqlDate::parse(self.as_str()?)?.map_or(MySqlValue::Null, MySqlValue::Date),

            ColumnType::Datetime | ColumnType::Timestamp => {
                MySqlDateTime::parse(self.as_str()?)?.map_or(MySqlValue::Null, MySqlValue::DateTime)
            }

            ColumnType::Time => MySqlValue::Time(MySqlTime::parse(self.as_str()?)?),

            ColumnType::Bit | ColumnType::Geometry => MySqlValue::Bytes(self.as_bytes()?.to_vec()),

            ColumnType::Json | ColumnType::Enum | ColumnType::Set => {
                MySqlValue::Text(self.as_str()?.to_owned())
            }

            ColumnType::VarChar
            | ColumnType::VarString
            | ColumnType::String
            | ColumnType::TinyBlob
            | ColumnType::MediumBlob
            | ColumnType::LongBlob
            | ColumnType::Blob => {
                if ty.is_binary() {
                    MySqlValue::Bytes(self.as_bytes()?.to_vec())
                } else {
                    MySqlValue::Text(self.as_str()?.to_owned())
                }
            }
        })
    }
}

impl MySqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, MySqlValue::Null)
    }

    /// The parameter type announced in `COM_STMT_EXECUTE`, and whether it is unsigned.
    pub(crate) fn binary_type(&self) -> (ColumnType, bool) {
        match self {
            MySqlValue::Null => (ColumnType::Null, false),
            MySqlValue::Int(_) => (ColumnType::LongLong, false),
            MySqlValue::UInt(_) => (ColumnType::LongLong, true),
            MySqlValue::Float(_) => (ColumnType::Float, false),
            MySqlValue::Double(_) => (ColumnType::Double, false),
            MySqlValue::Decimal(_) => (ColumnType::NewDecimal, false),
            MySqlValue::Bytes(_) => (ColumnType::Blob, false),
            MySqlValue::Text(_) => (ColumnType::VarString, false),
            MySqlValue::Date(_) => (ColumnType::Date, false),
            MySqlValue::Time(_) => (ColumnType::Time, false),
            MySqlValue::DateTime(_) => (ColumnType::Datetime, false),
        }
    }

    /// Appends the binary protocol encoding. `NULL` is only carried by the null bitmap.
    pub(crate) fn encode_binary(&self, buf: &mut Vec<u8>) {
        match self {
            MySqlValue::Null => {}
            MySqlValue::Int(v) => buf.extend_from_slice(&v.to_le_bytes()),
            MySqlValue::UInt(v) => buf.extend_from_slice(&v.to_le_bytes()),
            MySqlValue::Float(v) => buf.extend_from_slice(&v.to_le_bytes()),
            MySqlValue::Double(v) => buf.extend_from_slice(&v.to_le_bytes()),
            MySqlValue::Decimal(v) | MySqlValue::Text(v) => buf.put_str_lenenc(v),
            MySqlValue::Bytes(v) => buf.put_bytes_lenenc(v),
            MySqlValue::Date(v) => v.encode_binary(buf),
            MySqlValue::Time(v) => v.encode_binary(buf),
            MySqlValue::DateTime(v) => v.encode_binary(buf),
        }
    }

    /// Number of bytes [`encode_binary`](Self::encode_binary) appends.
    pub(crate) fn binary_len(&self) -> usize {
        match self {
            MySqlValue::Null => 0,
            MySqlValue::Float(_) => 4,
            MySqlValue::Int(_) | MySqlValue::UInt(_) | MySqlValue::Double(_) => 8,
            MySqlValue::Decimal(v) | MySqlValue::Text(v) => lenenc_len(v.len()),
            MySqlValue::Bytes(v) => lenenc_len(v.len()),

            // at most 13 bytes
            MySqlValue::Date(_) | MySqlValue::Time(_) | MySqlValue::DateTime(_) => {
                let mut buf = Vec::with_capacity(13);
                self.encode_binary(&mut buf);
                buf.len()
            }
        }
    }

    /// Appends the value as a SQL literal, for statements sent through the text protocol.
    ///
    /// With `no_backslash_escapes` (the `NO_BACKSLASH_ESCAPES` SQL mode) the only escape is
    /// a doubled quote.
    pub(crate) fn write_sql_literal(&self, sql: &mut String, no_backslash_escapes: bool) {
        match self {
            MySqlValue::Null => sql.push_str("NULL"),
            MySqlValue::Int(v) => sql.push_str(itoa::Buffer::new().format(*v)),
            MySqlValue::UInt(v) => sql.push_str(itoa::Buffer::new().format(*v)),
            MySqlValue::Float(v) => {
                let _ = write!(sql, "{v}");
            }
            MySqlValue::Double(v) => {
                let _ = write!(sql, "{v}");
            }
            MySqlValue::Decimal(v) | MySqlValue::Text(v) => {
                write_quoted(sql, v, no_backslash_escapes)
            }
            MySqlValue::Bytes(v) => {
                sql.push_str("X'");
                for byte in v {
                    let _ = write!(sql, "{byte:02X}");
                }
                sql.push('\'');
            }
            MySqlValue::Date(v) => write_quoted(sql, &v.to_string(), no_backslash_escapes),
            MySqlValue::Time(v) => write_quoted(sql, &v.to_string(), no_backslash_escapes),
            MySqlValue::DateTime(v) => write_quoted(sql, &v.to_string(), no_backslash_escapes),
        }
    }
}

fn lenenc_len(len: usize) -> usize {
    let prefix = match len {
        0..=250 => 1,
        251..=0xFF_FF => 3,
        0x1_00_00..=0xFF_FF_FF => 4,
        _ => 9,
    };

    prefix + len
}

fn write_quoted(sql: &mut String, value: &str, no_backslash_escapes: bool) {
    sql.reserve(value.len() + 2);
    sql.push('\'');

    for ch in value.chars() {
        match ch {
            '\'' if no_backslash_escapes => sql.push_str("''"),
            _ if no_backslash_escapes => sql.push(ch),

            '\'' => sql.push_str("\\'"),
            '"' => sql.push_str("\\\""),
            '\\' => sql.push_str("\\\\"),
            '\0' => sql.push_str("\\0"),
            '\n' => sql.push_str("\\n"),
            '\r' => sql.push_str("\\r"),
            '\x1a' => sql.push_str("\\Z"),
            _ => sql.push(ch),
        }
    }

    sql.push('\'');
}

macro_rules! impl_from_int {
    ($variant:ident: $($ty:ty),*) => {
        $(
            impl From<$ty> for MySqlValue {
                fn from(value: $ty) -> Self {
                    MySqlValue::$variant(value.into())
                }
            }
        )*
    };
}

impl_from_int!(Int: i8, i16, i32, i64);
impl_from_int!(UInt: u8, u16, u32, u64);

impl From<bool> for MySqlValue {
    fn from(value: bool) -> Self {
        MySqlValue::Int(i64::from(value))
    }
}

impl From<f32> for MySqlValue {
    fn from(value: f32) -> Self {
        MySqlValue::Float(value)
    }
}

impl From<f64> for MySqlValue {
    fn from(value: f64) -> Self {
        MySqlValue::Double(value)
    }
}

impl From<&'_ str> for MySqlValue {
    fn from(value: &str) -> Self {
        MySqlValue::Text(value.to_owned())
    }
}

impl From<String> for MySqlValue {
    fn from(value: String) -> Self {
        MySqlValue::Text(value)
    }
}

impl From<&'_ [u8]> for MySqlValue {
    fn from(value: &[u8]) -> Self {
        MySqlValue::Bytes(value.to_vec())
    }
}

impl From<Vec<u8>> for MySqlValue {
    fn from(value: Vec<u8>) -> Self {
        MySqlValue::Bytes(value)
    }
}

impl From<MySqlDate> for MySqlValue {
    fn from(value: MySqlDate) -> Self {
        MySqlValue::Date(value)
    }
}

impl From<MySqlTime> for MySqlValue {
    fn from(value: MySqlTime) -> Self {
        MySqlValue::Time(value)
    }
}

impl From<MySqlDateTime> for MySqlValue {
    fn from(value: MySqlDateTime) -> Self {
        MySqlValue::DateTime(value)
    }
}

impl<T: Into<MySqlValue>> From<Option<T>> for MySqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(MySqlValue::Null, Into::into)
    }
}
