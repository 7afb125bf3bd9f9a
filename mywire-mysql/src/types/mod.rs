//! Conversions between Rust types and [`MySqlValue`].
//!
//! Values bound to a statement go through `Into<MySqlValue>`; values read from a row go
//! through [`Decode`].
//!
//! | Rust type | decodes from |
//! |-----------|--------------|
//! | `bool` | integers, `BIT(1)` |
//! | `i8` .. `i64`, `u8` .. `u64` | integers within range, numeric text |
//! | `f32`, `f64` | floating point, integers (`f64` only), numeric text |
//! | `String` | text, decimals, UTF-8 bytes, numbers |
//! | `Vec<u8>` | bytes, text |
//! | [`MySqlDate`], [`MySqlDateTime`], [`MySqlTime`] | the matching temporal type or its text |
//! | `Option<T>` | `NULL` or anything `T` decodes from |

mod float;
mod int;
mod string;
mod time;

pub use time::{MySqlDate, MySqlDateTime, MySqlTime};

use crate::error::BoxDynError;
use crate::value::MySqlValue;

/// A type that can be decoded from a value of a row.
pub trait Decode: Sized {
    fn decode(value: MySqlValue) -> Result<Self, BoxDynError>;
}

/// A `NULL` was decoded into a type that cannot represent it.
#[derive(Debug, thiserror::Error)]
#[error("unexpected null; try decoding as an `Option`")]
pub struct UnexpectedNullError;

pub(crate) fn mismatched(rust: &str, value: &MySqlValue) -> BoxDynError {
    match value {
        MySqlValue::Null => UnexpectedNullError.into(),
        _ => format!("cannot decode {value:?} as {rust}").into(),
    }
}

impl Decode for MySqlValue {
    fn decode(value: MySqlValue) -> Result<Self, BoxDynError> {
        Ok(value)
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(value: MySqlValue) -> Result<Self, BoxDynError> {
        match value {
            MySqlValue::Null => Ok(None),
            value => T::decode(value).map(Some),
        }
    }
}

impl Decode for MySqlDate {
    fn decode(value: MySqlValue) -> Result<Self, BoxDynError> {
        match value {
            MySqlValue::Date(v) => Ok(v),
            MySqlValue::DateTime(v) => Ok(v.date),
            MySqlValue::Text(ref s) => {
                MySqlDate::parse(s)?.ok_or_else(|| UnexpectedNullError.into())
            }
            value => Err(mismatched("MySqlDate", &value)),
        }
    }
}

impl Decode for MySqlDateTime {
    fn decode(value: MySqlValue) -> Result<Self, BoxDynError> {
        match value {
            MySqlValue::DateTime(v) => Ok(v),
            MySqlValue::Date(date) => Ok(MySqlDateTime::new(date, 0, 0, 0, 0)),
            MySqlValue::Text(ref s) => {
                MySqlDateTime::parse(s)?.ok_or_else(|| UnexpectedNullError.into())
            }
            value => Err(mismatched("MySqlDateTime", &value)),
        }
    }
}

impl Decode for MySqlTime {
    fn decode(value: MySqlValue) -> Result<Self, BoxDynError> {
        match value {
            MySqlValue::Time(v) => Ok(v),
            MySqlValue::Text(ref s) => MySqlTime::parse(s),
            value => Err(mismatched("MySqlTime", &value)),
        }
    }
}
