use crate::error::BoxDynError;
use crate::types::{mismatched, Decode};
use crate::value::MySqlValue;

macro_rules! impl_decode_int {
    ($($ty:ty),*) => {
        $(
            impl Decode for $ty {
                fn decode(value: MySqlValue) -> Result<Self, BoxDynError> {
                    match value {
                        MySqlValue::Int(v) => Ok(<$ty>::try_from(v)?),
                        MySqlValue::UInt(v) => Ok(<$ty>::try_from(v)?),
                        MySqlValue::Decimal(ref s) | MySqlValue::Text(ref s) => Ok(s.trim().parse()?),
                        value => Err(mismatched(stringify!($ty), &value)),
                    }
                }
            }
        )*
    };
}

impl_decode_int!(i8, i16, i32, i64, u8, u16, u32, u64);

impl Decode for bool {
    fn decode(value: MySqlValue) -> Result<Self, BoxDynError> {
        match value {
            MySqlValue::Int(v) => Ok(v != 0),
            MySqlValue::UInt(v) => Ok(v != 0),

            // BIT(1)
            MySqlValue::Bytes(ref b) if b.len() == 1 => Ok(b[0] != 0),

            MySqlValue::Text(ref s) => match s.trim() {
                "0" => Ok(false),
                "1" => Ok(true),
                other => Err(format!("cannot decode {other:?} as bool").into()),
            },

            value => Err(mismatched("bool", &value)),
        }
    }
}
