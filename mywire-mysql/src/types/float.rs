use crate::error::BoxDynError;
use crate::types::{mismatched, Decode};
use crate::value::MySqlValue;

impl Decode for f64 {
    #[allow(clippy::cast_precision_loss)]
    fn decode(value: MySqlValue) -> Result<Self, BoxDynError> {
        match value {
            MySqlValue::Double(v) => Ok(v),
            MySqlValue::Float(v) => Ok(f64::from(v)),
            MySqlValue::Int(v) => Ok(v as f64),
            MySqlValue::UInt(v) => Ok(v as f64),
            MySqlValue::Decimal(ref s) | MySqlValue::Text(ref s) => Ok(s.trim().parse()?),
            value => Err(mismatched("f64", &value)),
        }
    }
}

impl Decode for f32 {
    fn decode(value: MySqlValue) -> Result<Self, BoxDynError> {
        match value {
            MySqlValue::Float(v) => Ok(v),
            MySqlValue::Decimal(ref s) | MySqlValue::Text(ref s) => Ok(s.trim().parse()?),
            value => Err(mismatched("f32", &value)),
        }
    }
}
