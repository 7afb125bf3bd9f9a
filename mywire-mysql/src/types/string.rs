use crate::error::BoxDynError;
use crate::types::{mismatched, Decode};
use crate::value::MySqlValue;

impl Decode for String {
    fn decode(value: MySqlValue) -> Result<Self, BoxDynError> {
        match value {
            MySqlValue::Text(s) | MySqlValue::Decimal(s) => Ok(s),
            MySqlValue::Bytes(b) => Ok(String::from_utf8(b)?),
            MySqlValue::Int(v) => Ok(v.to_string()),
            MySqlValue::UInt(v) => Ok(v.to_string()),
            MySqlValue::Float(v) => Ok(v.to_string()),
            MySqlValue::Double(v) => Ok(v.to_string()),
            MySqlValue::Date(v) => Ok(v.to_string()),
            MySqlValue::Time(v) => Ok(v.to_string()),
            MySqlValue::DateTime(v) => Ok(v.to_string()),
            MySqlValue::Null => Err(mismatched("String", &MySqlValue::Null)),
        }
    }
}

impl Decode for Vec<u8> {
    fn decode(value: MySqlValue) -> Result<Self, BoxDynError> {
        match value {
            MySqlValue::Bytes(b) => Ok(b),
            MySqlValue::Text(s) => Ok(s.into_bytes()),
            value => Err(mismatched("Vec<u8>", &value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_decodes_strings_leniently() {
        assert_eq!(String::decode(MySqlValue::Int(5)).unwrap(), "5");
        assert_eq!(String::decode(MySqlValue::Bytes(b"ab".to_vec())).unwrap(), "ab");
        assert!(String::decode(MySqlValue::Bytes(vec![0xff])).is_err());
        assert!(Vec::<u8>::decode(MySqlValue::Int(1)).is_err());
    }
}
