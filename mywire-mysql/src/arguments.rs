use std::ops::Deref;

use crate::value::MySqlValue;

/// Parameters bound to one execution of a statement, in placeholder order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MySqlArguments {
    pub(crate) values: Vec<MySqlValue>,
}

impl MySqlArguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the next parameter.
    pub fn add<T: Into<MySqlValue>>(&mut self, value: T) -> &mut Self {
        self.values.push(value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[MySqlValue] {
        &self.values
    }

    /// Bytes these arguments take in a `COM_STMT_EXECUTE`: the null bitmap, the parameter
    /// types and the values.
    pub(crate) fn binary_len(&self) -> usize {
        self.values.len().div_ceil(8)
            + self
                .values
                .iter()
                .map(|value| 2 + value.binary_len())
                .sum::<usize>()
    }
}

impl<T: Into<MySqlValue>> FromIterator<T> for MySqlArguments {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Builds [`MySqlArguments`] from a list of values of mixed types.
///
/// ```rust
/// # use mywire_mysql::args;
/// let arguments = args![2_i64, "three", None::<i32>];
/// assert_eq!(arguments.len(), 3);
/// ```
#[macro_export]
macro_rules! args {
    () => { $crate::MySqlArguments::new() };

    ($($value:expr),+ $(,)?) => {{
        let mut arguments = $crate::MySqlArguments::new();
        $( arguments.add($value); )+
        arguments
    }};
}

#[derive(Debug, Default, Clone)]
pub(crate) struct NullBitMap {
    bytes: Vec<u8>,
    length: usize,
}

impl NullBitMap {
    pub(crate) fn push(&mut self, is_null: bool) {
        let byte_index = self.length / (u8::BITS as usize);
        let bit_offset = self.length % (u8::BITS as usize);

        if bit_offset == 0 {
            self.bytes.push(0);
        }

        self.bytes[byte_index] |= u8::from(is_null) << bit_offset;
        self.length += 1;
    }
}

impl Deref for NullBitMap {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.bytes
    }
}
