use std::fmt::{self, Display, Formatter};

use crate::collation::Collation;
use crate::protocol::text::{ColumnDefinition, ColumnFlags, ColumnType};

/// Type information for a MySQL column or parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MySqlTypeInfo {
    pub(crate) r#type: ColumnType,
    pub(crate) flags: ColumnFlags,
    pub(crate) charset: u16,

    // [max_size] for integer types, this is (M) in BIT(M) or TINYINT(M)
    pub(crate) max_size: Option<u32>,
}

impl MySqlTypeInfo {
    pub(crate) fn from_column(column: &ColumnDefinition) -> Self {
        Self {
            r#type: column.r#type,
            flags: column.flags,
            charset: column.charset,
            max_size: Some(column.max_size),
        }
    }

    /// The wire type code of the column.
    pub fn column_type(&self) -> ColumnType {
        self.r#type
    }

    pub fn flags(&self) -> ColumnFlags {
        self.flags
    }

    /// The collation id the server reported for the column.
    pub fn charset(&self) -> u16 {
        self.charset
    }

    pub fn max_size(&self) -> Option<u32> {
        self.max_size
    }

    pub fn is_unsigned(&self) -> bool {
        self.flags.contains(ColumnFlags::UNSIGNED)
    }

    /// True for columns carrying raw bytes rather than text in the connection character set.
    pub fn is_binary(&self) -> bool {
        self.charset == Collation::BINARY.0
    }

    /// The SQL name of the type, e.g. `BIGINT UNSIGNED` or `VARBINARY`.
    pub fn name(&self) -> &'static str {
        self.r#type.name(self.flags, self.charset)
    }
}

impl Display for MySqlTypeInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_names_binary_and_text_strings_apart() {
        let text = MySqlTypeInfo {
            r#type: ColumnType::VarString,
            flags: ColumnFlags::empty(),
            charset: 45,
            max_size: Some(1020),
        };

        let binary = |r#type: ColumnType| MySqlTypeInfo {
            r#type,
            flags: ColumnFlags::BINARY,
            charset: Collation::BINARY.0,
            max_size: None,
        };

        assert_eq!(text.name(), "VARCHAR");
        assert!(!text.is_binary());
        assert_eq!(binary(ColumnType::VarString).name(), "VARBINARY");
        assert_eq!(binary(ColumnType::Blob).to_string(), "BLOB");
    }
}
