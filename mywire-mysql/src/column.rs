use crate::error::Error;
use crate::protocol::text::ColumnDefinition;
use crate::row::MySqlRow;
use crate::type_info::MySqlTypeInfo;

/// A column of a result set, as described by the server.
#[derive(Debug, Clone)]
pub struct MySqlColumn {
    pub(crate) ordinal: usize,
    pub(crate) name: String,
    pub(crate) table: String,
    pub(crate) schema: String,
    pub(crate) type_info: MySqlTypeInfo,
    pub(crate) decimals: u8,
}

impl MySqlColumn {
    pub(crate) fn from_definition(ordinal: usize, def: &ColumnDefinition) -> Self {
        Self {
            ordinal,
            name: def.display_name().to_owned(),
            table: def.table.clone(),
            schema: def.schema.clone(),
            type_info: MySqlTypeInfo::from_column(def),
            decimals: def.decimals,
        }
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// The alias of the column if it has one, else its name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The original table name, empty for computed columns.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn type_info(&self) -> &MySqlTypeInfo {
        &self.type_info
    }

    /// Number of digits after the decimal point for `DECIMAL` and temporal types.
    pub fn decimals(&self) -> u8 {
        self.decimals
    }
}

/// A type that can be used to index into a [`MySqlRow`].
///
/// Implemented for `usize` (position) and `&str` (column name).
pub trait ColumnIndex: std::fmt::Debug {
    /// Returns a valid positional index into the row, [`ColumnIndexOutOfBounds`], or,
    /// [`ColumnNotFound`].
    ///
    /// [`ColumnNotFound`]: Error::ColumnNotFound
    /// [`ColumnIndexOutOfBounds`]: Error::ColumnIndexOutOfBounds
    fn index(&self, row: &MySqlRow) -> Result<usize, Error>;
}

impl ColumnIndex for usize {
    fn index(&self, row: &MySqlRow) -> Result<usize, Error> {
        let len = row.len();

        if *self >= len {
            return Err(Error::ColumnIndexOutOfBounds { len, index: *self });
        }

        Ok(*self)
    }
}

impl ColumnIndex for &'_ str {
    fn index(&self, row: &MySqlRow) -> Result<usize, Error> {
        row.column_names
            .get(*self)
            .copied()
            .or_else(|| {
                row.columns
                    .iter()
                    .find_map(|c| (c.name == *self).then_some(c.ordinal))
            })
            .ok_or_else(|| Error::ColumnNotFound((*self).into()))
    }
}
