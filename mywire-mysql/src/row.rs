use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use crate::column::{ColumnIndex, MySqlColumn};
use crate::error::Error;
use crate::protocol;
use crate::types::Decode;
use crate::value::{MySqlValueFormat, MySqlValueRef};

/// A row of a result set.
#[derive(Clone)]
pub struct MySqlRow {
    pub(crate) row: protocol::Row,
    pub(crate) format: MySqlValueFormat,
    pub(crate) columns: Arc<Vec<MySqlColumn>>,
    pub(crate) column_names: Arc<HashMap<String, usize>>,
}

impl MySqlRow {
    pub fn columns(&self) -> &[MySqlColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.row.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row.len() == 0
    }

    pub fn format(&self) -> MySqlValueFormat {
        self.format
    }

    /// Index into the row and decode a single value.
    ///
    /// ```rust,no_run
    /// # async fn example(conn: &mut mywire_mysql::MySqlConnection) -> mywire_mysql::Result<()> {
    /// let row = conn.fetch_one("SELECT 1 AS one").await?;
    /// let one: i64 = row.try_get("one")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn try_get<T, I>(&self, index: I) -> Result<T, Error>
    where
        T: Decode,
        I: ColumnIndex,
    {
        let value = self.try_get_raw(&index)?;

        value
            .to_value()
            .and_then(T::decode)
            .map_err(|source| Error::ColumnDecode {
                index: format!("{index:?}"),
                source,
            })
    }

    pub fn try_get_raw<I>(&self, index: &I) -> Result<MySqlValueRef<'_>, Error>
    where
        I: ColumnIndex,
    {
        let index = index.index(self)?;
        let column = self
            .columns
            .get(index)
            .ok_or(Error::ColumnIndexOutOfBounds {
                index,
                len: self.columns.len(),
            })?;

        Ok(MySqlValueRef {
            format: self.format,
            type_info: column.type_info,
            value: self.row.get(index),
        })
    }
}

impl Debug for MySqlRow {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut debug_map = f.debug_map();

        for column in self.columns.iter() {
            match self.try_get_raw(&column.ordinal).map(|v| v.to_value()) {
                Ok(Ok(value)) => debug_map.entry(&column.name, &value),
                _ => debug_map.entry(&column.name, &"<undecodable>"),
            };
        }

        debug_map.finish()
    }
}
