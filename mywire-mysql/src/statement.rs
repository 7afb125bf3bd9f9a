use std::collections::HashMap;
use std::sync::Arc;

use crate::column::MySqlColumn;

/// A statement resolved by [`MySqlConnection::prepare`][crate::MySqlConnection::prepare].
///
/// The kind is decided once, at prepare time, and decides which protocol executes it:
///
/// * `Text` statements are sent with `COM_QUERY`, parameters interpolated client side;
/// * `BinaryPrepared` statements live on the server and are executed with
///   `COM_STMT_EXECUTE`;
/// * `StoredProcedureCall` is a server-prepared `CALL`, which may produce several
///   result sets.
///
/// Handles of prepared kinds are checked out of the connection's statement cache. Give them
/// back with [`release_statement`][crate::MySqlConnection::release_statement] or close them
/// with [`close_statement`][crate::MySqlConnection::close_statement].
#[derive(Debug)]
pub enum MySqlStatement {
    Text(TextStatement),
    BinaryPrepared(PreparedStatementHandle),
    StoredProcedureCall(PreparedStatementHandle),
}

impl MySqlStatement {
    pub fn sql(&self) -> &str {
        match self {
            MySqlStatement::Text(statement) => &statement.sql,
            MySqlStatement::BinaryPrepared(handle) | MySqlStatement::StoredProcedureCall(handle) => {
                &handle.sql
            }
        }
    }

    /// Number of `?` placeholders the statement expects to be bound.
    pub fn param_count(&self) -> usize {
        match self {
            MySqlStatement::Text(statement) => statement.param_count,
            MySqlStatement::BinaryPrepared(handle) | MySqlStatement::StoredProcedureCall(handle) => {
                handle.param_count
            }
        }
    }

    /// The server-side handle, for prepared kinds.
    pub fn handle(&self) -> Option<&PreparedStatementHandle> {
        match self {
            MySqlStatement::Text(_) => None,
            MySqlStatement::BinaryPrepared(handle) | MySqlStatement::StoredProcedureCall(handle) => {
                Some(handle)
            }
        }
    }

    pub fn handle_mut(&mut self) -> Option<&mut PreparedStatementHandle> {
        match self {
            MySqlStatement::Text(_) => None,
            MySqlStatement::BinaryPrepared(handle) | MySqlStatement::StoredProcedureCall(handle) => {
                Some(handle)
            }
        }
    }

    pub(crate) fn into_handle(self) -> Option<PreparedStatementHandle> {
        match self {
            MySqlStatement::Text(_) => None,
            MySqlStatement::BinaryPrepared(handle) | MySqlStatement::StoredProcedureCall(handle) => {
                Some(handle)
            }
        }
    }
}

/// A statement executed through the text protocol.
#[derive(Debug, Clone)]
pub struct TextStatement {
    pub(crate) sql: String,
    pub(crate) param_count: usize,
}

/// A statement prepared on the server with `COM_STMT_PREPARE`.
#[derive(Debug)]
pub struct PreparedStatementHandle {
    pub(crate) id: u32,
    pub(crate) sql: String,
    pub(crate) param_count: usize,
    pub(crate) params: Arc<Vec<MySqlColumn>>,
    pub(crate) columns: Arc<Vec<MySqlColumn>>,
    pub(crate) column_names: Arc<HashMap<String, usize>>,
    pub(crate) poolable: bool,
    pub(crate) closed: bool,
    pub(crate) fetch_mode: FetchMode,
}

impl PreparedStatementHandle {
    /// The statement id assigned by the server.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn param_count(&self) -> usize {
        self.param_count
    }

    /// Parameter metadata as reported by the server. Most servers only report
    /// placeholder types loosely.
    pub fn params(&self) -> &[MySqlColumn] {
        &self.params
    }

    /// Columns of the result set, empty if the statement produces none.
    pub fn columns(&self) -> &[MySqlColumn] {
        &self.columns
    }

    /// Whether executing the statement produces a result set, as classified by the server in
    /// its prepare response.
    pub fn produces_result_set(&self) -> bool {
        !self.columns.is_empty()
    }

    pub fn is_poolable(&self) -> bool {
        self.poolable
    }

    /// Whether the handle goes back into the statement cache when released. Non-poolable
    /// handles are closed on release.
    pub fn set_poolable(&mut self, poolable: bool) {
        self.poolable = poolable;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn fetch_mode(&self) -> FetchMode {
        self.fetch_mode
    }

    /// Overrides the connection's default fetch mode for this statement.
    pub fn set_fetch_mode(&mut self, mode: FetchMode) {
        self.fetch_mode = mode;
    }
}

/// How rows of a prepared statement are pulled from the server.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FetchMode {
    /// The server sends the complete result after `COM_STMT_EXECUTE`.
    All,

    /// A read-only cursor is opened and rows are requested with `COM_STMT_FETCH`,
    /// this many at a time.
    Cursor(u32),

    /// Rows are read one at a time as they arrive, without server-side buffering.
    ///
    /// Requested with a fetch size of `i32::MIN`. On the wire this is the same exchange as
    /// [`FetchMode::All`]; rows are never collected by the stream either way.
    Streaming,
}

impl FetchMode {
    pub(crate) fn resolve(fetch_size: i32, use_cursor_fetch: bool) -> Self {
        if fetch_size == i32::MIN {
            return FetchMode::Streaming;
        }

        match u32::try_from(fetch_size) {
            Ok(rows) if rows > 0 && use_cursor_fetch => FetchMode::Cursor(rows),
            _ => FetchMode::All,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_resolves_fetch_modes() {
        assert_eq!(FetchMode::resolve(0, true), FetchMode::All);
        assert_eq!(FetchMode::resolve(-5, true), FetchMode::All);
        assert_eq!(FetchMode::resolve(100, false), FetchMode::All);
        assert_eq!(FetchMode::resolve(100, true), FetchMode::Cursor(100));
        assert_eq!(FetchMode::resolve(i32::MIN, false), FetchMode::Streaming);
    }
}
