use crate::protocol::response::OkPacket;
use crate::protocol::Status;

/// Represents the execution result of an operation on the database server.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MySqlQueryResult {
    pub(crate) rows_affected: u64,
    pub(crate) last_insert_id: u64,
    pub(crate) warnings: u16,
    pub(crate) status: Status,
    pub(crate) info: String,
}

impl MySqlQueryResult {
    /// Returns the number of rows changed, deleted, or inserted by the statement
    /// if it was an `UPDATE`, `DELETE` or `INSERT`.
    ///
    /// For more information, see the corresponding method in the official C API:
    /// <https://dev.mysql.com/doc/c-api/8.0/en/mysql-affected-rows.html>
    #[doc(alias = "affected_rows")]
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// The first `AUTO_INCREMENT` value generated by the statement, or `0`.
    ///
    /// A multi-row `INSERT` reports the id of its *first* row.
    pub fn last_insert_id(&self) -> u64 {
        self.last_insert_id
    }

    pub fn warnings(&self) -> u16 {
        self.warnings
    }

    /// Server status flags reported with the result.
    pub fn status(&self) -> Status {
        self.status
    }

    /// The human readable info string, e.g. `Records: 2  Duplicates: 0  Warnings: 0`.
    pub fn info(&self) -> &str {
        &self.info
    }
}

impl From<OkPacket> for MySqlQueryResult {
    fn from(ok: OkPacket) -> Self {
        Self {
            rows_affected: ok.affected_rows,
            last_insert_id: ok.last_insert_id,
            warnings: ok.warnings,
            status: ok.status,
            info: ok.info,
        }
    }
}

impl Extend<MySqlQueryResult> for MySqlQueryResult {
    fn extend<T: IntoIterator<Item = MySqlQueryResult>>(&mut self, iter: T) {
        for elem in iter {
            self.rows_affected += elem.rows_affected;
            self.last_insert_id = elem.last_insert_id;
            self.warnings = self.warnings.saturating_add(elem.warnings);
            self.status = elem.status;
            self.info = elem.info;
        }
    }
}
