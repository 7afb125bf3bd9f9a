// https://dev.mysql.com/doc/dev/mysql-server/latest/mysql__com_8h.html#a1d854e841086925be1883e4d7b4e8cad
bitflags::bitflags! {
    /// Server status flags, carried by every OK and EOF packet.
    ///
    /// The connection copies the transaction related bits into its
    /// [`SessionState`](crate::SessionState) after every statement.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Status: u16 {
        /// A transaction is open, started explicitly or by the first statement
        /// run with autocommit off.
        const IN_TRANS = 0x0001;

        const AUTOCOMMIT = 0x0002;

        /// Another result follows this one (multi-statement queries, `CALL`).
        const MORE_RESULTS_EXISTS = 0x0008;

        const NO_GOOD_INDEX_USED = 0x0010;
        const NO_INDEX_USED = 0x0020;

        /// A read-only cursor was opened; rows are pulled with `COM_STMT_FETCH`.
        const CURSOR_EXISTS = 0x0040;

        /// The cursor has no rows left.
        const LAST_ROW_SENT = 0x0080;

        const DB_DROPPED = 0x0100;

        /// Backslash is not an escape character in string literals.
        const NO_BACKSLASH_ESCAPES = 0x0200;

        /// A prepared statement was re-prepared after a schema change.
        const METADATA_CHANGED = 0x0400;

        const QUERY_WAS_SLOW = 0x0800;

        /// The result set holds the `OUT` parameters of a stored procedure.
        const PS_OUT_PARAMS = 0x1000;

        const IN_TRANS_READONLY = 0x2000;

        /// Session state tracking information follows in the OK packet.
        const SESSION_STATE_CHANGED = 0x4000;
    }
}

impl Status {
    /// Whether the server will send more after this packet as part of the same command.
    pub(crate) fn has_more(self) -> bool {
        self.intersects(Status::MORE_RESULTS_EXISTS)
    }
}
