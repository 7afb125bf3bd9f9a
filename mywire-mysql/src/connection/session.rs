use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::error::Error;
use crate::protocol::{Capabilities, Status};

/// What the client knows about the session on the other end of a connection.
///
/// Filled in by the handshake and kept current from the status flags of every OK and EOF
/// packet. Setters on [`MySqlConnection`][crate::MySqlConnection] may record a value ahead
/// of the server confirming it; the next status flags reported by the server win.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub(crate) capabilities: Capabilities,
    pub(crate) status: Status,
    pub(crate) collation: u16,
    pub(crate) charset: String,
    pub(crate) server_version: ServerVersion,
    pub(crate) thread_id: u32,
    pub(crate) autocommit: bool,
    pub(crate) isolation: Option<IsolationLevel>,
    pub(crate) read_only: bool,
    pub(crate) in_transaction: bool,
    pub(crate) ssl: bool,
    pub(crate) compression: bool,
    pub(crate) auto_increment_increment: u64,
}

impl SessionState {
    pub(crate) fn new(server_version: ServerVersion, thread_id: u32) -> Self {
        Self {
            capabilities: Capabilities::empty(),
            status: Status::AUTOCOMMIT,
            collation: 0,
            charset: String::from("utf8mb4"),
            server_version,
            thread_id,
            autocommit: true,
            isolation: None,
            read_only: false,
            in_transaction: false,
            ssl: false,
            compression: false,
            auto_increment_increment: 1,
        }
    }

    /// Takes over the flags reported in an OK or EOF packet.
    pub(crate) fn apply_status(&mut self, status: Status) {
        self.status = status;
        self.autocommit = status.contains(Status::AUTOCOMMIT);
        self.in_transaction = status.contains(Status::IN_TRANS);
    }

    /// The name of the session variable holding the isolation level.
    ///
    /// `tx_isolation` was deprecated in MySQL 5.7.20 and removed in 8.0.3.
    pub(crate) fn isolation_variable(&self) -> &'static str {
        let version = &self.server_version;

        if !version.mariadb && version.at_least(8, 0, 3) {
            "transaction_isolation"
        } else {
            "tx_isolation"
        }
    }

    /// Whether string literals must be escaped by doubling quotes only.
    pub fn no_backslash_escapes(&self) -> bool {
        self.status.contains(Status::NO_BACKSLASH_ESCAPES)
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn server_version(&self) -> &ServerVersion {
        &self.server_version
    }

    /// The connection id assigned by the server, as used by `KILL QUERY`.
    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn collation(&self) -> u16 {
        self.collation
    }

    pub fn autocommit(&self) -> bool {
        self.autocommit
    }

    /// The isolation level, once it was set through this connection.
    pub fn transaction_isolation(&self) -> Option<IsolationLevel> {
        self.isolation
    }

    /// Whether the session defaults to read-only transactions, once it was set through this
    /// connection.
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn is_ssl(&self) -> bool {
        self.ssl
    }

    pub fn is_compressed(&self) -> bool {
        self.compression
    }

    /// The session's `auto_increment_increment`, used to derive generated ids of rewritten
    /// batches. Only queried from the server when batch rewriting is enabled.
    pub fn auto_increment_increment(&self) -> u64 {
        self.auto_increment_increment
    }
}

/// Transaction isolation levels understood by `SET SESSION TRANSACTION ISOLATION LEVEL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl Display for IsolationLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for IsolationLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        // the server reports these with dashes, e.g. `REPEATABLE-READ`
        let normalized = s.trim().replace(['-', '_'], " ").to_ascii_uppercase();

        Ok(match &*normalized {
            "READ UNCOMMITTED" => IsolationLevel::ReadUncommitted,
            "READ COMMITTED" => IsolationLevel::ReadCommitted,
            "REPEATABLE READ" => IsolationLevel::RepeatableRead,
            "SERIALIZABLE" => IsolationLevel::Serializable,

            _ => {
                return Err(Error::Configuration(
                    format!("unknown isolation level: {s:?}").into(),
                ));
            }
        })
    }
}

/// The version string from the server greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub mariadb: bool,
    pub raw: String,
}

impl ServerVersion {
    /// Parses versions such as `8.0.36`, `5.7.44-log` or `5.5.5-10.11.6-MariaDB-1:10.11.6`.
    ///
    /// MariaDB 10 and later prefix their version with `5.5.5-` for compatibility with old
    /// clients; the prefix is skipped. Unparseable components are reported as `0`.
    pub fn parse(raw: &str) -> Self {
        let mariadb = raw.to_ascii_lowercase().contains("mariadb");

        let version = match raw.strip_prefix("5.5.5-") {
            Some(rest) if mariadb => rest,
            _ => raw,
        };

        let mut numbers = version
            .split(|c: char| !c.is_ascii_digit())
            .take(3)
            .map(|part| atoi::atoi::<u16>(part.as_bytes()).unwrap_or(0));

        Self {
            major: numbers.next().unwrap_or(0),
            minor: numbers.next().unwrap_or(0),
            patch: numbers.next().unwrap_or(0),
            mariadb,
            raw: raw.to_owned(),
        }
    }

    pub fn at_least(&self, major: u16, minor: u16, patch: u16) -> bool {
        self.cmp_numbers(major, minor, patch) != Ordering::Less
    }

    fn cmp_numbers(&self, major: u16, minor: u16, patch: u16) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(major, minor, patch))
    }
}

impl Display for ServerVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
