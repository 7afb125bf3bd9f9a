use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};

pub use mywire_core::error::{BoxDynError, DatabaseError, Error};

use crate::protocol::response::ErrPacket;

/// An error returned from the MySQL database server.
#[derive(Debug)]
pub struct MySqlDatabaseError(pub(crate) ErrPacket);

impl MySqlDatabaseError {
    pub(crate) fn new(code: u16, message: &str) -> Self {
        Self(ErrPacket::new(code, message))
    }

    pub(crate) fn malformed_packet(message: &str) -> Self {
        Self::new(2027, &format!("Malformed packet: {message}"))
    }

    /// The [SQLSTATE](https://dev.mysql.com/doc/mysql-errors/8.0/en/server-error-reference.html) code for this error.
    pub fn code(&self) -> Option<&str> {
        self.0.sql_state.as_deref()
    }

    /// The [number](https://dev.mysql.com/doc/mysql-errors/8.0/en/server-error-reference.html)
    /// for this error.
    ///
    /// MySQL tends to use SQLSTATE as a general error category, and the error number as a more
    /// granular indication of the error.
    pub fn number(&self) -> u16 {
        self.0.error_code
    }

    /// The human-readable error message.
    pub fn message(&self) -> &str {
        &self.0.error_message
    }
}

impl Display for MySqlDatabaseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.code() {
            Some(state) => write!(f, "{} ({}): {}", self.number(), state, self.message()),
            None => write!(f, "{}: {}", self.number(), self.message()),
        }
    }
}

impl StdError for MySqlDatabaseError {}

impl DatabaseError for MySqlDatabaseError {
    #[inline]
    fn message(&self) -> &str {
        self.message()
    }

    #[inline]
    fn code(&self) -> Option<Cow<'_, str>> {
        self.code().map(Cow::Borrowed)
    }

    #[doc(hidden)]
    fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self
    }

    #[doc(hidden)]
    fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
        self
    }

    #[doc(hidden)]
    fn into_error(self: Box<Self>) -> BoxDynError {
        self
    }

    fn is_fatal(&self) -> bool {
        matches!(
            self.number(),
            error_codes::ER_SERVER_SHUTDOWN
                | error_codes::ER_NET_PACKETS_OUT_OF_ORDER
                | error_codes::ER_NET_UNCOMPRESS_ERROR..=error_codes::ER_NET_WRITE_INTERRUPTED
                | error_codes::ER_CONNECTION_KILLED
                | error_codes::ER_CLIENT_INTERACTION_TIMEOUT
        )
    }
}

/// Error numbers that change how the client treats a connection.
///
/// <https://dev.mysql.com/doc/mysql-errors/8.0/en/server-error-reference.html>
pub mod error_codes {
    pub const ER_SERVER_SHUTDOWN: u16 = 1053;
    pub const ER_NET_PACKETS_OUT_OF_ORDER: u16 = 1156;
    pub const ER_NET_UNCOMPRESS_ERROR: u16 = 1157;
    pub const ER_NET_READ_ERROR: u16 = 1158;
    pub const ER_NET_READ_INTERRUPTED: u16 = 1159;
    pub const ER_NET_ERROR_ON_WRITE: u16 = 1160;
    pub const ER_NET_WRITE_INTERRUPTED: u16 = 1161;
    pub const ER_DUP_ENTRY: u16 = 1062;
    pub const ER_QUERY_INTERRUPTED: u16 = 1317;
    pub const ER_UNKNOWN_STMT_HANDLER: u16 = 1243;
    pub const ER_CONNECTION_KILLED: u16 = 1927;
    pub const ER_CLIENT_INTERACTION_TIMEOUT: u16 = 4031;

    pub const CR_AUTH_PLUGIN_CANNOT_LOAD: u16 = 2059;
    pub const CR_AUTH_PLUGIN_ERR: u16 = 2061;
}

/// Errors detected by the client while driving the protocol.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MySqlClientError {
    #[error("Authentication plugin '{0}' cannot be loaded")]
    UnknownAuthPlugin(String),

    #[error("Authentication plugin '{plugin}' reported error: {source}")]
    AuthPlugin {
        plugin: &'static str,
        #[source]
        source: BoxDynError,
    },

    #[error("received no bytes for {context}")]
    EmptyPacket { context: &'static str },

    #[error("server requested a second authentication switch (to '{0}')")]
    AuthSwitchLoop(String),
}

impl MySqlClientError {
    pub(crate) fn auth_plugin(plugin: &'static str, source: impl Into<BoxDynError>) -> Self {
        Self::AuthPlugin {
            plugin,
            source: source.into(),
        }
    }
}

impl From<MySqlClientError> for Error {
    fn from(err: MySqlClientError) -> Self {
        match err {
            MySqlClientError::UnknownAuthPlugin(_) => Error::Authentication(Box::new(
                MySqlDatabaseError::new(error_codes::CR_AUTH_PLUGIN_CANNOT_LOAD, &err.to_string()),
            )),

            MySqlClientError::AuthPlugin { .. } | MySqlClientError::AuthSwitchLoop(_) => {
                Error::Authentication(Box::new(MySqlDatabaseError::new(
                    error_codes::CR_AUTH_PLUGIN_ERR,
                    &err.to_string(),
                )))
            }

            MySqlClientError::EmptyPacket { .. } => Error::Protocol(err.to_string()),
        }
    }
}
