//! Types for working with errors produced by mywire.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt::Display;
use std::io;
use std::time::Duration;

/// A specialized `Result` type for mywire.
pub type Result<T, E = Error> = std::result::Result<T, E>;

// Convenience type alias for usage within mywire.
pub type BoxDynError = Box<dyn StdError + 'static + Send + Sync>;

/// Represents all the ways a method can fail within mywire.
///
/// The variants fall in four families:
///
/// * transport failures ([`Error::Io`], [`Error::Tls`]) which are always fatal to the connection;
/// * protocol desynchronization ([`Error::Protocol`], [`Error::PacketOutOfOrder`],
///   [`Error::TruncatedPacket`], [`Error::PacketTooLarge`]) after which the protocol state of the
///   connection can no longer be trusted;
/// * errors reported by the server ([`Error::Database`], [`Error::Authentication`]);
/// * client-side conditions such as configuration or decoding failures.
///
/// Use [`Error::is_fatal`] to decide whether a connection may be reused after an error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Error occurred while reading configuration.
    #[error("error with configuration: {0}")]
    Configuration(#[source] BoxDynError),

    /// Error returned from the database.
    #[error("error returned from database: {0}")]
    Database(Box<dyn DatabaseError>),

    /// The server rejected the credentials or the authentication exchange.
    #[error("authentication failed: {0}")]
    Authentication(Box<dyn DatabaseError>),

    /// Error communicating with the database backend.
    #[error("error communicating with the server: {0}")]
    Io(#[from] io::Error),

    /// Error occurred while attempting to establish a TLS connection.
    #[error("error occurred while attempting to establish a TLS connection: {0}")]
    Tls(#[source] BoxDynError),

    /// Unexpected or invalid data encountered while communicating with the database.
    ///
    /// This should indicate there is a programming error in a mywire driver or there
    /// is something corrupted with the connection to the database itself.
    #[error("encountered unexpected or invalid data: {0}")]
    Protocol(String),

    /// A packet arrived with a sequence id other than the one expected.
    #[error("packet out of order: expected sequence id {expected}, got {found}")]
    PacketOutOfOrder { expected: u8, found: u8 },

    /// The stream ended before a complete packet could be read.
    #[error("truncated packet: expected {expected} bytes, got {actual}")]
    TruncatedPacket { expected: usize, actual: usize },

    /// An inbound message exceeded the configured maximum size.
    #[error("packet of {len} bytes exceeds the maximum of {max} bytes")]
    PacketTooLarge { len: usize, max: usize },

    /// An outbound message is larger than the server accepts. It was refused before any of
    /// it was written, so the connection stays usable.
    #[error("message of {len} bytes exceeds max_allowed_packet ({max} bytes)")]
    MessageTooLarge { len: usize, max: usize },

    /// The statement did not complete before its deadline and was cancelled.
    ///
    /// `idle` is the time since a packet last crossed the connection, if packet timing is
    /// tracked.
    #[error("statement cancelled after exceeding its deadline{}", describe_idle(.idle))]
    StatementTimeout { idle: Option<Duration> },

    /// The connection is left in an unknown protocol state and must not be reused.
    #[error("connection is unusable: {0}")]
    ConnectionPoisoned(String),

    /// No rows returned by a query that expected to return at least one row.
    #[error("no rows returned by a query that expected to return at least one row")]
    RowNotFound,

    /// Column index was out of bounds.
    #[error("column index out of bounds: the len is {len}, but the index is {index}")]
    ColumnIndexOutOfBounds { index: usize, len: usize },

    /// No column found for the given name.
    #[error("no column found for name: {0}")]
    ColumnNotFound(String),

    /// Error occurred while decoding a value from a specific column.
    #[error("error occurred while decoding column {index}: {source}")]
    ColumnDecode {
        index: String,

        #[source]
        source: BoxDynError,
    },

    /// Error occurred while decoding a value.
    #[error("error occurred while decoding: {0}")]
    Decode(#[source] BoxDynError),

    /// The arguments passed to an operation do not fit the statement.
    #[error("error in argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub fn into_database_error(self) -> Option<Box<dyn DatabaseError + 'static>> {
        match self {
            Error::Database(err) | Error::Authentication(err) => Some(err),
            _ => None,
        }
    }

    pub fn as_database_error(&self) -> Option<&(dyn DatabaseError + 'static)> {
        match self {
            Error::Database(err) | Error::Authentication(err) => Some(&**err),
            _ => None,
        }
    }

    /// Returns `true` if the connection that produced this error must be discarded.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Io(_)
            | Error::Tls(_)
            | Error::Protocol(_)
            | Error::PacketOutOfOrder { .. }
            | Error::TruncatedPacket { .. }
            | Error::PacketTooLarge { .. }
            | Error::ConnectionPoisoned(_)
            | Error::Authentication(_) => true,

            Error::Database(err) => err.is_fatal(),

            _ => false,
        }
    }

    /// Shorthand for a [`Error::StatementTimeout`] without timing information.
    pub fn statement_timeout() -> Self {
        Error::StatementTimeout { idle: None }
    }

    #[doc(hidden)]
    #[inline]
    pub fn protocol(err: impl Display) -> Self {
        Error::Protocol(err.to_string())
    }

    #[doc(hidden)]
    #[inline]
    pub fn config(err: impl StdError + Send + Sync + 'static) -> Self {
        Error::Configuration(err.into())
    }

    #[doc(hidden)]
    #[inline]
    pub fn tls(err: impl Into<BoxDynError>) -> Self {
        Error::Tls(err.into())
    }

    #[doc(hidden)]
    #[inline]
    pub fn decode(err: impl Into<BoxDynError>) -> Self {
        Error::Decode(err.into())
    }
}

fn describe_idle(idle: &Option<Duration>) -> String {
    match idle {
        Some(idle) => format!(" (no packet for {idle:?})"),
        None => String::new(),
    }
}

/// An error that was returned from the database.
pub trait DatabaseError: 'static + Send + Sync + StdError {
    /// The primary, human-readable error message.
    fn message(&self) -> &str;

    /// The (SQLSTATE) code for the error.
    fn code(&self) -> Option<Cow<'_, str>> {
        None
    }

    #[doc(hidden)]
    fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static);

    #[doc(hidden)]
    fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static);

    #[doc(hidden)]
    fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static>;

    /// Returns `true` if the server reported a condition that ends the session,
    /// such as the connection being killed or the server shutting down.
    fn is_fatal(&self) -> bool {
        false
    }
}

impl dyn DatabaseError {
    /// Downcast a reference to this generic database error to a specific
    /// database error type.
    ///
    /// # Panics
    ///
    /// Panics if the database error type is not `E`. This is a deliberate contrast from
    /// `Error::downcast_ref` which returns `Option<&E>`. In normal usage, you should know the
    /// specific error type. In other cases, use `try_downcast_ref`.
    pub fn downcast_ref<E: DatabaseError>(&self) -> &E {
        self.try_downcast_ref().unwrap_or_else(|| {
            panic!("downcast to wrong DatabaseError type; original error: {self}")
        })
    }

    /// Downcast a reference to this generic database error to a specific
    /// database error type.
    #[inline]
    pub fn try_downcast_ref<E: DatabaseError>(&self) -> Option<&E> {
        self.as_error().downcast_ref()
    }

    /// Downcast this generic database error to a specific database error type.
    #[inline]
    pub fn try_downcast<E: DatabaseError>(self: Box<Self>) -> Result<Box<E>, Box<Self>> {
        if self.as_error().is::<E>() {
            Ok(self
                .into_error()
                .downcast()
                .unwrap_or_else(|_| unreachable!("type was checked before downcasting")))
        } else {
            Err(self)
        }
    }
}

impl<E> From<E> for Error
where
    E: DatabaseError,
{
    #[inline]
    fn from(error: E) -> Self {
        Error::Database(Box::new(error))
    }
}

// Format an error message as a `Protocol` error
#[macro_export]
macro_rules! err_protocol {
    ($expr:expr) => {
        $crate::error::Error::Protocol($expr.into())
    };

    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::Error::Protocol(format!($fmt, $($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_classifies_fatal_errors() {
        assert!(Error::Io(io::ErrorKind::ConnectionReset.into()).is_fatal());
        assert!(Error::PacketOutOfOrder { expected: 1, found: 3 }.is_fatal());
        assert!(err_protocol!("unexpected packet").is_fatal());
        assert!(!Error::statement_timeout().is_fatal());
        assert!(!Error::MessageTooLarge { len: 9, max: 8 }.is_fatal());
        assert!(!Error::RowNotFound.is_fatal());
    }

    #[test]
    fn it_reports_how_long_a_timed_out_connection_was_idle() {
        let err = Error::StatementTimeout {
            idle: Some(Duration::from_millis(1500)),
        };

        assert_eq!(
            err.to_string(),
            "statement cancelled after exceeding its deadline (no packet for 1.5s)"
        );
        assert_eq!(
            Error::statement_timeout().to_string(),
            "statement cancelled after exceeding its deadline"
        );
    }

    #[test]
    fn it_formats_desync_errors() {
        let err = Error::PacketOutOfOrder { expected: 2, found: 7 };

        assert_eq!(
            err.to_string(),
            "packet out of order: expected sequence id 2, got 7"
        );
    }
}
