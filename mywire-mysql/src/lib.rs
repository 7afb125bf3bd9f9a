//! MySQL client/server protocol engine.
//!
//! Speaks the MySQL wire protocol over TCP or a Unix domain socket: the connection phase
//! with TLS upgrade and pluggable authentication, packet framing with optional zlib
//! compression, the text and binary statement protocols, server-side cursors, a prepared
//! statement cache, and the rewriting of batched single-row `INSERT`s into multi-row
//! statements.
//!
//! ```rust,no_run
//! # async fn example() -> mywire_mysql::Result<()> {
//! use mywire_mysql::{args, MySqlConnectOptions};
//!
//! let mut conn = MySqlConnectOptions::new()
//!     .host("localhost")
//!     .username("root")
//!     .database("test")
//!     .connect()
//!     .await?;
//!
//! let row = conn.fetch_one_with("SELECT ? + ?", &args![2_i64, 3_i64]).await?;
//! assert_eq!(row.try_get::<i64, _>(0)?, 5);
//!
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```
#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(future_incompatible)]

#[macro_use]
extern crate mywire_core;

mod arguments;
mod collation;
mod column;
mod connection;
mod error;
mod io;
mod options;
pub mod protocol;
mod query_result;
pub mod rewrite;
mod row;
mod statement;
mod type_info;
pub mod types;
mod value;

pub use arguments::MySqlArguments;
pub use collation::Collation;
pub use column::{ColumnIndex, MySqlColumn};
pub use connection::{
    BatchErrorPolicy, BatchOutcome, BatchResult, InstrumentationOptions, IsolationLevel,
    KillQueryCanceller, MySqlConnection, PacketTimings, QueryCanceller, ResultStream,
    ServerVersion, SessionState,
};
pub use error::{error_codes, MySqlClientError, MySqlDatabaseError};
pub use mywire_core::error::{BoxDynError, DatabaseError, Error, Result};
pub use mywire_core::logger::LogSettings;
pub use mywire_core::net::Socket;
pub use options::{MySqlConnectOptions, MySqlSslMode};
pub use protocol::{Capabilities, Status};
pub use query_result::MySqlQueryResult;
pub use row::MySqlRow;
pub use statement::{FetchMode, MySqlStatement, PreparedStatementHandle, TextStatement};
pub use type_info::MySqlTypeInfo;
pub use types::Decode;
pub use value::{MySqlValue, MySqlValueFormat, MySqlValueRef};
