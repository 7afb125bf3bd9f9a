//! An async implementation of the MySQL client/server protocol.
//!
//! This crate re-exports the protocol engine from `mywire-mysql` behind the `mysql`
//! feature, along with the shared error type from `mywire-core`.
//!
//! ```rust,no_run
//! # #[cfg(feature = "mysql")]
//! # async fn example() -> mywire::Result<()> {
//! use mywire::mysql::{args, MySqlConnectOptions};
//!
//! let mut conn = MySqlConnectOptions::new()
//!     .host("localhost")
//!     .username("root")
//!     .connect()
//!     .await?;
//!
//! let done = conn
//!     .execute_with("UPDATE users SET active = ? WHERE id = ?", &args![true, 7_i64])
//!     .await?;
//!
//! println!("{} rows updated", done.rows_affected());
//! # Ok(())
//! # }
//! ```
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use mywire_core::error::{self, BoxDynError, DatabaseError, Error, Result};

#[cfg(feature = "mysql")]
#[cfg_attr(docsrs, doc(cfg(feature = "mysql")))]
pub use mywire_mysql as mysql;

#[cfg(feature = "mysql")]
#[cfg_attr(docsrs, doc(cfg(feature = "mysql")))]
pub use mywire_mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
