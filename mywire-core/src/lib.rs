//! Core of mywire, the MySQL wire protocol toolkit. Not intended to be used directly.
//!
//! Holds the database-agnostic plumbing the driver crate is built on: the error type,
//! buffer extension traits, the buffered socket with in-place TLS upgrade, statement
//! logging and the LRU cache backing the prepared statement cache.
#![warn(future_incompatible, rust_2018_idioms)]
#![allow(clippy::needless_doctest_main, clippy::type_complexity)]

#[macro_use]
pub mod error;

pub mod cache;
pub mod io;
pub mod logger;
pub mod net;

pub use error::{BoxDynError, DatabaseError, Error, Result};

/// Boxed future type used by the object-safe seams of the driver.
pub use futures_core::future::BoxFuture;
