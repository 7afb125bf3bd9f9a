//! Prepared statement (binary protocol) packets.
//!
//! <https://dev.mysql.com/doc/internals/en/prepared-statements.html>

mod close;
mod execute;
mod fetch;
mod prepare;
mod prepare_ok;
mod row;

pub(crate) use close::StmtClose;
pub(crate) use execute::{CursorType, Execute};
pub(crate) use fetch::StmtFetch;
pub(crate) use prepare::Prepare;
pub(crate) use prepare_ok::PrepareOk;
pub(crate) use row::BinaryRow;
