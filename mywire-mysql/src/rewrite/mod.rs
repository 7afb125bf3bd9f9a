//! Batched `INSERT` rewriting.
//!
//! A batch of single-row inserts sharing one template is sent as multi-row statements when
//! that cannot change what the server does. Anything the analysis is unsure about is
//! executed statement by statement.

mod batch;
pub(crate) mod lexer;
mod shape;

pub use batch::{BatchDescriptor, RewrittenStatement};
pub(crate) use batch::{plan_statements, Planned};
pub use shape::{InsertShape, NonRewritable};
