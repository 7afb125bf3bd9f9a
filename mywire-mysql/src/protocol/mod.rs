pub(crate) mod auth_plugin;
mod capabilities;
pub(crate) mod connect;
mod packet;
pub(crate) mod response;
mod row;
pub(crate) mod statement;
pub(crate) mod text;

pub use capabilities::Capabilities;
pub(crate) use packet::Packet;
pub use response::Status;
pub(crate) use row::Row;
