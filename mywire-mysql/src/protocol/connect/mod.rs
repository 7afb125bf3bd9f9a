//! Connection phase packets.
//!
//! <https://dev.mysql.com/doc/internals/en/connection-phase-packets.html>

mod attributes;
mod auth_switch;
mod handshake;
mod handshake_response;
mod ssl_request;

pub(crate) use attributes::encode_attributes;
pub(crate) use auth_switch::AuthResult;
pub(crate) use handshake::Handshake;
pub(crate) use handshake_response::HandshakeResponse;
pub(crate) use ssl_request::SslRequest;
