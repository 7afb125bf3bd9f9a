mod socket;
pub mod tls;

pub use socket::{connect_tcp, BufferedSocket, Socket};

#[cfg(unix)]
pub use socket::connect_uds;
