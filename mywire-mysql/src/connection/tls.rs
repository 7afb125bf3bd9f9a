use mywire_core::net::tls::TlsConfig;

use crate::collation::Collation;
use crate::connection::session::SessionState;
use crate::connection::stream::MySqlStream;
use crate::error::Error;
use crate::options::{MySqlConnectOptions, MySqlSslMode};
use crate::protocol::connect::SslRequest;
use crate::protocol::Capabilities;

/// Upgrades the transport to TLS if the SSL mode asks for it and the server can do it.
///
/// Must run between reading the greeting and sending the handshake response. Returns
/// whether the stream is now encrypted.
pub(super) async fn maybe_upgrade(
    stream: &mut MySqlStream,
    options: &MySqlConnectOptions,
    server_capabilities: Capabilities,
    max_packet_size: u32,
) -> Result<bool, Error> {
    let server_supports_tls = server_capabilities.contains(Capabilities::SSL);

    if matches!(options.ssl_mode, MySqlSslMode::Disabled) || !server_supports_tls {
        // the handshake response must not claim a TLS session that never started
        stream.session.capabilities.remove(Capabilities::SSL);
    }

    if matches!(options.ssl_mode, MySqlSslMode::Disabled) {
        return Ok(false);
    }

    if !server_supports_tls {
        if options.ssl_mode.is_required() {
            return Err(Error::Tls(
                format!("{:?} requires TLS but the server does not offer it", options.ssl_mode).into(),
            ));
        }

        tracing::debug!("server does not offer TLS, staying in plaintext");
        return Ok(false);
    }

    let tls_config = TlsConfig {
        accept_invalid_certs: !matches!(
            options.ssl_mode,
            MySqlSslMode::VerifyCa | MySqlSslMode::VerifyIdentity
        ),
        accept_invalid_hostnames: !matches!(options.ssl_mode, MySqlSslMode::VerifyIdentity),
        hostname: &options.host,
        root_cert_path: options.ssl_ca.as_ref(),
        tls_versions: &options.tls_versions,
    };

    let capabilities = stream.capabilities();
    let request = ssl_request(&stream.session, max_packet_size);

    stream.write_packet_with(request, capabilities).await?;

    stream.io.upgrade(tls_config).await?;

    tracing::debug!(ssl_mode = ?options.ssl_mode, "upgraded connection to TLS");

    Ok(true)
}

// the server may take its session settings from either packet, so they must agree with the
// handshake response that follows
fn ssl_request(session: &SessionState, max_packet_size: u32) -> SslRequest {
    SslRequest {
        max_packet_size,
        collation: Collation(session.collation).handshake_id(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::session::ServerVersion;

    #[test]
    fn it_announces_the_handshake_collation() {
        let mut session = SessionState::new(ServerVersion::parse("8.0.36"), 1);

        session.collation = Collation::LATIN1_SWEDISH_CI.0;
        assert_eq!(ssl_request(&session, 1024).collation, 8);

        // not expressible in one byte
        session.collation = 305;
        let request = ssl_request(&session, 1024);

        assert_eq!(request.collation, Collation(305).handshake_id());
        assert_eq!(request.collation, 45);
        assert_eq!(request.max_packet_size, 1024);
    }
}
