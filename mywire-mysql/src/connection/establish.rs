use bytes::Bytes;

use crate::collation::Collation;
use crate::connection::codec::PacketIo;
use crate::connection::instrument::PacketChain;
use crate::connection::session::{ServerVersion, SessionState};
use crate::connection::stream::MySqlStream;
use crate::connection::tls;
use crate::error::{Error, MySqlClientError, MySqlDatabaseError};
use crate::io::ProtocolDecode;
use crate::options::MySqlConnectOptions;
use crate::protocol::auth_plugin::{AuthContext, AuthPlugin};
use crate::protocol::connect::{encode_attributes, AuthResult, Handshake, HandshakeResponse};
use crate::protocol::response::ErrPacket;
use crate::protocol::Capabilities;

// https://dev.mysql.com/doc/internals/en/connection-phase.html

// the connection phase (establish) performs these tasks:
//  - exchange the capabilities of client and server
//  - setup SSL communication channel if requested
//  - authenticate the client against the server

// the server may immediately send an ERR packet and finish the handshake
// or send a [InitialHandshake]

/// Where the connection phase currently stands.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum HandshakeState {
    AwaitGreeting,
    AuthNegotiate,
    AwaitAuthResult,
    Authenticated,
    Failed,
}

/// Drives one connection attempt from the server greeting to an authenticated session.
pub(crate) struct HandshakeEngine<'a> {
    options: &'a MySqlConnectOptions,
    state: HandshakeState,

    // number of times auth negotiation ran; the second time is the one allowed switch
    negotiations: u8,
}

impl<'a> HandshakeEngine<'a> {
    pub(crate) fn new(options: &'a MySqlConnectOptions) -> Self {
        Self {
            options,
            state: HandshakeState::AwaitGreeting,
            negotiations: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> HandshakeState {
        self.state
    }

    pub(crate) async fn establish(
        &mut self,
        io: PacketIo,
        chain: PacketChain,
    ) -> Result<MySqlStream, Error> {
        let result = self.run(io, chain).await;

        if result.is_err() {
            self.transition(HandshakeState::Failed);
        }

        result
    }

    fn transition(&mut self, state: HandshakeState) {
        tracing::trace!(from = ?self.state, to = ?state, "handshake");

        if state == HandshakeState::AuthNegotiate {
            self.negotiations += 1;
        }

        self.state = state;
    }

    async fn run(&mut self, mut io: PacketIo, mut chain: PacketChain) -> Result<MySqlStream, Error> {
        let options = self.options;

        let payload = chain.reader.read_message(&mut io).await?;

        if payload.first() == Some(&0xff) {
            // e.g. "Too many connections" or "Host is not allowed to connect"
            let err = ErrPacket::decode(payload)?;
            return Err(Error::Database(Box::new(MySqlDatabaseError(err))));
        }

        let handshake = Handshake::decode(payload)?;

        let mut session = SessionState::new(
            ServerVersion::parse(&handshake.server_version),
            handshake.connection_id,
        );

        session.capabilities = negotiate_capabilities(handshake.server_capabilities, options);
        session.charset.clone_from(&options.charset);
        session.collation = Collation::for_charset(&options.charset)
            .unwrap_or(Collation::UTF8MB4_GENERAL_CI)
            .0;
        session.apply_status(handshake.status);

        let mut stream = MySqlStream::new(io, chain, session);

        let max_packet_size = u32::try_from(options.max_allowed_packet).unwrap_or(u32::MAX);

        self.transition(HandshakeState::AuthNegotiate);

        stream.session.ssl = tls::maybe_upgrade(
            &mut stream,
            options,
            handshake.server_capabilities,
            max_packet_size,
        )
        .await?;

        let password = options.password.as_deref().unwrap_or_default();

        let mut plugin = <dyn AuthPlugin>::parse(
            handshake
                .auth_plugin_name
                .as_deref()
                .unwrap_or("mysql_native_password"),
            options.enable_cleartext_plugin,
        )?;

        let mut nonce: Bytes = handshake.auth_plugin_data;

        let auth_response = plugin.scramble(AuthContext {
            nonce: &nonce,
            password,
            secure: stream.io.is_tls(),
        })?;

        let capabilities = stream.capabilities();
        let attributes = encode_attributes(&options.connect_attributes, capabilities);

        stream
            .write_packet_with(
                HandshakeResponse {
                    database: options.database.as_deref(),
                    max_packet_size,
                    collation: Collation(stream.session.collation).handshake_id(),
                    username: &options.username,
                    auth_plugin: Some(plugin.name()),
                    auth_response: &auth_response,
                    attributes: attributes.as_deref(),
                },
                capabilities,
            )
            .await?;

        stream.flush().await?;

        loop {
            self.transition(HandshakeState::AwaitAuthResult);

            let payload = stream.chain.reader.read_message(&mut stream.io).await?;
            let secure = stream.io.is_tls();

            match AuthResult::decode(payload)? {
                AuthResult::Ok(ok) => {
                    stream.session.apply_status(ok.status);
                    break;
                }

                AuthResult::Err(err) => {
                    return Err(Error::Authentication(Box::new(MySqlDatabaseError(err))));
                }

                AuthResult::MoreData(data) => {
                    let cx = AuthContext {
                        nonce: &nonce,
                        password,
                        secure,
                    };

                    if let Some(response) = plugin.handle(data, cx)? {
                        stream.write_packet(&*response).await?;
                        stream.flush().await?;
                    }
                }

                AuthResult::Switch(switch) => {
                    if self.negotiations > 1 {
                        return Err(MySqlClientError::AuthSwitchLoop(switch.plugin).into());
                    }

                    self.transition(HandshakeState::AuthNegotiate);

                    tracing::debug!(plugin = %switch.plugin, "server requested an auth switch");

                    plugin = <dyn AuthPlugin>::parse(&switch.plugin, options.enable_cleartext_plugin)?;
                    nonce = switch.data;

                    let response = plugin.scramble(AuthContext {
                        nonce: &nonce,
                        password,
                        secure,
                    })?;

                    stream.write_packet(&*response).await?;
                    stream.flush().await?;
                }
            }
        }

        if stream.capabilities().contains(Capabilities::COMPRESS) {
            stream.io.enable_compression(options.compression_level);
            stream.session.compression = true;
        }

        self.transition(HandshakeState::Authenticated);

        Ok(stream)
    }
}

/// Everything both sides speak, narrowed down by the connect options.
fn negotiate_capabilities(server: Capabilities, options: &MySqlConnectOptions) -> Capabilities {
    let mut capabilities = Capabilities::client_default() & server;

    if options.compression && !server.contains(Capabilities::COMPRESS) {
        tracing::warn!("compression requested but not supported by the server");
    }

    if !options.compression {
        capabilities.remove(Capabilities::COMPRESS);
    }

    if options.database.is_none() {
        capabilities.remove(Capabilities::CONNECT_WITH_DB);
    }

    capabilities
}
