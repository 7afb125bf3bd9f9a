// https://dev.mysql.com/doc/dev/mysql-server/latest/group__group__cs__capabilities__flags.html
bitflags::bitflags! {
    /// Protocol features a peer can speak.
    ///
    /// The server advertises its set in the greeting. The client answers with the subset
    /// it wants, and from then on both sides frame and parse packets by that subset.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u64 {
        const LONG_PASSWORD = 0x0000_0001;

        /// `affected_rows` counts matched rows rather than changed rows.
        const FOUND_ROWS = 0x0000_0002;

        const LONG_FLAG = 0x0000_0004;

        /// The handshake response names the initial database.
        const CONNECT_WITH_DB = 0x0000_0008;

        const NO_SCHEMA = 0x0000_0010;

        /// Packets travel inside zlib compressed envelopes once authenticated.
        const COMPRESS = 0x0000_0020;

        const ODBC = 0x0000_0040;
        const LOCAL_FILES = 0x0000_0080;
        const IGNORE_SPACE = 0x0000_0100;

        /// 4.1 protocol: SQLSTATE in ERR packets, status flags in OK and EOF packets.
        const PROTOCOL_41 = 0x0000_0200;

        const INTERACTIVE = 0x0000_0400;

        /// The client sends an SSL request and upgrades before authenticating.
        const SSL = 0x0000_0800;

        const TRANSACTIONS = 0x0000_2000;
        const SECURE_CONNECTION = 0x0000_8000;
        const MULTI_STATEMENTS = 0x0001_0000;
        const MULTI_RESULTS = 0x0002_0000;
        const PS_MULTI_RESULTS = 0x0004_0000;

        /// Authentication is negotiated by plugin name and may be switched by the server.
        const PLUGIN_AUTH = 0x0008_0000;

        /// The handshake response carries key/value connection attributes.
        const CONNECT_ATTRS = 0x0010_0000;

        /// The auth response is length-encoded, so it may exceed 255 bytes.
        const PLUGIN_AUTH_LENENC_DATA = 0x0020_0000;

        const CAN_HANDLE_EXPIRED_PASSWORDS = 0x0040_0000;
        const SESSION_TRACK = 0x0080_0000;

        /// Result sets end with an OK packet in place of the EOF packet.
        const DEPRECATE_EOF = 0x0100_0000;
    }
}

impl Capabilities {
    /// Everything this client is able to speak. The negotiated set is the intersection
    /// with what the server advertises, further narrowed by connect options.
    pub(crate) fn client_default() -> Self {
        Capabilities::PROTOCOL_41
            | Capabilities::LONG_PASSWORD
            | Capabilities::LONG_FLAG
            | Capabilities::IGNORE_SPACE
            | Capabilities::TRANSACTIONS
            | Capabilities::SECURE_CONNECTION
            | Capabilities::MULTI_STATEMENTS
            | Capabilities::MULTI_RESULTS
            | Capabilities::PS_MULTI_RESULTS
            | Capabilities::PLUGIN_AUTH
            | Capabilities::PLUGIN_AUTH_LENENC_DATA
            | Capabilities::CONNECT_ATTRS
            | Capabilities::DEPRECATE_EOF
            | Capabilities::CONNECT_WITH_DB
            | Capabilities::FOUND_ROWS
            | Capabilities::SSL
            | Capabilities::COMPRESS
    }
}
