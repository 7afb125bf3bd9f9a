use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::LevelFilter;
use mywire_core::logger::LogSettings;
use mywire_core::net::tls::CertificateInput;

use crate::connection::codec::DEFAULT_MAX_READ;
use crate::connection::compression::DEFAULT_LEVEL;
use crate::connection::{BatchErrorPolicy, InstrumentationOptions, QueryCanceller};
use crate::statement::FetchMode;

mod connect;
mod ssl_mode;

pub use ssl_mode::MySqlSslMode;

/// Options and flags which can be used to configure a MySQL connection.
///
/// Options are built with consuming setters, starting from [`MySqlConnectOptions::new`].
///
/// | Option | Default | Description |
/// |--------|---------|-------------|
/// | `host` / `port` | `localhost` / `3306` | TCP endpoint of the server. |
/// | `socket` | `None` | Unix domain socket, used instead of TCP if set. |
/// | `ssl_mode` | `Preferred` | See [`MySqlSslMode`]. |
/// | `compression` | `false` | Negotiate the zlib compressed protocol. |
/// | `max_allowed_packet` | 16 MiB | Largest message the client sends. |
/// | `max_read_bytes` | 64 MiB | Largest message accepted from the server. |
/// | `statement_cache_capacity` | `100` | Prepared statements kept per connection. `0` disables the cache. |
/// | `use_server_prep_stmts` | `true` | Bind parameters through `COM_STMT_PREPARE`/`COM_STMT_EXECUTE`; otherwise interpolate them client side. |
/// | `rewrite_batched_statements` | `false` | Merge batched single-row inserts into multi-row inserts. |
/// | `statement_timeout` | `None` | Deadline after which a running statement is cancelled with `KILL QUERY`. |
///
/// # Example
///
/// ```rust,no_run
/// # async fn example() -> mywire_mysql::Result<()> {
/// use mywire_mysql::{MySqlConnectOptions, MySqlSslMode};
///
/// let mut conn = MySqlConnectOptions::new()
///     .host("localhost")
///     .username("root")
///     .password("password")
///     .database("db")
///     .ssl_mode(MySqlSslMode::Required)
///     .connect()
///     .await?;
///
/// conn.ping().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MySqlConnectOptions {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) socket: Option<PathBuf>,
    pub(crate) username: String,
    pub(crate) password: Option<String>,
    pub(crate) database: Option<String>,
    pub(crate) ssl_mode: MySqlSslMode,
    pub(crate) ssl_ca: Option<CertificateInput>,
    pub(crate) tls_versions: Vec<String>,
    pub(crate) charset: String,
    pub(crate) collation: Option<String>,
    pub(crate) compression: bool,
    pub(crate) compression_level: u32,
    pub(crate) max_allowed_packet: usize,
    pub(crate) max_read_bytes: usize,
    pub(crate) statement_cache_capacity: usize,
    pub(crate) use_server_prep_stmts: bool,
    pub(crate) rewrite_batched_statements: bool,
    pub(crate) max_rewrite_statement_bytes: Option<usize>,
    pub(crate) batch_error_policy: BatchErrorPolicy,
    pub(crate) connect_timeout: Duration,
    pub(crate) socket_timeout: Option<Duration>,
    pub(crate) statement_timeout: Option<Duration>,
    pub(crate) use_local_session_state: bool,
    pub(crate) fetch_size: i32,
    pub(crate) use_cursor_fetch: bool,
    pub(crate) enable_cleartext_plugin: bool,
    pub(crate) instrumentation: InstrumentationOptions,
    pub(crate) pipes_as_concat: bool,
    pub(crate) no_engine_substitution: bool,
    pub(crate) timezone: Option<String>,
    pub(crate) set_names: bool,
    pub(crate) connect_attributes: BTreeMap<String, String>,
    pub(crate) log_settings: LogSettings,
    pub(crate) query_canceller: Option<Arc<dyn QueryCanceller>>,
    pub(crate) packet_chunk_size: Option<usize>,
}

impl Default for MySqlConnectOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl MySqlConnectOptions {
    /// Options for `root@localhost:3306` with the defaults listed above.
    pub fn new() -> Self {
        Self {
            host: String::from("localhost"),
            port: 3306,
            socket: None,
            username: String::from("root"),
            password: None,
            database: None,
            ssl_mode: MySqlSslMode::Preferred,
            ssl_ca: None,
            tls_versions: Vec::new(),
            charset: String::from("utf8mb4"),
            collation: None,
            compression: false,
            compression_level: DEFAULT_LEVEL,
            max_allowed_packet: 16 * 1024 * 1024,
            max_read_bytes: DEFAULT_MAX_READ,
            statement_cache_capacity: 100,
            use_server_prep_stmts: true,
            rewrite_batched_statements: false,
            max_rewrite_statement_bytes: None,
            batch_error_policy: BatchErrorPolicy::AbortRemaining,
            connect_timeout: Duration::from_secs(10),
            socket_timeout: None,
            statement_timeout: None,
            use_local_session_state: false,
            fetch_size: 0,
            use_cursor_fetch: false,
            enable_cleartext_plugin: false,
            instrumentation: InstrumentationOptions::default(),
            pipes_as_concat: true,
            no_engine_substitution: true,
            timezone: Some(String::from("+00:00")),
            set_names: true,
            connect_attributes: BTreeMap::new(),
            log_settings: LogSettings::default(),
            query_canceller: None,
            packet_chunk_size: None,
        }
    }

    /// Host name or address of the server. Also the name TLS certificates are verified
    /// against. Defaults to `localhost`.
    pub fn host(mut self, host: &str) -> Self {
        host.clone_into(&mut self.host);
        self
    }

    /// TCP port of the server. Defaults to `3306`.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Connects through the Unix domain socket at `path` instead of TCP.
    pub fn socket(mut self, path: impl AsRef<Path>) -> Self {
        self.socket = Some(path.as_ref().to_path_buf());
        self
    }

    /// Account to authenticate as. Defaults to `root`.
    pub fn username(mut self, username: &str) -> Self {
        username.clone_into(&mut self.username);
        self
    }

    /// Password handed to the authentication plugin. No password by default.
    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_owned());
        self
    }

    /// Initial default database, sent in the handshake response.
    pub fn database(mut self, database: &str) -> Self {
        self.database = Some(database.to_owned());
        self
    }

    /// Whether the connection is upgraded to TLS before authenticating, and how strictly
    /// the server certificate is checked.
    ///
    /// Defaults to [`Preferred`](MySqlSslMode::Preferred): upgrade when the server
    /// advertises TLS, stay in plaintext otherwise.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use mywire_mysql::{MySqlSslMode, MySqlConnectOptions};
    /// let options = MySqlConnectOptions::new()
    ///     .ssl_mode(MySqlSslMode::Required);
    /// ```
    pub fn ssl_mode(mut self, mode: MySqlSslMode) -> Self {
        self.ssl_mode = mode;
        self
    }

    /// PEM file with the certificate authorities trusted to sign the server certificate,
    /// in place of the bundled web PKI roots.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use mywire_mysql::{MySqlSslMode, MySqlConnectOptions};
    /// let options = MySqlConnectOptions::new()
    ///     .ssl_mode(MySqlSslMode::VerifyCa)
    ///     .ssl_ca("path/to/ca.crt");
    /// ```
    pub fn ssl_ca(mut self, file_name: impl AsRef<Path>) -> Self {
        self.ssl_ca = Some(CertificateInput::File(file_name.as_ref().to_owned()));
        self
    }

    /// Like [`ssl_ca`](Self::ssl_ca), with the PEM contents given inline.
    pub fn ssl_ca_from_pem(mut self, pem_certificate: Vec<u8>) -> Self {
        self.ssl_ca = Some(CertificateInput::Inline(pem_certificate));
        self
    }

    /// Restricts the TLS protocol versions offered, e.g. `["TLSv1.3"]`.
    ///
    /// By default every version supported by the TLS backend is offered.
    pub fn tls_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tls_versions = versions.into_iter().map(Into::into).collect();
        self
    }

    /// Character set of the session. Selects the collation id sent in the handshake and
    /// the `SET NAMES` run afterwards. Defaults to `utf8mb4`.
    pub fn charset(mut self, charset: &str) -> Self {
        charset.clone_into(&mut self.charset);
        self
    }

    /// Collation named in `SET NAMES ... COLLATE`. Without it the server picks the default
    /// collation of the charset.
    pub fn collation(mut self, collation: &str) -> Self {
        self.collation = Some(collation.to_owned());
        self
    }

    /// Negotiates the compressed protocol when the server supports it.
    ///
    /// Disabled by default.
    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// The zlib level (`0..=9`) used for outbound packets. Defaults to `6`.
    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }

    /// The largest message this client sends, in bytes. Should match the server's
    /// `max_allowed_packet`. Defaults to 16 MiB.
    pub fn max_allowed_packet(mut self, bytes: usize) -> Self {
        self.max_allowed_packet = bytes;
        self
    }

    /// The largest message accepted from the server, after joining split packets. A larger
    /// one fails with [`Error::PacketTooLarge`][crate::Error::PacketTooLarge] and leaves the
    /// connection unusable. Defaults to 64 MiB.
    pub fn max_read_bytes(mut self, bytes: usize) -> Self {
        self.max_read_bytes = bytes;
        self
    }

    /// Number of prepared statements kept open per connection, keyed by their SQL.
    ///
    /// Past the capacity the least recently used statement is closed on the server.
    /// `0` closes every statement as soon as it is released. Defaults to `100`.
    pub fn statement_cache_capacity(mut self, capacity: usize) -> Self {
        self.statement_cache_capacity = capacity;
        self
    }

    /// Prepare statements on the server and bind parameters in the binary protocol.
    ///
    /// When disabled, parameters are escaped and interpolated into the SQL text which is then
    /// sent with `COM_QUERY`. Enabled by default.
    pub fn use_server_prep_stmts(mut self, enabled: bool) -> Self {
        self.use_server_prep_stmts = enabled;
        self
    }

    /// Merge batched single-row `INSERT`/`REPLACE` statements into multi-row statements.
    ///
    /// Disabled by default.
    pub fn rewrite_batched_statements(mut self, enabled: bool) -> Self {
        self.rewrite_batched_statements = enabled;
        self
    }

    /// Upper bound for one rewritten statement. Defaults to `max_allowed_packet`.
    pub fn max_rewrite_statement_bytes(mut self, bytes: usize) -> Self {
        self.max_rewrite_statement_bytes = Some(bytes);
        self
    }

    /// What happens to the rest of a batch after one of its statements fails.
    pub fn batch_error_policy(mut self, policy: BatchErrorPolicy) -> Self {
        self.batch_error_policy = policy;
        self
    }

    /// Deadline for establishing the connection, including the handshake. Defaults to 10 seconds.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Deadline for every individual read from the server. Not set by default.
    pub fn socket_timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.socket_timeout = timeout.into();
        self
    }

    /// Deadline for a statement, after which it is cancelled with `KILL QUERY` over a second
    /// connection and [`Error::StatementTimeout`][crate::Error::StatementTimeout] is returned.
    ///
    /// Not set by default.
    pub fn statement_timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.statement_timeout = timeout.into();
        self
    }

    /// Replaces how a timed out statement is cancelled. Defaults to
    /// [`KillQueryCanceller`][crate::KillQueryCanceller].
    pub fn query_canceller(mut self, canceller: Arc<dyn QueryCanceller>) -> Self {
        self.query_canceller = Some(canceller);
        self
    }

    /// Trust the locally tracked session state and skip `SET` statements that would not
    /// change anything, e.g. `set_autocommit(true)` while autocommit is already on.
    ///
    /// Disabled by default.
    pub fn use_local_session_state(mut self, enabled: bool) -> Self {
        self.use_local_session_state = enabled;
        self
    }

    /// Rows requested per round trip when cursor fetch is enabled.
    ///
    /// `0` reads the whole result at once; `i32::MIN` requests streaming.
    /// See [`FetchMode`].
    pub fn fetch_size(mut self, rows: i32) -> Self {
        self.fetch_size = rows;
        self
    }

    /// Open a server-side cursor for prepared statements with a positive fetch size.
    pub fn use_cursor_fetch(mut self, enabled: bool) -> Self {
        self.use_cursor_fetch = enabled;
        self
    }

    /// Allows the server to switch authentication to `mysql_clear_password`.
    ///
    /// The password then crosses the wire as is, so pair this with
    /// [`MySqlSslMode::VerifyIdentity`]. Disabled by default.
    pub fn enable_cleartext_plugin(mut self, enabled: bool) -> Self {
        self.enable_cleartext_plugin = enabled;
        self
    }

    /// Which diagnostic layers wrap the packet codec. May be changed later on a live connection
    /// with [`MySqlConnection::set_instrumentation`][crate::MySqlConnection::set_instrumentation].
    pub fn instrumentation(mut self, instrumentation: InstrumentationOptions) -> Self {
        self.instrumentation = instrumentation;
        self
    }

    /// Appends `PIPES_AS_CONCAT` to the session `sql_mode`, making `||` concatenate.
    ///
    /// Enabled by default. Servers that refuse to change `sql_mode` need it off.
    pub fn pipes_as_concat(mut self, enabled: bool) -> Self {
        self.pipes_as_concat = enabled;
        self
    }

    /// Appends `NO_ENGINE_SUBSTITUTION` to the session `sql_mode`, so `CREATE TABLE` with
    /// an unavailable engine fails instead of silently using the default one.
    ///
    /// Enabled by default.
    pub fn no_engine_substitution(mut self, enabled: bool) -> Self {
        self.no_engine_substitution = enabled;
        self
    }

    /// Session `time_zone` set after connecting. `None` keeps the server's zone.
    ///
    /// Defaults to `+00:00`, so `TIMESTAMP` values are read and written in UTC.
    pub fn timezone(mut self, value: impl Into<Option<String>>) -> Self {
        self.timezone = value.into();
        self
    }

    /// Runs `SET NAMES` with [`charset`](Self::charset) and [`collation`](Self::collation)
    /// after connecting. Enabled by default.
    pub fn set_names(mut self, enabled: bool) -> Self {
        self.set_names = enabled;
        self
    }

    /// Adds a connection attribute, visible server side in
    /// `performance_schema.session_connect_attrs`.
    pub fn connect_attribute(mut self, key: &str, value: &str) -> Self {
        self.connect_attributes
            .insert(key.to_owned(), value.to_owned());
        self
    }

    /// Log every statement at `level`. Defaults to `Debug`.
    pub fn log_statements(mut self, level: LevelFilter) -> Self {
        self.log_settings.log_statements(level);
        self
    }

    /// Log statements running longer than `duration` at `level`. Defaults to `Warn` after 1 second.
    pub fn log_slow_statements(mut self, level: LevelFilter, duration: Duration) -> Self {
        self.log_settings.log_slow_statements(level, duration);
        self
    }

    /// Splits outbound packets at `size` bytes instead of the protocol's `0xFFFFFF`.
    #[doc(hidden)]
    pub fn packet_chunk_size(mut self, size: usize) -> Self {
        self.packet_chunk_size = Some(size);
        self
    }
}

impl MySqlConnectOptions {
    pub fn get_host(&self) -> &str {
        &self.host
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub fn get_username(&self) -> &str {
        &self.username
    }

    pub fn get_ssl_mode(&self) -> MySqlSslMode {
        self.ssl_mode
    }

    pub(crate) fn effective_max_rewrite_bytes(&self) -> usize {
        self.max_rewrite_statement_bytes
            .unwrap_or(self.max_allowed_packet)
    }

    pub(crate) fn fetch_mode(&self) -> FetchMode {
        FetchMode::resolve(self.fetch_size, self.use_cursor_fetch)
    }
}
