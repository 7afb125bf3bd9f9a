use std::fmt::{self, Debug, Display, Formatter};
use std::io;
use std::sync::Arc;

use either::Either;
use mywire_core::logger::QueryLogger;
use mywire_core::net::tls::MaybeTlsStream;
use mywire_core::net::Socket;

use crate::error::Error;
use crate::options::MySqlConnectOptions;
use crate::protocol::text::{Ping, Quit};
use crate::rewrite::lexer;
use crate::statement::{MySqlStatement, TextStatement};
use crate::{MySqlArguments, MySqlQueryResult, MySqlRow};

mod batch;
mod cancel;
pub(crate) mod codec;
pub(crate) mod compression;
mod establish;
mod executor;
pub(crate) mod instrument;
mod session;
mod statement_cache;
pub(crate) mod stream;
mod tls;

pub use batch::{BatchErrorPolicy, BatchOutcome, BatchResult};
pub use cancel::{KillQueryCanceller, QueryCanceller};
pub(crate) use establish::HandshakeEngine;
pub use executor::ResultStream;
pub use instrument::{InstrumentationOptions, PacketTimings};
pub use session::{IsolationLevel, ServerVersion, SessionState};

use executor::ExecuteTarget;
use statement_cache::StatementCache;
use stream::MySqlStream;

/// How long a cancellation, and the drain after it, may take when no statement timeout
/// bounds it.
const CANCEL_GRACE: std::time::Duration = std::time::Duration::from_secs(10);

/// A connection to a MySQL database.
///
/// Every operation takes `&mut self`: a connection runs one command at a time. If a
/// [`ResultStream`] is dropped before it is read to the end, the rest of the response is
/// read and discarded before the next command.
///
/// After a transport or protocol error, or a statement timeout that could not be cleanly
/// cancelled, the connection is *poisoned*: every further operation fails with
/// [`Error::ConnectionPoisoned`].
pub struct MySqlConnection {
    pub(crate) stream: MySqlStream,
    pub(crate) options: MySqlConnectOptions,
    pub(crate) statement_cache: StatementCache,
    canceller: Arc<dyn QueryCanceller>,
    poisoned: Option<String>,
}

impl MySqlConnection {
    pub(crate) fn new(stream: MySqlStream, options: &MySqlConnectOptions) -> Self {
        let canceller = match &options.query_canceller {
            Some(canceller) => Arc::clone(canceller),
            None => Arc::new(KillQueryCanceller::new(options)),
        };

        Self {
            stream,
            statement_cache: StatementCache::new(options.statement_cache_capacity),
            options: options.clone(),
            canceller,
            poisoned: None,
        }
    }

    /// Opens a connection as configured by `options`.
    pub async fn connect(options: &MySqlConnectOptions) -> Result<Self, Error> {
        options.connect().await
    }

    /// Runs the connection phase over an already connected transport, e.g. an in-memory
    /// pipe or a socket set up by the caller. TLS, if requested, is negotiated on top of it.
    pub async fn connect_with_socket<S: Socket>(
        socket: S,
        options: &MySqlConnectOptions,
    ) -> Result<Self, Error> {
        options.connect_socket(MaybeTlsStream::new(socket)).await
    }

    /// What is known about the server session.
    pub fn session(&self) -> &SessionState {
        &self.stream.session
    }

    /// The connection id the server assigned to this connection.
    pub fn thread_id(&self) -> u32 {
        self.stream.session.thread_id
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    /// Number of prepared statements currently held in the statement cache.
    pub fn cached_statements(&self) -> usize {
        self.statement_cache.len()
    }

    /// Fails if the connection is poisoned, then finishes reading whatever is left of the
    /// previous command's response.
    pub(crate) async fn ready(&mut self) -> Result<(), Error> {
        if let Some(reason) = &self.poisoned {
            return Err(Error::ConnectionPoisoned(reason.clone()));
        }

        let ready = self.stream.wait_until_ready().await;
        self.poison_if_fatal(ready)
    }

    pub(crate) fn poison(&mut self, reason: impl Display) {
        if self.poisoned.is_none() {
            let reason = reason.to_string();

            tracing::warn!(thread_id = self.thread_id(), %reason, "connection is no longer usable");

            self.poisoned = Some(reason);
        }
    }

    /// Poisons the connection if `result` failed in a way that leaves the protocol state
    /// unknown.
    pub(crate) fn poison_if_fatal<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        if let Err(error) = &result {
            if error.is_fatal() {
                self.poison(error);
            }
        }

        result
    }

    /// Cancels the statement that outlived its deadline and drains its response.
    ///
    /// Poisons the connection if either step fails: the protocol state is then unknown.
    pub(crate) async fn cancel_timed_out(&mut self) {
        let thread_id = self.thread_id();
        let grace = self.options.statement_timeout.unwrap_or(CANCEL_GRACE);
        let canceller = Arc::clone(&self.canceller);

        tracing::warn!(thread_id, "statement exceeded its deadline; cancelling");

        let cancelled = match tokio::time::timeout(grace, canceller.cancel(thread_id)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "cancellation timed out").into()),
        };

        if let Err(error) = cancelled {
            self.poison(format_args!("failed to cancel a timed out statement: {error}"));
            return;
        }

        // the cancelled statement still ends with its result or with ER_QUERY_INTERRUPTED
        match tokio::time::timeout(grace, self.stream.wait_until_ready()).await {
            Ok(Ok(())) => {}

            // usually ER_QUERY_INTERRUPTED
            Ok(Err(Error::Database(error))) => {
                tracing::debug!(thread_id, %error, "cancelled statement ended with an error");
            }

            Ok(Err(error)) => {
                self.poison(format_args!("failed to drain a cancelled statement: {error}"));
            }
            Err(_) => self.poison("timed out draining a cancelled statement"),
        }
    }

    /// Checks that the connection is alive with `COM_PING`.
    pub async fn ping(&mut self) -> Result<(), Error> {
        self.ready().await?;

        // https://dev.mysql.com/doc/internals/en/com-ping.html
        let pinged = async {
            self.stream.send_packet(Ping).await?;
            self.stream.recv_ok().await
        }
        .await;

        self.poison_if_fatal(pinged).map(drop)
    }

    /// Closes every cached statement, says goodbye with `COM_QUIT` and shuts the transport
    /// down.
    pub async fn close(mut self) -> Result<(), Error> {
        if self.poisoned.is_some() {
            return self.stream.shutdown().await;
        }

        for handle in self.statement_cache.drain() {
            self.stream.pending_closes.push(handle.id);
        }

        if let Err(error) = self.stream.wait_until_ready().await {
            if error.is_fatal() {
                return Err(error);
            }

            tracing::warn!(thread_id = self.thread_id(), %error, "previous command failed while closing");
        }

        self.stream.send_packet(Quit).await?;
        self.stream.shutdown().await
    }

    /// Runs `sql` through the text protocol.
    pub async fn query<'c>(&'c mut self, sql: &'c str) -> Result<ResultStream<'c>, Error> {
        self.run(sql, None).await
    }

    /// Runs `sql` with parameters: through a cached server-side prepared statement, or by
    /// interpolating the arguments client side if server-side preparation is disabled.
    pub async fn query_with<'c>(
        &'c mut self,
        sql: &'c str,
        arguments: &MySqlArguments,
    ) -> Result<ResultStream<'c>, Error> {
        self.run(sql, Some(arguments)).await
    }

    /// Runs `sql`, discarding rows, and returns the combined results of every statement.
    pub async fn execute(&mut self, sql: &str) -> Result<MySqlQueryResult, Error> {
        let results = self.run(sql, None).await?;
        collect_results(results).await
    }

    pub async fn execute_with(
        &mut self,
        sql: &str,
        arguments: &MySqlArguments,
    ) -> Result<MySqlQueryResult, Error> {
        let results = self.run(sql, Some(arguments)).await?;
        collect_results(results).await
    }

    pub async fn fetch_all(&mut self, sql: &str) -> Result<Vec<MySqlRow>, Error> {
        let results = self.run(sql, None).await?;
        collect_rows(results).await
    }

    pub async fn fetch_all_with(
        &mut self,
        sql: &str,
        arguments: &MySqlArguments,
    ) -> Result<Vec<MySqlRow>, Error> {
        let results = self.run(sql, Some(arguments)).await?;
        collect_rows(results).await
    }

    /// Returns the first row, failing with [`Error::RowNotFound`] if there is none.
    pub async fn fetch_one(&mut self, sql: &str) -> Result<MySqlRow, Error> {
        self.fetch_optional(sql).await?.ok_or(Error::RowNotFound)
    }

    pub async fn fetch_one_with(
        &mut self,
        sql: &str,
        arguments: &MySqlArguments,
    ) -> Result<MySqlRow, Error> {
        self.fetch_optional_with(sql, arguments)
            .await?
            .ok_or(Error::RowNotFound)
    }

    /// Returns the first row, if any. The rest of the response is discarded.
    pub async fn fetch_optional(&mut self, sql: &str) -> Result<Option<MySqlRow>, Error> {
        let results = self.run(sql, None).await?;
        first_row(results).await
    }

    pub async fn fetch_optional_with(
        &mut self,
        sql: &str,
        arguments: &MySqlArguments,
    ) -> Result<Option<MySqlRow>, Error> {
        let results = self.run(sql, Some(arguments)).await?;
        first_row(results).await
    }

    /// Resolves `sql` into a statement to execute with
    /// [`execute_statement`](Self::execute_statement).
    ///
    /// With server-side preparation enabled the statement is prepared (or taken from the
    /// statement cache) and its handle checked out until it is
    /// [released](Self::release_statement). Otherwise it is kept as text.
    pub async fn prepare(&mut self, sql: &str) -> Result<MySqlStatement, Error> {
        self.ready().await?;

        if !self.options.use_server_prep_stmts {
            let param_count =
                lexer::placeholders(sql, self.stream.session.no_backslash_escapes()).len();

            return Ok(MySqlStatement::Text(TextStatement {
                sql: sql.to_owned(),
                param_count,
            }));
        }

        let is_call = lexer::first_keyword(sql).is_some_and(|word| word.eq_ignore_ascii_case("CALL"));
        let handle = self.acquire_statement(sql).await?;

        Ok(if is_call {
            MySqlStatement::StoredProcedureCall(handle)
        } else {
            MySqlStatement::BinaryPrepared(handle)
        })
    }

    /// Executes a statement returned by [`prepare`](Self::prepare).
    ///
    /// Fails with [`Error::InvalidArgument`] if the statement was closed or the number of
    /// arguments does not match its placeholders.
    pub async fn execute_statement<'c>(
        &'c mut self,
        statement: &'c MySqlStatement,
        arguments: &MySqlArguments,
    ) -> Result<ResultStream<'c>, Error> {
        self.ready().await?;

        let logger = QueryLogger::new(statement.sql(), self.thread_id(), self.options.log_settings.clone());

        match statement {
            MySqlStatement::Text(text) => {
                if arguments.is_empty() && text.param_count == 0 {
                    return self.start_query(&text.sql, logger).await;
                }

                let sql = lexer::interpolate(
                    &text.sql,
                    arguments,
                    self.stream.session.no_backslash_escapes(),
                )?;

                self.start_query(&sql, logger).await
            }

            MySqlStatement::BinaryPrepared(handle) | MySqlStatement::StoredProcedureCall(handle) => {
                let target = ExecuteTarget::of(handle)?;
                self.start_execute(target, arguments, logger, None).await
            }
        }
    }

    /// Executes a prepared statement with a read-only server-side cursor. Rows are then
    /// pulled with [`fetch`](Self::fetch).
    ///
    /// Returns whether the server opened a cursor; it does not for statements without a
    /// result set.
    pub async fn open_cursor(
        &mut self,
        statement: &MySqlStatement,
        arguments: &MySqlArguments,
    ) -> Result<bool, Error> {
        self.ready().await?;

        let handle = statement.handle().ok_or_else(|| {
            Error::InvalidArgument("cursors need a server-side prepared statement".into())
        })?;

        let opened = self.start_cursor(ExecuteTarget::of(handle)?, arguments).await;
        self.poison_if_fatal(opened)
    }

    /// Pulls up to `rows` rows from the cursor opened by [`open_cursor`](Self::open_cursor).
    ///
    /// The stream ends with a result whose status has
    /// [`LAST_ROW_SENT`][crate::protocol::Status::LAST_ROW_SENT] set once the cursor is
    /// exhausted.
    pub async fn fetch<'c>(
        &'c mut self,
        statement: &'c MySqlStatement,
        rows: u32,
    ) -> Result<ResultStream<'c>, Error> {
        self.ready().await?;

        let handle = statement.handle().ok_or_else(|| {
            Error::InvalidArgument("cursors need a server-side prepared statement".into())
        })?;

        self.start_fetch(handle, rows).await
    }

    /// Gives a statement back. Poolable handles return to the statement cache; others are
    /// closed.
    pub async fn release_statement(&mut self, statement: MySqlStatement) -> Result<(), Error> {
        if let Some(handle) = statement.into_handle() {
            self.release_handle(handle);
        }

        self.ready().await
    }

    /// Closes the server side of a statement with `COM_STMT_CLOSE`.
    ///
    /// Closing is idempotent: a closed statement is not closed again, and executing it fails.
    pub async fn close_statement(&mut self, statement: &mut MySqlStatement) -> Result<(), Error> {
        let Some(handle) = statement.handle_mut() else {
            return Ok(());
        };

        if handle.closed {
            return Ok(());
        }

        handle.closed = true;
        self.stream.pending_closes.push(handle.id);

        self.ready().await
    }

    /// Turns autocommit on or off.
    ///
    /// With `use_local_session_state` the statement is skipped if the session is known to
    /// be in that mode already.
    pub async fn set_autocommit(&mut self, autocommit: bool) -> Result<(), Error> {
        if self.options.use_local_session_state && self.stream.session.autocommit == autocommit {
            return Ok(());
        }

        // the server reports the new mode in the status flags of its OK
        self.execute(if autocommit {
            "SET autocommit=1"
        } else {
            "SET autocommit=0"
        })
        .await
        .map(drop)
    }

    /// Sets the isolation level of the following transactions of this session.
    pub async fn set_transaction_isolation(&mut self, level: IsolationLevel) -> Result<(), Error> {
        if self.options.use_local_session_state && self.stream.session.isolation == Some(level) {
            return Ok(());
        }

        let sql = format!("SET SESSION TRANSACTION ISOLATION LEVEL {}", level.as_sql());
        self.execute(&sql).await?;

        self.stream.session.isolation = Some(level);

        Ok(())
    }

    /// The isolation level of the session, asked from the server unless it is known locally
    /// and `use_local_session_state` is set.
    pub async fn transaction_isolation(&mut self) -> Result<IsolationLevel, Error> {
        if self.options.use_local_session_state {
            if let Some(level) = self.stream.session.isolation {
                return Ok(level);
            }
        }

        let sql = format!("SELECT @@session.{}", self.stream.session.isolation_variable());
        let level: String = self.fetch_one(&sql).await?.try_get(0)?;
        let level: IsolationLevel = level.parse()?;

        self.stream.session.isolation = Some(level);

        Ok(level)
    }

    /// Makes the following transactions of this session read-only or read-write.
    pub async fn set_read_only(&mut self, read_only: bool) -> Result<(), Error> {
        if self.options.use_local_session_state && self.stream.session.read_only == read_only {
            return Ok(());
        }

        self.execute(if read_only {
            "SET SESSION TRANSACTION READ ONLY"
        } else {
            "SET SESSION TRANSACTION READ WRITE"
        })
        .await?;

        self.stream.session.read_only = read_only;

        Ok(())
    }

    /// The packets kept by the debug buffer, oldest first, as a hex dump.
    ///
    /// Empty unless [`InstrumentationOptions::debug_buffer_packets`] is set.
    pub fn packet_dump(&self) -> String {
        self.stream.chain.dump()
    }

    /// When packets were last sent and received.
    ///
    /// Only recorded while [`InstrumentationOptions::track_timing`] is set.
    pub fn packet_timings(&self) -> PacketTimings {
        self.stream.chain.timings()
    }

    pub fn instrumentation(&self) -> &InstrumentationOptions {
        self.stream.chain.options()
    }

    /// Names of the packet layers a read goes through, outermost first.
    pub fn instrumentation_layers(&self) -> Vec<&'static str> {
        self.stream.chain.layers()
    }

    /// Re-composes the packet instrumentation. Takes effect with the next packet.
    pub fn set_instrumentation(&mut self, options: InstrumentationOptions) {
        let chain = std::mem::replace(
            &mut self.stream.chain,
            instrument::PacketChain::new(&InstrumentationOptions::default()),
        );

        self.stream.chain = chain.rebuild(&options);
    }
}

impl Debug for MySqlConnection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlConnection")
            .field("thread_id", &self.thread_id())
            .field("server_version", &self.stream.session.server_version.raw)
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

async fn collect_results(mut results: ResultStream<'_>) -> Result<MySqlQueryResult, Error> {
    let mut done = MySqlQueryResult::default();

    while let Some(item) = results.next().await? {
        if let Either::Left(result) = item {
            done.extend(Some(result));
        }
    }

    Ok(done)
}

async fn collect_rows(mut results: ResultStream<'_>) -> Result<Vec<MySqlRow>, Error> {
    let mut rows = Vec::new();

    while let Some(item) = results.next().await? {
        if let Either::Right(row) = item {
            rows.push(row);
        }
    }

    Ok(rows)
}

async fn first_row(mut results: ResultStream<'_>) -> Result<Option<MySqlRow>, Error> {
    while let Some(item) = results.next().await? {
        if let Either::Right(row) = item {
            return Ok(Some(row));
        }
    }

    Ok(None)
}
