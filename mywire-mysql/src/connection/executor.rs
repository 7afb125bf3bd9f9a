use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use either::Either;
use futures_core::Stream;
use mywire_core::logger::QueryLogger;
use tokio::time::Instant;

use crate::column::MySqlColumn;
use crate::connection::stream::Busy;
use crate::connection::MySqlConnection;
use crate::error::Error;
use crate::protocol::response::EofPacket;
use crate::protocol::statement::{
    BinaryRow, CursorType, Execute as StatementExecute, Prepare, PrepareOk, StmtFetch,
};
use crate::protocol::text::{ColumnDefinition, Query, TextRow};
use crate::protocol::{Packet, Status};
use crate::rewrite::lexer;
use crate::statement::{FetchMode, PreparedStatementHandle};
use crate::{MySqlArguments, MySqlQueryResult, MySqlRow, MySqlValueFormat};

/// What a prepared execution needs from its handle.
#[derive(Debug, Copy, Clone)]
pub(crate) struct ExecuteTarget {
    statement: u32,
    param_count: usize,
    fetch_mode: FetchMode,
    produces_result_set: bool,
}

impl ExecuteTarget {
    pub(crate) fn of(handle: &PreparedStatementHandle) -> Result<Self, Error> {
        if handle.closed {
            return Err(Error::InvalidArgument(format!(
                "prepared statement {} is closed",
                handle.id
            )));
        }

        Ok(Self {
            statement: handle.id,
            param_count: handle.param_count,
            fetch_mode: handle.fetch_mode,
            produces_result_set: handle.produces_result_set(),
        })
    }

    fn check_arguments(&self, arguments: &MySqlArguments) -> Result<(), Error> {
        if arguments.len() == self.param_count {
            return Ok(());
        }

        Err(Error::InvalidArgument(format!(
            "prepared statement {} expects {} parameters, {} were bound",
            self.statement,
            self.param_count,
            arguments.len()
        )))
    }
}

impl MySqlConnection {
    async fn prepare_handle(&mut self, sql: &str) -> Result<PreparedStatementHandle, Error> {
        // https://dev.mysql.com/doc/internals/en/com-stmt-prepare.html
        // https://dev.mysql.com/doc/internals/en/com-stmt-prepare-response.html#packet-COM_STMT_PREPARE_OK

        self.stream.send_packet(Prepare { query: sql }).await?;

        let ok: PrepareOk = self.stream.recv().await?;

        // parameter definitions carry little more than a count; they are kept for inspection
        let params = self.recv_definitions(ok.params).await?;
        let columns = self.recv_definitions(ok.columns).await?;

        tracing::debug!(
            statement = ok.statement_id,
            params = ok.params,
            columns = ok.columns,
            warnings = ok.warnings,
            "prepared statement"
        );

        Ok(PreparedStatementHandle {
            id: ok.statement_id,
            sql: sql.to_owned(),
            param_count: usize::from(ok.params),
            params: Arc::new(params),
            column_names: Arc::new(column_names(&columns)),
            columns: Arc::new(columns),
            poolable: true,
            closed: false,
            fetch_mode: self.options.fetch_mode(),
        })
    }

    async fn recv_definitions(&mut self, count: u16) -> Result<Vec<MySqlColumn>, Error> {
        let mut columns = Vec::with_capacity(usize::from(count));

        if count > 0 {
            for ordinal in 0..usize::from(count) {
                let def: ColumnDefinition = self.stream.recv().await?;
                columns.push(MySqlColumn::from_definition(ordinal, &def));
            }

            self.stream.maybe_recv_eof().await?;
        }

        Ok(columns)
    }

    /// Checks a handle for `sql` out of the statement cache, preparing it on a miss.
    pub(crate) async fn acquire_statement(
        &mut self,
        sql: &str,
    ) -> Result<PreparedStatementHandle, Error> {
        if let Some(handle) = self.statement_cache.take(sql) {
            tracing::trace!(statement = handle.id, "statement cache hit");
            return Ok(handle);
        }

        let prepared = self.prepare_handle(sql).await;
        self.poison_if_fatal(prepared)
    }

    /// Gives a handle back to the statement cache.
    ///
    /// Does no I/O: handles that must be closed are closed before the next command.
    pub(crate) fn release_handle(&mut self, handle: PreparedStatementHandle) {
        if let Some(evicted) = self.statement_cache.put(handle) {
            tracing::trace!(statement = evicted.id, "closing prepared statement");
            self.stream.pending_closes.push(evicted.id);
        }
    }

    /// Sends `sql` (or a prepared execution of it, if arguments are given) and returns the
    /// stream of its results.
    pub(crate) async fn run<'c>(
        &'c mut self,
        sql: &'c str,
        arguments: Option<&MySqlArguments>,
    ) -> Result<ResultStream<'c>, Error> {
        self.ready().await?;

        let logger = QueryLogger::new(sql, self.thread_id(), self.options.log_settings.clone());

        match arguments {
            Some(arguments) if self.options.use_server_prep_stmts => {
                let handle = self.acquire_statement(sql).await?;

                match ExecuteTarget::of(&handle) {
                    Ok(target) => self.start_execute(target, arguments, logger, Some(handle)).await,
                    Err(error) => {
                        self.release_handle(handle);
                        Err(error)
                    }
                }
            }

            Some(arguments) => {
                let sql =
                    lexer::interpolate(sql, arguments, self.stream.session.no_backslash_escapes())?;

                self.start_query(&sql, logger).await
            }

            None => self.start_query(sql, logger).await,
        }
    }

    pub(crate) async fn start_query<'c>(
        &'c mut self,
        sql: &str,
        logger: QueryLogger<'c>,
    ) -> Result<ResultStream<'c>, Error> {
        // https://dev.mysql.com/doc/internals/en/com-query.html
        self.send_command(Query(sql)).await?;
        self.stream.busy = Busy::Result;

        Ok(ResultStream::new(self, logger, MySqlValueFormat::Text))
    }

    /// Runs `COM_STMT_EXECUTE` for `target`. A leased handle goes back to the cache when the
    /// returned stream is finished or dropped.
    pub(crate) async fn start_execute<'c>(
        &'c mut self,
        target: ExecuteTarget,
        arguments: &MySqlArguments,
        logger: QueryLogger<'c>,
        lease: Option<PreparedStatementHandle>,
    ) -> Result<ResultStream<'c>, Error> {
        if let Err(error) = target.check_arguments(arguments) {
            if let Some(handle) = lease {
                self.release_handle(handle);
            }

            return Err(error);
        }

        let cursor = match target.fetch_mode {
            FetchMode::Cursor(rows) if target.produces_result_set => Some(Cursor {
                statement: target.statement,
                rows,
            }),
            _ => None,
        };

        // https://dev.mysql.com/doc/internals/en/com-stmt-execute.html
        let sent = self
            .send_command(StatementExecute {
                statement: target.statement,
                cursor: if cursor.is_some() {
                    CursorType::ReadOnly
                } else {
                    CursorType::NoCursor
                },
                arguments,
            })
            .await;

        if let Err(error) = sent {
            if let Some(handle) = lease {
                self.release_handle(handle);
            }

            return Err(error);
        }

        self.stream.busy = Busy::Result;

        let mut results = ResultStream::new(self, logger, MySqlValueFormat::Binary);
        results.lease = lease;
        results.cursor = cursor;

        Ok(results)
    }

    /// Requests `rows` more rows from the open cursor of `handle`.
    pub(crate) async fn start_fetch<'c>(
        &'c mut self,
        handle: &'c PreparedStatementHandle,
        rows: u32,
    ) -> Result<ResultStream<'c>, Error> {
        let target = ExecuteTarget::of(handle)?;
        let logger = QueryLogger::new(&handle.sql, self.thread_id(), self.options.log_settings.clone());

        // https://dev.mysql.com/doc/internals/en/com-stmt-fetch.html
        self.send_command(StmtFetch {
            statement: target.statement,
            rows,
        })
        .await?;

        self.stream.busy = Busy::Row;

        let mut results = ResultStream::new(self, logger, MySqlValueFormat::Binary);
        results.columns = Arc::clone(&handle.columns);
        results.column_names = Arc::clone(&handle.column_names);
        results.phase = Phase::Rows;

        Ok(results)
    }

    /// Executes `target` with a read-only cursor and reads the response up to the first
    /// row. Returns whether the server opened a cursor.
    pub(crate) async fn start_cursor(
        &mut self,
        target: ExecuteTarget,
        arguments: &MySqlArguments,
    ) -> Result<bool, Error> {
        target.check_arguments(arguments)?;

        self.send_command(StatementExecute {
            statement: target.statement,
            cursor: CursorType::ReadOnly,
            arguments,
        })
        .await?;

        self.stream.busy = Busy::Result;

        let packet = self.stream.recv_packet().await?;

        if packet.is_ok() {
            // no result set, nothing to fetch
            let ok = packet.ok()?;
            self.stream.session.apply_status(ok.status);
            self.stream.busy = Busy::NotBusy;

            return Ok(false);
        }

        self.stream.busy = Busy::Row;

        let (_, eof) = self.stream.recv_column_definitions(packet).await?;

        let eof = match eof {
            Some(eof) => eof,
            None => {
                let packet = self.stream.recv_packet().await?;

                if !packet.is_eof(self.stream.capabilities()) {
                    // rows are coming; they are drained before the next command
                    return Ok(false);
                }

                self.stream.end_of_rows(packet)?
            }
        };

        if eof.status.contains(Status::CURSOR_EXISTS) {
            self.stream.busy = Busy::NotBusy;
            return Ok(true);
        }

        Ok(false)
    }

    async fn send_command<T>(&mut self, command: T) -> Result<(), Error>
    where
        T: crate::io::ProtocolEncode,
    {
        let sent = self.stream.send_packet(command).await;
        self.poison_if_fatal(sent)
    }
}

fn column_names(columns: &[MySqlColumn]) -> HashMap<String, usize> {
    // the first of several equally named columns wins
    columns
        .iter()
        .rev()
        .map(|column| (column.name.clone(), column.ordinal))
        .collect()
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Phase {
    // expecting OK, ERR or the header of a result set
    Header,
    Rows,
    Done,
}

#[derive(Debug, Copy, Clone)]
struct Cursor {
    statement: u32,
    rows: u32,
}

/// The results of one command: zero or more result sets, each ending with a
/// [`MySqlQueryResult`], or a single [`MySqlQueryResult`] for statements without rows.
///
/// Rows are decoded as they are read; nothing is buffered. A stream that is dropped before
/// the end is drained before the connection sends its next command.
///
/// With a [statement timeout][crate::MySqlConnectOptions::statement_timeout], waiting for the
/// server past the deadline cancels the statement and fails with
/// [`Error::StatementTimeout`].
pub struct ResultStream<'c> {
    conn: &'c mut MySqlConnection,
    logger: QueryLogger<'c>,
    format: MySqlValueFormat,
    phase: Phase,
    columns: Arc<Vec<MySqlColumn>>,
    column_names: Arc<HashMap<String, usize>>,
    cursor: Option<Cursor>,
    lease: Option<PreparedStatementHandle>,
    deadline: Option<Instant>,
}

impl<'c> ResultStream<'c> {
    fn new(conn: &'c mut MySqlConnection, logger: QueryLogger<'c>, format: MySqlValueFormat) -> Self {
        let deadline = conn.options.statement_timeout.map(|timeout| Instant::now() + timeout);

        Self {
            conn,
            logger,
            format,
            phase: Phase::Header,
            columns: Arc::default(),
            column_names: Arc::default(),
            cursor: None,
            lease: None,
            deadline,
        }
    }

    /// Reads the next row or end of result.
    ///
    /// Returns `Ok(None)` once the response to the command has been read completely.
    pub async fn next(&mut self) -> Result<Option<Either<MySqlQueryResult, MySqlRow>>, Error> {
        if self.phase == Phase::Done {
            return Ok(None);
        }

        match self.step().await {
            Ok(item) => {
                if self.phase == Phase::Done {
                    self.finish();
                }

                Ok(item)
            }

            Err(error) => {
                self.phase = Phase::Done;

                if error.is_fatal() {
                    self.conn.poison(&error);
                }

                self.finish();

                Err(error)
            }
        }
    }

    /// Columns of the current result set.
    pub fn columns(&self) -> &[MySqlColumn] {
        &self.columns
    }

    /// Adapts this into a [`Stream`].
    pub fn into_stream(
        self,
    ) -> impl Stream<Item = Result<Either<MySqlQueryResult, MySqlRow>, Error>> + 'c {
        futures_util::stream::try_unfold(self, |mut results| async move {
            Ok::<_, Error>(results.next().await?.map(|item| (item, results)))
        })
    }

    async fn step(&mut self) -> Result<Option<Either<MySqlQueryResult, MySqlRow>>, Error> {
        let capabilities = self.conn.stream.capabilities();

        loop {
            match self.phase {
                Phase::Done => return Ok(None),

                Phase::Header => {
                    // the response is one of: OK, ERR or a result set
                    let packet = self.recv().await?;

                    if packet.is_ok() {
                        let ok = packet.ok()?;

                        self.conn.stream.session.apply_status(ok.status);
                        self.logger.increase_rows_affected(ok.affected_rows);

                        if !ok.status.has_more() {
                            self.conn.stream.busy = Busy::NotBusy;
                            self.phase = Phase::Done;
                        }

                        return Ok(Some(Either::Left(ok.into())));
                    }

                    // otherwise this is the start of the result set metadata
                    self.conn.stream.busy = Busy::Row;

                    let (definitions, eof) =
                        self.conn.stream.recv_column_definitions(packet).await?;

                    self.set_columns(&definitions);
                    self.phase = Phase::Rows;

                    if self.cursor.is_none() {
                        continue;
                    }

                    // the status after the metadata tells whether a cursor was opened
                    let eof = match eof {
                        Some(eof) => eof,
                        None => {
                            let packet = self.recv().await?;

                            if !packet.is_eof(capabilities) {
                                self.cursor = None;
                                return self.decode_row(packet).map(|row| Some(Either::Right(row)));
                            }

                            let eof = self.conn.stream.end_of_rows(packet)?;

                            if !eof.status.contains(Status::CURSOR_EXISTS) {
                                // that was the end of an empty result set
                                self.cursor = None;
                                return Ok(Some(self.end_result_set(&eof)));
                            }

                            eof
                        }
                    };

                    if eof.status.contains(Status::CURSOR_EXISTS) {
                        self.request_rows().await?;
                    } else {
                        self.cursor = None;
                    }
                }

                Phase::Rows => {
                    let packet = self.recv().await?;

                    if !packet.is_eof(capabilities) {
                        return self.decode_row(packet).map(|row| Some(Either::Right(row)));
                    }

                    let eof = self.conn.stream.end_of_rows(packet)?;

                    if self.cursor.is_some() && !eof.status.contains(Status::LAST_ROW_SENT) {
                        self.request_rows().await?;
                        continue;
                    }

                    return Ok(Some(self.end_result_set(&eof)));
                }
            }
        }
    }

    async fn recv(&mut self) -> Result<Packet<Bytes>, Error> {
        let Some(deadline) = self.deadline else {
            return self.conn.stream.recv_packet().await;
        };

        match tokio::time::timeout_at(deadline, self.conn.stream.recv_packet()).await {
            Ok(result) => result,

            Err(_) => {
                self.deadline = None;

                let idle = self.conn.stream.chain.timings().since_last_activity();
                self.conn.cancel_timed_out().await;

                Err(Error::StatementTimeout { idle })
            }
        }
    }

    async fn request_rows(&mut self) -> Result<(), Error> {
        let Some(cursor) = self.cursor else {
            return Ok(());
        };

        // the previous batch was read completely
        self.conn.stream.busy = Busy::NotBusy;

        self.conn
            .send_command(StmtFetch {
                statement: cursor.statement,
                rows: cursor.rows,
            })
            .await?;

        self.conn.stream.busy = Busy::Row;

        Ok(())
    }

    fn set_columns(&mut self, definitions: &[ColumnDefinition]) {
        let columns: Vec<MySqlColumn> = definitions
            .iter()
            .enumerate()
            .map(|(ordinal, def)| MySqlColumn::from_definition(ordinal, def))
            .collect();

        self.column_names = Arc::new(column_names(&columns));
        self.columns = Arc::new(columns);
    }

    fn decode_row(&mut self, packet: Packet<Bytes>) -> Result<MySqlRow, Error> {
        let row = match self.format {
            MySqlValueFormat::Binary => packet.decode_with::<BinaryRow, _>(&self.columns[..])?.0,
            MySqlValueFormat::Text => packet.decode_with::<TextRow, _>(&self.columns[..])?.0,
        };

        self.logger.increment_rows_returned();

        Ok(MySqlRow {
            row,
            format: self.format,
            columns: Arc::clone(&self.columns),
            column_names: Arc::clone(&self.column_names),
        })
    }

    fn end_result_set(&mut self, eof: &EofPacket) -> Either<MySqlQueryResult, MySqlRow> {
        if eof.status.has_more() {
            self.conn.stream.busy = Busy::Result;
            self.phase = Phase::Header;
        } else {
            self.conn.stream.busy = Busy::NotBusy;
            self.phase = Phase::Done;
        }

        Either::Left(MySqlQueryResult {
            warnings: eof.warnings,
            status: eof.status,
            ..MySqlQueryResult::default()
        })
    }

    fn finish(&mut self) {
        if let Some(handle) = self.lease.take() {
            self.conn.release_handle(handle);
        }

        self.logger.finish();
    }
}

impl Drop for ResultStream<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.lease.take() {
            self.conn.release_handle(handle);
        }
    }
}
