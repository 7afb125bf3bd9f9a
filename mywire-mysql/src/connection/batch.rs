use std::borrow::Cow;
use std::ops::Range;

use crate::connection::{collect_results, MySqlConnection};
use crate::error::Error;
use crate::rewrite::{lexer, plan_statements, BatchDescriptor, Planned};
use crate::{MySqlArguments, MySqlQueryResult};

/// What happens to the rest of a batch after one of its statements fails.
///
/// Errors that leave the connection unusable stop the batch under either policy.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum BatchErrorPolicy {
    /// Mark the failed statements and skip everything after them. The rows of a failed
    /// rewritten statement are all marked [`BatchOutcome::GroupFailed`].
    #[default]
    AbortRemaining,

    /// Re-run a failed rewritten statement one original statement at a time, then carry on
    /// with the rest of the batch.
    ///
    /// Rows a failed multi-row `INSERT` already wrote before the error are not rolled back
    /// unless the batch runs inside a transaction, so the retry may hit them again.
    RetryIndividually,
}

/// The fate of one original statement of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Success {
        /// Rows changed by this statement; `None` if it ran as part of a rewritten
        /// statement whose total cannot be attributed to single rows.
        rows_affected: Option<u64>,

        /// The `AUTO_INCREMENT` id generated for this statement.
        ///
        /// For rewritten statements it is reconstructed from the first id the server
        /// reported, stepping by `auto_increment_increment` per row.
        generated_id: Option<u64>,
    },
    /// The server rejected this statement.
    Failed,

    /// This statement ran inside a rewritten statement covering `rows` that failed as a
    /// whole. The server reports a single error for all of them, so it is not known which
    /// of them caused it.
    GroupFailed { rows: Range<usize> },
    NotExecuted,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchOutcome::Success { .. })
    }
}

/// Per-statement results of a batch, together with the first error it ran into.
#[derive(Debug)]
pub struct BatchResult {
    outcomes: Vec<BatchOutcome>,
    first_error: Option<Error>,
    statements_sent: usize,
    rows_affected: u64,
}

impl BatchResult {
    fn new(len: usize) -> Self {
        Self {
            outcomes: vec![BatchOutcome::NotExecuted; len],
            first_error: None,
            statements_sent: 0,
            rows_affected: 0,
        }
    }

    /// One entry per original statement, in batch order.
    pub fn outcomes(&self) -> &[BatchOutcome] {
        &self.outcomes
    }

    pub fn first_error(&self) -> Option<&Error> {
        self.first_error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<Error> {
        self.first_error.take()
    }

    /// Whether every statement succeeded.
    pub fn is_success(&self) -> bool {
        self.first_error.is_none() && self.outcomes.iter().all(BatchOutcome::is_success)
    }

    /// Statements sent to the server, counting each rewritten statement once.
    pub fn statements_sent(&self) -> usize {
        self.statements_sent
    }

    /// Total rows changed by the statements that succeeded.
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// The ids generated by successful statements, in batch order.
    pub fn generated_ids(&self) -> Vec<u64> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                BatchOutcome::Success { generated_id, .. } => *generated_id,
                _ => None,
            })
            .collect()
    }

    fn record(&mut self, rows: Range<usize>, done: &MySqlQueryResult, increment: u64) {
        let count = rows.len();

        let rows_affected = if count == 1 {
            Some(done.rows_affected)
        } else if u64::try_from(count).ok() == Some(done.rows_affected) {
            Some(1)
        } else {
            // e.g. ON DUPLICATE KEY UPDATE counts updated rows twice
            None
        };

        let mut id = done.last_insert_id;

        for idx in rows {
            self.outcomes[idx] = BatchOutcome::Success {
                rows_affected,
                generated_id: (id != 0).then_some(id),
            };

            if id != 0 {
                id = id.saturating_add(increment);
            }
        }

        self.rows_affected += done.rows_affected;
    }

    fn fail(&mut self, rows: Range<usize>, error: Error) {
        let outcome = if rows.len() == 1 {
            BatchOutcome::Failed
        } else {
            BatchOutcome::GroupFailed { rows: rows.clone() }
        };

        for idx in rows {
            self.outcomes[idx] = outcome.clone();
        }

        if self.first_error.is_none() {
            self.first_error = Some(error);
        } else {
            tracing::debug!(%error, "further error in batch");
        }
    }
}

// where the original statements of a batch come from
#[derive(Copy, Clone)]
enum Source<'a> {
    Template {
        sql: &'a str,
        parameter_sets: &'a [MySqlArguments],
    },
    Statements(&'a [String]),
}

impl<'a> Source<'a> {
    fn len(self) -> usize {
        match self {
            Source::Template { parameter_sets, .. } => parameter_sets.len(),
            Source::Statements(statements) => statements.len(),
        }
    }

    fn unit(self, idx: usize) -> Unit<'a> {
        match self {
            Source::Template {
                sql,
                parameter_sets,
            } => Unit {
                sql: Cow::Borrowed(sql),
                arguments: Some(Cow::Borrowed(&parameter_sets[idx])),
                rows: idx..idx + 1,
            },

            Source::Statements(statements) => Unit {
                sql: Cow::Borrowed(&statements[idx]),
                arguments: None,
                rows: idx..idx + 1,
            },
        }
    }

    fn units(self) -> Vec<Unit<'a>> {
        (0..self.len()).map(|idx| self.unit(idx)).collect()
    }
}

// one statement sent on behalf of the original statements in `rows`
struct Unit<'a> {
    sql: Cow<'a, str>,
    arguments: Option<Cow<'a, MySqlArguments>>,
    rows: Range<usize>,
}

impl MySqlConnection {
    /// Runs `sql` once per parameter set.
    ///
    /// With [`rewrite_batched_statements`][crate::MySqlConnectOptions::rewrite_batched_statements]
    /// enabled, a single-row `INSERT`/`REPLACE` template is sent as multi-row statements, split
    /// to stay within [`max_rewrite_statement_bytes`][crate::MySqlConnectOptions::max_rewrite_statement_bytes]
    /// and the prepared statement placeholder limit. Templates that might behave differently
    /// when rewritten run statement by statement.
    ///
    /// Statement failures are reported in the returned [`BatchResult`] as configured by the
    /// [`BatchErrorPolicy`]. An `Err` means nothing was executed.
    pub async fn execute_batch(
        &mut self,
        sql: &str,
        parameter_sets: Vec<MySqlArguments>,
    ) -> Result<BatchResult, Error> {
        self.ready().await?;

        let nbe = self.stream.session.no_backslash_escapes();
        let batch = BatchDescriptor::new(sql, parameter_sets, nbe);

        if !batch.is_rewritable() || !self.options.rewrite_batched_statements {
            if !batch.is_rewritable() && self.options.rewrite_batched_statements {
                tracing::debug!(
                    reason = %batch.shape().reason().map_or_else(
                        || String::from("parameter sets do not match the placeholders"),
                        |reason| reason.to_string(),
                    ),
                    "batch is not rewritable"
                );
            }

            let parameter_sets = batch.into_parameter_sets();
            let source = Source::Template {
                sql,
                parameter_sets: &parameter_sets,
            };

            return Ok(self.run_batch(source, source.units()).await);
        }

        let max_bytes = self.options.effective_max_rewrite_bytes();

        if !self.options.use_server_prep_stmts {
            // the rows are interpolated anyway; joining the literal statements measures
            // their real size
            let statements = batch
                .parameter_sets()
                .iter()
                .map(|arguments| lexer::interpolate(sql, arguments, nbe))
                .collect::<Result<Vec<String>, Error>>()?;

            return Ok(self.run_statements(&statements, max_bytes).await);
        }

        let units = batch
            .rewrite(max_bytes)
            .into_iter()
            .map(|statement| Unit {
                sql: Cow::Owned(statement.sql),
                arguments: Some(Cow::Owned(statement.arguments)),
                rows: statement.rows,
            })
            .collect();

        let parameter_sets = batch.into_parameter_sets();
        let source = Source::Template {
            sql,
            parameter_sets: &parameter_sets,
        };

        Ok(self.run_batch(source, units).await)
    }

    /// Runs literal statements one after another.
    ///
    /// With rewriting enabled, runs of consecutive single-row `INSERT`s that differ only in
    /// their values are joined into multi-row statements.
    pub async fn execute_batch_statements(
        &mut self,
        statements: Vec<String>,
    ) -> Result<BatchResult, Error> {
        self.ready().await?;

        if !self.options.rewrite_batched_statements {
            let source = Source::Statements(&statements);
            return Ok(self.run_batch(source, source.units()).await);
        }

        let max_bytes = self.options.effective_max_rewrite_bytes();

        Ok(self.run_statements(&statements, max_bytes).await)
    }

    async fn run_statements(&mut self, statements: &[String], max_bytes: usize) -> BatchResult {
        let source = Source::Statements(statements);

        let nbe = self.stream.session.no_backslash_escapes();

        let units = plan_statements(statements, max_bytes, nbe)
            .into_iter()
            .map(|planned| match planned {
                Planned::Single(idx) => source.unit(idx),
                Planned::Rewritten(statement) => Unit {
                    sql: Cow::Owned(statement.sql),
                    arguments: None,
                    rows: statement.rows,
                },
            })
            .collect();

        self.run_batch(source, units).await
    }

    async fn run_batch(&mut self, source: Source<'_>, units: Vec<Unit<'_>>) -> BatchResult {
        let policy = self.options.batch_error_policy;
        let increment = self.stream.session.auto_increment_increment.max(1);

        let mut result = BatchResult::new(source.len());

        tracing::debug!(
            statements = source.len(),
            sent_as = units.len(),
            "executing batch"
        );

        for unit in units {
            result.statements_sent += 1;

            let error = match self.run_unit(&unit).await {
                Ok(done) => {
                    result.record(unit.rows, &done, increment);
                    continue;
                }

                Err(error) => error,
            };

            if self.stops_batch(&error) {
                result.fail(unit.rows, error);
                break;
            }

            if policy == BatchErrorPolicy::RetryIndividually && unit.rows.len() > 1 {
                // the individual runs tell which of the statements failed
                tracing::debug!(%error, rows = ?unit.rows, "rewritten statement failed; retrying its statements one by one");

                for idx in unit.rows {
                    let single = source.unit(idx);
                    result.statements_sent += 1;

                    match self.run_unit(&single).await {
                        Ok(done) => result.record(single.rows, &done, increment),

                        Err(error) => {
                            let stop = self.stops_batch(&error);
                            result.fail(single.rows, error);

                            if stop {
                                return result;
                            }
                        }
                    }
                }

                continue;
            }

            result.fail(unit.rows, error);

            if policy == BatchErrorPolicy::AbortRemaining {
                break;
            }
        }

        result
    }

    async fn run_unit(&mut self, unit: &Unit<'_>) -> Result<MySqlQueryResult, Error> {
        let results = self.run(&unit.sql, unit.arguments.as_deref()).await?;
        collect_results(results).await
    }

    fn stops_batch(&self, error: &Error) -> bool {
        error.is_fatal() || self.is_poisoned()
    }
}
