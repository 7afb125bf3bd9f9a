use std::fmt::Debug;

use futures_core::future::BoxFuture;

use crate::error::Error;
use crate::options::MySqlConnectOptions;

/// Stops a statement running on another connection.
///
/// Called when a statement outlives its
/// [`statement_timeout`][MySqlConnectOptions::statement_timeout]. The connection that ran the
/// statement is busy waiting for its result, so cancelling has to happen out of band.
pub trait QueryCanceller: Send + Sync + Debug {
    /// Cancels the statement currently running on the connection with `thread_id`.
    fn cancel(&self, thread_id: u32) -> BoxFuture<'_, Result<(), Error>>;
}

/// Cancels by opening a second connection with the same options and running
/// `KILL QUERY <thread_id>` there.
#[derive(Debug, Clone)]
pub struct KillQueryCanceller {
    options: MySqlConnectOptions,
}

impl KillQueryCanceller {
    pub fn new(options: &MySqlConnectOptions) -> Self {
        let mut options = options.clone();

        // a short-lived connection running a single statement
        options.statement_timeout = None;
        options.query_canceller = None;
        options.statement_cache_capacity = 0;
        options.rewrite_batched_statements = false;

        Self { options }
    }
}

impl QueryCanceller for KillQueryCanceller {
    fn cancel(&self, thread_id: u32) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async move {
            let mut conn = self.options.connect().await?;

            let sql = format!("KILL QUERY {thread_id}");
            let result = conn.execute(&sql).await;

            conn.close().await?;

            tracing::debug!(thread_id, "sent KILL QUERY");

            result.map(drop)
        })
    }
}
