use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use mywire::mysql::{
    args, Error, InstrumentationOptions, MySqlConnection, MySqlStatement, QueryCanceller,
};
use mywire_test::{commands, mock_options, Greeting, MockColumn, MockServer};
use tokio::sync::Notify;

#[tokio::test]
async fn it_executes_a_prepared_statement() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        server.accept(&Greeting::default()).await?;

        assert_eq!(server.expect_prepare().await?, "SELECT ? + ?");
        server.prepare_ok(1, 2, &[MockColumn::bigint("sum")]).await?;

        let (statement, cursor, _) = server.expect_execute().await?;
        assert_eq!(statement, 1);
        assert_eq!(cursor, 0);

        server.columns(&[MockColumn::bigint("sum")], 0x0002).await?;
        server.binary_row(&[Some(5)]).await?;
        server.eof(0x0002).await?;

        anyhow::Ok(())
    });

    let mut conn = MySqlConnection::connect_with_socket(client, &mock_options()).await?;

    let row = conn.fetch_one_with("SELECT ? + ?", &args![2_i64, 3_i64]).await?;
    let sum: i64 = row.try_get(0)?;

    assert_eq!(sum, 5);
    assert_eq!(row.try_get::<i64, _>("sum")?, 5);

    script.await??;

    Ok(())
}

#[tokio::test]
async fn it_interpolates_arguments_without_server_side_preparation() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        server.accept(&Greeting::default()).await?;

        let sql = server.expect_query().await?;
        server
            .result_set(&[MockColumn::bigint("2 + 3")], &[&[Some("5")]])
            .await?;

        anyhow::Ok(sql)
    });

    let options = mock_options().use_server_prep_stmts(false);
    let mut conn = MySqlConnection::connect_with_socket(client, &options).await?;

    let sum: i64 = conn
        .fetch_one_with("SELECT ? + ?", &args![2_i64, 3_i64])
        .await?
        .try_get(0)?;

    assert_eq!(sum, 5);
    assert_eq!(script.await??, "SELECT 2 + 3");

    Ok(())
}

#[tokio::test]
async fn it_reuses_cached_statements() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        server.accept(&Greeting::default()).await?;

        server.expect_prepare().await?;
        server.prepare_ok(4, 1, &[MockColumn::bigint("v")]).await?;

        for value in [10, 20] {
            let (statement, _, _) = server.expect_execute().await?;
            assert_eq!(statement, 4);

            server.columns(&[MockColumn::bigint("v")], 0x0002).await?;
            server.binary_row(&[Some(value)]).await?;
            server.eof(0x0002).await?;
        }

        anyhow::Ok(())
    });

    let mut conn = MySqlConnection::connect_with_socket(client, &mock_options()).await?;

    let first: i64 = conn.fetch_one_with("SELECT ?", &args![10_i64]).await?.try_get(0)?;
    let second: i64 = conn.fetch_one_with("SELECT ?", &args![20_i64]).await?.try_get(0)?;

    assert_eq!((first, second), (10, 20));
    assert_eq!(conn.cached_statements(), 1);

    script.await??;

    Ok(())
}

#[tokio::test]
async fn it_classifies_prepared_calls() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        server.accept(&Greeting::default()).await?;

        server.expect_prepare().await?;
        server.prepare_ok(2, 1, &[]).await?;

        anyhow::Ok(())
    });

    let mut conn = MySqlConnection::connect_with_socket(client, &mock_options()).await?;

    let statement = conn.prepare("CALL restock(?)").await?;

    assert!(matches!(statement, MySqlStatement::StoredProcedureCall(_)));
    assert_eq!(statement.param_count(), 1);

    conn.release_statement(statement).await?;
    assert_eq!(conn.cached_statements(), 1);

    script.await??;

    Ok(())
}

#[tokio::test]
async fn it_closes_a_statement_once() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        server.accept(&Greeting::default()).await?;

        server.expect_prepare().await?;
        server.prepare_ok(3, 0, &[MockColumn::bigint("v")]).await?;

        let close = server.expect_command(commands::STMT_CLOSE).await?;
        assert_eq!(close, 3_u32.to_le_bytes());

        // a second close would arrive before this
        server.expect_command(commands::PING).await?;
        server.ok().await?;

        anyhow::Ok(())
    });

    let mut conn = MySqlConnection::connect_with_socket(client, &mock_options()).await?;

    let mut statement = conn.prepare("SELECT 1").await?;

    conn.close_statement(&mut statement).await?;
    conn.close_statement(&mut statement).await?;
    conn.ping().await?;

    assert!(statement.handle().is_some_and(|handle| handle.is_closed()));

    let executed = conn.execute_statement(&statement, &args![]).await;
    assert!(matches!(executed, Err(Error::InvalidArgument(_))));

    script.await??;

    Ok(())
}

#[tokio::test]
async fn it_pulls_rows_through_a_cursor() -> anyhow::Result<()> {
    const CURSOR_EXISTS: u16 = 0x0040;
    const LAST_ROW_SENT: u16 = 0x0080;

    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        server.accept(&Greeting::default()).await?;

        server.expect_prepare().await?;
        server.prepare_ok(5, 0, &[MockColumn::bigint("v")]).await?;

        let (_, cursor, _) = server.expect_execute().await?;
        assert_eq!(cursor, 0x01);

        server
            .columns(&[MockColumn::bigint("v")], 0x0002 | CURSOR_EXISTS)
            .await?;

        let fetch = server.expect_command(commands::STMT_FETCH).await?;
        assert_eq!(fetch[..4], 5_u32.to_le_bytes());
        assert_eq!(fetch[4..], 2_u32.to_le_bytes());

        server.binary_row(&[Some(1)]).await?;
        server.binary_row(&[Some(2)]).await?;
        server.eof(0x0002 | CURSOR_EXISTS).await?;

        server.expect_command(commands::STMT_FETCH).await?;

        server.binary_row(&[Some(3)]).await?;
        server.eof(0x0002 | CURSOR_EXISTS | LAST_ROW_SENT).await?;

        anyhow::Ok(())
    });

    let options = mock_options().use_cursor_fetch(true).fetch_size(2);
    let mut conn = MySqlConnection::connect_with_socket(client, &options).await?;

    let rows = conn.fetch_all_with("SELECT v FROM t", &args![]).await?;
    let values = rows
        .iter()
        .map(|row| row.try_get::<i64, _>(0))
        .collect::<Result<Vec<_>, _>>()?;

    assert_eq!(values, [1, 2, 3]);

    script.await??;

    Ok(())
}

#[derive(Debug)]
struct FailingCanceller;

impl QueryCanceller for FailingCanceller {
    fn cancel(&self, _thread_id: u32) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async { Err(Error::Configuration("no second connection".into())) })
    }
}

#[tokio::test]
async fn it_poisons_the_connection_when_a_timeout_cannot_be_cancelled() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        server.accept(&Greeting::default()).await?;
        server.expect_query().await?;

        // stays silent, but keeps the pipe open
        anyhow::Ok(server)
    });

    let options = mock_options()
        .statement_timeout(Duration::from_millis(50))
        .query_canceller(Arc::new(FailingCanceller));

    let mut conn = MySqlConnection::connect_with_socket(client, &options).await?;

    let err = conn.execute("SELECT SLEEP(10)").await.unwrap_err();
    assert!(matches!(err, Error::StatementTimeout { idle: None }), "{err:?}");
    assert!(conn.is_poisoned());

    let err = conn.ping().await.unwrap_err();
    assert!(matches!(err, Error::ConnectionPoisoned(_)), "{err:?}");

    let _server = script.await??;

    Ok(())
}

#[derive(Debug)]
struct SignallingCanceller {
    cancelled: Arc<Notify>,
}

impl QueryCanceller for SignallingCanceller {
    fn cancel(&self, thread_id: u32) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async move {
            assert_eq!(thread_id, 11);
            self.cancelled.notify_one();
            Ok(())
        })
    }
}

#[tokio::test]
async fn it_recovers_from_a_cancelled_timeout() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();
    let cancelled = Arc::new(Notify::new());

    let script = {
        let cancelled = Arc::clone(&cancelled);

        tokio::spawn(async move {
            server.accept(&Greeting::default()).await?;
            server.expect_query().await?;

            cancelled.notified().await;
            server
                .err(1317, "70100", "Query execution was interrupted")
                .await?;

            server.expect_command(commands::PING).await?;
            server.ok().await?;

            anyhow::Ok(())
        })
    };

    let options = mock_options()
        .statement_timeout(Duration::from_millis(200))
        .query_canceller(Arc::new(SignallingCanceller { cancelled }))
        .instrumentation(InstrumentationOptions {
            track_timing: true,
            ..InstrumentationOptions::default()
        });

    let mut conn = MySqlConnection::connect_with_socket(client, &options).await?;

    let err = conn.execute("SELECT SLEEP(10)").await.unwrap_err();

    // the query went out when the deadline started, nothing came back since
    match err {
        Error::StatementTimeout { idle: Some(idle) } => {
            assert!(idle >= Duration::from_millis(150), "{idle:?}");
        }
        other => panic!("expected a timeout with timings, got {other:?}"),
    }

    assert!(!conn.is_poisoned());

    conn.ping().await?;

    script.await??;

    Ok(())
}
