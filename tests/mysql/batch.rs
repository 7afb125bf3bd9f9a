use mywire::mysql::{args, BatchErrorPolicy, BatchOutcome, Error, MySqlConnection};
use mywire_test::{commands, mock_options, Greeting, MockColumn, MockServer};

const DUPLICATE_ENTRY: u16 = 1062;

// answers the query rewriting connections send right after the handshake
async fn accept_rewriting(server: &mut MockServer, increment: &str) -> anyhow::Result<()> {
    server.accept(&Greeting::default()).await?;

    assert_eq!(
        server.expect_query().await?,
        "SELECT @@session.auto_increment_increment"
    );

    server
        .result_set(
            &[MockColumn::bigint("@@session.auto_increment_increment")],
            &[&[Some(increment)]],
        )
        .await
}

#[tokio::test]
async fn it_rewrites_a_batch_into_one_insert() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        accept_rewriting(&mut server, "2").await?;

        let sql = server.expect_query().await?;
        server.ok_with(3, 7, 0x0002).await?;

        anyhow::Ok(sql)
    });

    let options = mock_options()
        .use_server_prep_stmts(false)
        .rewrite_batched_statements(true);

    let mut conn = MySqlConnection::connect_with_socket(client, &options).await?;

    let result = conn
        .execute_batch(
            "INSERT INTO t VALUES (?, ?)",
            vec![args![1_i64, "a"], args![2_i64, "b"], args![3_i64, "it's"]],
        )
        .await?;

    assert!(result.is_success());
    assert_eq!(result.statements_sent(), 1);
    assert_eq!(result.rows_affected(), 3);
    assert_eq!(result.generated_ids(), [7, 9, 11]);

    assert!(result.outcomes().iter().all(|outcome| matches!(
        outcome,
        BatchOutcome::Success {
            rows_affected: Some(1),
            ..
        }
    )));

    assert_eq!(
        script.await??,
        r"INSERT INTO t VALUES (1, 'a'),(2, 'b'),(3, 'it\'s')"
    );

    Ok(())
}

#[tokio::test]
async fn it_executes_a_batch_one_statement_at_a_time_without_rewriting() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        server.accept(&Greeting::default()).await?;

        server.expect_prepare().await?;
        server.prepare_ok(1, 1, &[]).await?;

        for id in [7, 8] {
            server.expect_execute().await?;
            server.ok_with(1, id, 0x0002).await?;
        }

        anyhow::Ok(())
    });

    let mut conn = MySqlConnection::connect_with_socket(client, &mock_options()).await?;

    let result = conn
        .execute_batch("INSERT INTO t VALUES (?)", vec![args![1_i64], args![2_i64]])
        .await?;

    assert!(result.is_success());
    assert_eq!(result.statements_sent(), 2);
    assert_eq!(result.generated_ids(), [7, 8]);
    assert_eq!(
        result.outcomes()[0],
        BatchOutcome::Success {
            rows_affected: Some(1),
            generated_id: Some(7),
        }
    );

    script.await??;

    Ok(())
}

#[tokio::test]
async fn it_keeps_statements_using_last_insert_id_apart() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        accept_rewriting(&mut server, "1").await?;

        let mut sent = Vec::new();

        for id in [4, 5] {
            sent.push(server.expect_query().await?);
            server.ok_with(1, id, 0x0002).await?;
        }

        anyhow::Ok(sent)
    });

    let options = mock_options()
        .use_server_prep_stmts(false)
        .rewrite_batched_statements(true);

    let mut conn = MySqlConnection::connect_with_socket(client, &options).await?;

    let result = conn
        .execute_batch(
            "INSERT INTO t VALUES (?, LAST_INSERT_ID())",
            vec![args![1_i64], args![2_i64]],
        )
        .await?;

    assert_eq!(result.statements_sent(), 2);
    assert_eq!(
        script.await??,
        [
            "INSERT INTO t VALUES (1, LAST_INSERT_ID())",
            "INSERT INTO t VALUES (2, LAST_INSERT_ID())",
        ]
    );

    Ok(())
}

#[tokio::test]
async fn it_joins_literal_inserts() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        accept_rewriting(&mut server, "1").await?;

        let mut sent = Vec::new();

        sent.push(server.expect_query().await?);
        server.ok_with(2, 20, 0x0002).await?;

        sent.push(server.expect_query().await?);
        server.ok_with(1, 0, 0x0002).await?;

        anyhow::Ok(sent)
    });

    let options = mock_options().rewrite_batched_statements(true);
    let mut conn = MySqlConnection::connect_with_socket(client, &options).await?;

    let result = conn
        .execute_batch_statements(vec![
            String::from("INSERT INTO t VALUES (1)"),
            String::from("INSERT INTO t VALUES (2)"),
            String::from("UPDATE c SET n = n + 1"),
        ])
        .await?;

    assert!(result.is_success());
    assert_eq!(result.statements_sent(), 2);
    assert_eq!(result.generated_ids(), [20, 21]);
    assert_eq!(
        result.outcomes()[2],
        BatchOutcome::Success {
            rows_affected: Some(1),
            generated_id: None,
        }
    );

    assert_eq!(
        script.await??,
        ["INSERT INTO t VALUES (1),(2)", "UPDATE c SET n = n + 1"]
    );

    Ok(())
}

#[tokio::test]
async fn it_aborts_the_rest_of_a_batch_after_a_failure() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        server.accept(&Greeting::default()).await?;

        server.expect_query().await?;
        server.ok_with(1, 0, 0x0002).await?;

        server.expect_query().await?;
        server
            .err(DUPLICATE_ENTRY, "23000", "Duplicate entry '1' for key 'PRIMARY'")
            .await?;

        // the third statement is never sent
        server.expect_command(commands::PING).await?;
        server.ok().await?;

        anyhow::Ok(())
    });

    let mut conn = MySqlConnection::connect_with_socket(client, &mock_options()).await?;

    let mut result = conn
        .execute_batch_statements(vec![
            String::from("DELETE FROM t"),
            String::from("INSERT INTO t VALUES (1)"),
            String::from("INSERT INTO t VALUES (2)"),
        ])
        .await?;

    assert!(!result.is_success());
    assert_eq!(result.statements_sent(), 2);
    assert!(result.outcomes()[0].is_success());
    assert_eq!(result.outcomes()[1], BatchOutcome::Failed);
    assert_eq!(result.outcomes()[2], BatchOutcome::NotExecuted);

    match result.take_error() {
        Some(Error::Database(err)) => assert_eq!(err.code().as_deref(), Some("23000")),
        other => panic!("expected a database error, got {other:?}"),
    }

    conn.ping().await?;

    script.await??;

    Ok(())
}

#[tokio::test]
async fn it_retries_a_failed_rewritten_statement_row_by_row() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        accept_rewriting(&mut server, "1").await?;

        assert_eq!(
            server.expect_query().await?,
            "INSERT INTO t VALUES (1),(2),(3)"
        );
        server
            .err(DUPLICATE_ENTRY, "23000", "Duplicate entry '2' for key 'PRIMARY'")
            .await?;

        assert_eq!(server.expect_query().await?, "INSERT INTO t VALUES (1)");
        server.ok_with(1, 0, 0x0002).await?;

        assert_eq!(server.expect_query().await?, "INSERT INTO t VALUES (2)");
        server
            .err(DUPLICATE_ENTRY, "23000", "Duplicate entry '2' for key 'PRIMARY'")
            .await?;

        assert_eq!(server.expect_query().await?, "INSERT INTO t VALUES (3)");
        server.ok_with(1, 0, 0x0002).await?;

        anyhow::Ok(())
    });

    let options = mock_options()
        .use_server_prep_stmts(false)
        .rewrite_batched_statements(true)
        .batch_error_policy(BatchErrorPolicy::RetryIndividually);

    let mut conn = MySqlConnection::connect_with_socket(client, &options).await?;

    let result = conn
        .execute_batch(
            "INSERT INTO t VALUES (?)",
            vec![args![1_i64], args![2_i64], args![3_i64]],
        )
        .await?;

    assert_eq!(result.statements_sent(), 4);
    assert_eq!(result.rows_affected(), 2);
    assert!(result.outcomes()[0].is_success());
    assert_eq!(result.outcomes()[1], BatchOutcome::Failed);
    assert!(result.outcomes()[2].is_success());

    let err = result.first_error().and_then(Error::as_database_error);
    assert!(err.is_some_and(|err| err.message().contains("'2'")));

    script.await??;

    Ok(())
}

#[tokio::test]
async fn it_sizes_rewritten_statements_by_their_arguments() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        accept_rewriting(&mut server, "1").await?;

        let mut prepared = Vec::new();

        for (statement, rows) in [(1, 3_u16), (2, 1)] {
            prepared.push(server.expect_prepare().await?);
            server.prepare_ok(statement, rows, &[]).await?;

            let (id, _, _) = server.expect_execute().await?;
            assert_eq!(id, statement);
            server.ok_with(u64::from(rows), 0, 0x0002).await?;
        }

        anyhow::Ok(prepared)
    });

    let options = mock_options()
        .rewrite_batched_statements(true)
        .max_allowed_packet(1 << 20);

    let mut conn = MySqlConnection::connect_with_socket(client, &options).await?;

    let blob = vec![7_u8; 300 * 1024];

    let result = conn
        .execute_batch(
            "INSERT INTO t VALUES (?)",
            (0..4).map(|_| args![blob.clone()]).collect(),
        )
        .await?;

    assert!(result.is_success());
    assert_eq!(result.statements_sent(), 2);
    assert_eq!(result.rows_affected(), 4);
    assert!(!conn.is_poisoned());

    assert_eq!(
        script.await??,
        ["INSERT INTO t VALUES (?),(?),(?)", "INSERT INTO t VALUES (?)"]
    );

    Ok(())
}

#[tokio::test]
async fn it_refuses_an_oversized_statement_without_losing_the_connection() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        accept_rewriting(&mut server, "1").await?;

        server.expect_prepare().await?;
        server.prepare_ok(1, 1, &[]).await?;

        server.expect_execute().await?;
        server.ok_with(1, 5, 0x0002).await?;

        // the second row never leaves the client
        server.expect_command(commands::PING).await?;
        server.ok().await?;

        anyhow::Ok(())
    });

    let options = mock_options()
        .rewrite_batched_statements(true)
        .max_allowed_packet(1024);

    let mut conn = MySqlConnection::connect_with_socket(client, &options).await?;

    let mut result = conn
        .execute_batch(
            "INSERT INTO t VALUES (?)",
            vec![args![1_i64], args![vec![0_u8; 2000]], args![3_i64]],
        )
        .await?;

    assert_eq!(
        result.outcomes()[1..],
        [BatchOutcome::Failed, BatchOutcome::NotExecuted]
    );
    assert!(result.outcomes()[0].is_success());

    match result.take_error() {
        Some(err @ Error::MessageTooLarge { max: 1024, .. }) => assert!(!err.is_fatal()),
        other => panic!("expected an oversized message, got {other:?}"),
    }

    assert!(!conn.is_poisoned());
    conn.ping().await?;

    script.await??;

    Ok(())
}

#[tokio::test]
async fn it_marks_every_row_of_a_failed_rewritten_statement() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        accept_rewriting(&mut server, "1").await?;

        let sql = server.expect_query().await?;
        server
            .err(DUPLICATE_ENTRY, "23000", "Duplicate entry '2' for key 'PRIMARY'")
            .await?;

        anyhow::Ok(sql)
    });

    let options = mock_options()
        .use_server_prep_stmts(false)
        .rewrite_batched_statements(true)
        .max_rewrite_statement_bytes(30);

    let mut conn = MySqlConnection::connect_with_socket(client, &options).await?;

    let result = conn
        .execute_batch(
            "INSERT INTO t VALUES (?)",
            (1..=4_i64).map(|i| args![i]).collect(),
        )
        .await?;

    assert_eq!(
        result.outcomes(),
        [
            BatchOutcome::GroupFailed { rows: 0..2 },
            BatchOutcome::GroupFailed { rows: 0..2 },
            BatchOutcome::NotExecuted,
            BatchOutcome::NotExecuted,
        ]
    );
    assert_eq!(result.statements_sent(), 1);

    assert_eq!(script.await??, "INSERT INTO t VALUES (1),(2)");

    Ok(())
}
