use either::Either;
use mywire::mysql::{
    args, Error, InstrumentationOptions, IsolationLevel, MySqlConnection, MySqlQueryResult,
};
use mywire_test::{commands, mock_options, new, Greeting, MockColumn, MockServer};

const MORE_RESULTS_EXISTS: u16 = 0x0008;

#[tokio::test]
#[ignore = "needs a MySQL server, see MYWIRE_MYSQL_HOST"]
async fn it_connects() -> anyhow::Result<()> {
    let mut conn = new().await?;

    conn.ping().await?;
    conn.close().await?;

    Ok(())
}

#[tokio::test]
#[ignore = "needs a MySQL server, see MYWIRE_MYSQL_HOST"]
async fn it_maths() -> anyhow::Result<()> {
    let mut conn = new().await?;

    let value: i64 = conn
        .fetch_one_with("select 1 + CAST(? AS SIGNED)", &args![5_i32])
        .await?
        .try_get(0)?;

    assert_eq!(6, value);

    Ok(())
}

#[tokio::test]
#[ignore = "needs a MySQL server, see MYWIRE_MYSQL_HOST"]
async fn it_can_fail_at_querying() -> anyhow::Result<()> {
    let mut conn = new().await?;

    let _ = conn.execute("SELECT 1").await?;

    let err = conn.execute("SELECT non_existence_table").await.unwrap_err();
    assert!(!err.is_fatal());

    // the connection survives a failed statement
    conn.ping().await?;

    Ok(())
}

#[tokio::test]
#[ignore = "needs a MySQL server, see MYWIRE_MYSQL_HOST"]
async fn it_executes() -> anyhow::Result<()> {
    let mut conn = new().await?;

    let _ = conn
        .execute(
            r#"
CREATE TEMPORARY TABLE users (id INTEGER PRIMARY KEY);
            "#,
        )
        .await?;

    for index in 1..=10_i32 {
        let done = conn
            .execute_with("INSERT INTO users (id) VALUES (?)", &args![index])
            .await?;

        assert_eq!(done.rows_affected(), 1);
    }

    let sum = conn
        .fetch_all("SELECT id FROM users")
        .await?
        .iter()
        .map(|row| row.try_get::<i32, _>(0))
        .sum::<Result<i32, _>>()?;

    assert_eq!(sum, 55);

    Ok(())
}

#[tokio::test]
#[ignore = "needs a MySQL server, see MYWIRE_MYSQL_HOST"]
async fn it_drops_results_in_affected_rows() -> anyhow::Result<()> {
    let mut conn = new().await?;

    // ~1800 rows should be iterated and dropped
    let done = conn
        .execute("select * from mysql.time_zone limit 1575")
        .await?;

    // In MySQL, rows being returned isn't enough to flag it as an _affected_ row
    assert_eq!(0, done.rows_affected());

    Ok(())
}

#[tokio::test]
#[ignore = "needs a MySQL server, see MYWIRE_MYSQL_HOST"]
async fn it_selects_null() -> anyhow::Result<()> {
    let mut conn = new().await?;

    let value: Option<i32> = conn.fetch_one("SELECT NULL").await?.try_get(0)?;
    assert!(value.is_none());

    Ok(())
}

#[tokio::test]
#[ignore = "needs a MySQL server, see MYWIRE_MYSQL_HOST"]
async fn it_can_fetch_one_and_ping() -> anyhow::Result<()> {
    let mut conn = new().await?;

    let _id: i32 = conn.fetch_one("SELECT 1 as id").await?.try_get("id")?;

    conn.ping().await?;

    let _id: i32 = conn.fetch_one("SELECT 1 as id").await?.try_get("id")?;

    Ok(())
}

/// Test that we can interleave reads and writes to the database in one simple query.
#[tokio::test]
#[ignore = "needs a MySQL server, see MYWIRE_MYSQL_HOST"]
async fn it_interleaves_reads_and_writes() -> anyhow::Result<()> {
    let mut conn = new().await?;

    let rows = conn
        .fetch_all(
            "
CREATE TEMPORARY TABLE messages (
    id BIGINT PRIMARY KEY AUTO_INCREMENT,
    text TEXT NOT NULL
);

SELECT 'Hello World' as _1;

INSERT INTO messages (text) VALUES ('this is a test');

SELECT id, text FROM messages;
        ",
        )
        .await?;

    assert_eq!("Hello World", rows[0].try_get::<String, _>("_1")?);

    let id: i64 = rows[1].try_get("id")?;
    let text: String = rows[1].try_get("text")?;

    assert_eq!(1_i64, id);
    assert_eq!("this is a test", text);

    Ok(())
}

#[tokio::test]
#[ignore = "needs a MySQL server, see MYWIRE_MYSQL_HOST"]
async fn it_can_work_with_transactions() -> anyhow::Result<()> {
    let mut conn = new().await?;

    conn.execute("CREATE TEMPORARY TABLE users (id INTEGER PRIMARY KEY);")
        .await?;

    conn.set_autocommit(false).await?;
    assert!(!conn.session().autocommit());

    conn.execute_with("INSERT INTO users (id) VALUES (?)", &args![1_i32])
        .await?;
    assert!(conn.session().in_transaction());

    conn.execute("ROLLBACK").await?;

    let count: i64 = conn.fetch_one("SELECT COUNT(*) FROM users").await?.try_get(0)?;
    assert_eq!(count, 0);

    conn.execute_with("INSERT INTO users (id) VALUES (?)", &args![1_i32])
        .await?;
    conn.execute("COMMIT").await?;
    conn.set_autocommit(true).await?;

    let count: i64 = conn.fetch_one("SELECT COUNT(*) FROM users").await?.try_get(0)?;
    assert_eq!(count, 1);

    conn.set_transaction_isolation(IsolationLevel::ReadCommitted)
        .await?;
    assert_eq!(
        conn.transaction_isolation().await?,
        IsolationLevel::ReadCommitted
    );

    Ok(())
}

#[tokio::test]
#[ignore = "needs a MySQL server, see MYWIRE_MYSQL_HOST"]
async fn it_rewrites_batches() -> anyhow::Result<()> {
    let options = mywire_test::live_options()?.rewrite_batched_statements(true);
    let mut conn = MySqlConnection::connect(&options).await?;

    conn.execute(
        "CREATE TEMPORARY TABLE items (id BIGINT PRIMARY KEY AUTO_INCREMENT, name TEXT NOT NULL)",
    )
    .await?;

    let parameter_sets = (0..100).map(|i| args![format!("item {i}")]).collect();

    let result = conn
        .execute_batch("INSERT INTO items (name) VALUES (?)", parameter_sets)
        .await?;

    assert!(result.is_success());
    assert_eq!(result.rows_affected(), 100);
    assert!(result.statements_sent() < 100);

    let ids = result.generated_ids();
    assert_eq!(ids.len(), 100);

    let last: String = conn
        .fetch_one_with("SELECT name FROM items WHERE id = ?", &args![ids[99]])
        .await?
        .try_get(0)?;

    assert_eq!(last, "item 99");

    Ok(())
}

#[tokio::test]
#[ignore = "needs a MySQL server, see MYWIRE_MYSQL_HOST"]
async fn it_can_handle_split_packets() -> anyhow::Result<()> {
    // This will only take effect on new connections
    new()
        .await?
        .execute("SET GLOBAL max_allowed_packet = 1073741824")
        .await?;

    let mut conn = new().await?;

    conn.execute(
        r#"
CREATE TEMPORARY TABLE large_table (data LONGBLOB);
        "#,
    )
    .await?;

    let data = vec![0x41; 0xFF_FF_FF * 2];

    conn.execute_with("INSERT INTO large_table (data) VALUES (?)", &args![&data[..]])
        .await?;

    let ret: Vec<u8> = conn
        .fetch_one("SELECT * FROM large_table")
        .await?
        .try_get(0)?;

    assert_eq!(ret, data);

    Ok(())
}

#[tokio::test]
async fn it_reads_every_result_of_a_multi_statement() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        server.accept(&Greeting::default()).await?;

        server.expect_query().await?;
        server.ok_with(2, 0, 0x0002 | MORE_RESULTS_EXISTS).await?;
        server
            .result_set(&[MockColumn::bigint("1")], &[&[Some("1")]])
            .await?;

        anyhow::Ok(())
    });

    let mut conn = MySqlConnection::connect_with_socket(client, &mock_options()).await?;

    let mut results = conn.query("UPDATE t SET v = 1; SELECT 1").await?;
    let mut items = Vec::new();

    while let Some(item) = results.next().await? {
        items.push(item);
    }

    assert_eq!(items.len(), 3);

    match &items[0] {
        Either::Left(done) => {
            assert_eq!(done.rows_affected(), 2);
            assert!(done.status().bits() & MORE_RESULTS_EXISTS != 0);
        }
        Either::Right(_) => panic!("expected the UPDATE result first"),
    }

    assert!(matches!(&items[1], Either::Right(row) if row.try_get::<i64, _>(0).ok() == Some(1)));
    assert!(matches!(&items[2], Either::Left(MySqlQueryResult { .. })));

    script.await??;

    Ok(())
}

#[tokio::test]
async fn it_reports_a_missing_row() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        server.accept(&Greeting::default()).await?;

        server.expect_query().await?;
        server.result_set(&[MockColumn::bigint("v")], &[]).await?;

        anyhow::Ok(())
    });

    let mut conn = MySqlConnection::connect_with_socket(client, &mock_options()).await?;

    let err = conn.fetch_one("SELECT v FROM t WHERE 0").await.unwrap_err();
    assert!(matches!(err, Error::RowNotFound), "{err:?}");
    assert!(!conn.is_poisoned());

    script.await??;

    Ok(())
}

#[tokio::test]
async fn it_drains_a_result_that_was_not_read_to_the_end() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        server.accept(&Greeting::default()).await?;

        server.expect_query().await?;
        server
            .result_set(
                &[MockColumn::varchar("name")],
                &[&[Some("a")], &[Some("b")], &[Some("c")]],
            )
            .await?;

        server.expect_command(commands::PING).await?;
        server.ok().await?;

        anyhow::Ok(())
    });

    let mut conn = MySqlConnection::connect_with_socket(client, &mock_options()).await?;

    let first = conn.fetch_optional("SELECT name FROM t").await?;
    assert_eq!(
        first.map(|row| row.try_get::<String, _>("name")).transpose()?,
        Some(String::from("a"))
    );

    conn.ping().await?;

    script.await??;

    Ok(())
}

#[tokio::test]
async fn it_skips_session_statements_known_to_be_redundant() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        server.accept(&Greeting::default()).await?;

        assert_eq!(server.expect_query().await?, "SET autocommit=0");
        server.ok_with(0, 0, 0x0000).await?;

        // the second `set_autocommit(false)` never reaches the server
        assert_eq!(
            server.expect_query().await?,
            "SET SESSION TRANSACTION ISOLATION LEVEL SERIALIZABLE"
        );
        server.ok_with(0, 0, 0x0000).await?;

        anyhow::Ok(())
    });

    let options = mock_options().use_local_session_state(true);
    let mut conn = MySqlConnection::connect_with_socket(client, &options).await?;

    conn.set_autocommit(true).await?;
    conn.set_autocommit(false).await?;
    conn.set_autocommit(false).await?;

    assert!(!conn.session().autocommit());

    conn.set_transaction_isolation(IsolationLevel::Serializable)
        .await?;

    // known locally, so not asked for
    assert_eq!(
        conn.transaction_isolation().await?,
        IsolationLevel::Serializable
    );

    script.await??;

    Ok(())
}

#[tokio::test]
async fn it_toggles_instrumentation_at_runtime() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        server.accept(&Greeting::default()).await?;

        for _ in 0..2 {
            server.expect_command(commands::PING).await?;
            server.ok().await?;
        }

        anyhow::Ok(())
    });

    let mut conn = MySqlConnection::connect_with_socket(client, &mock_options()).await?;

    assert_eq!(conn.instrumentation_layers(), ["raw"]);
    assert!(conn.packet_dump().is_empty());

    conn.set_instrumentation(InstrumentationOptions {
        debug_buffer_packets: 8,
        trace_packets: true,
        track_timing: true,
    });

    assert_eq!(
        conn.instrumentation_layers(),
        ["debug", "trace", "timing", "raw"]
    );

    conn.ping().await?;

    let timings = conn.packet_timings();
    assert_eq!(timings.packets_sent, 1);
    assert_eq!(timings.packets_received, 1);
    assert!(!conn.packet_dump().is_empty());

    conn.set_instrumentation(InstrumentationOptions::default());
    assert_eq!(conn.instrumentation_layers(), ["raw"]);

    conn.ping().await?;

    // statistics survive the timing layer being switched off, but stop counting
    assert_eq!(conn.packet_timings().packets_sent, 1);

    script.await??;

    Ok(())
}
