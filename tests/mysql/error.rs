use either::Either;
use mywire::mysql::{Error, MySqlConnection};
use mywire_test::{commands, mock_options, Greeting, MockColumn, MockServer};

const SERVER_MORE_RESULTS_EXISTS: u16 = 0x0008;

#[tokio::test]
async fn it_keeps_the_connection_after_a_server_error() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        server.accept(&Greeting::default()).await?;

        server.expect_query().await?;
        server
            .err(
                1064,
                "42000",
                "You have an error in your SQL syntax near 'SELEC 1'",
            )
            .await?;

        server.expect_command(commands::PING).await?;
        server.ok().await?;

        anyhow::Ok(())
    });

    let mut conn = MySqlConnection::connect_with_socket(client, &mock_options()).await?;

    let err = conn.execute("SELEC 1").await.unwrap_err();

    assert!(!err.is_fatal());
    assert!(!conn.is_poisoned());

    let db = err.as_database_error().unwrap();
    assert_eq!(db.code().as_deref(), Some("42000"));
    assert!(db.message().contains("SELEC 1"));

    conn.ping().await?;

    script.await??;

    Ok(())
}

#[tokio::test]
async fn it_poisons_the_connection_on_an_out_of_order_packet() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        server.accept(&Greeting::default()).await?;

        server.expect_command(commands::PING).await?;

        // an OK packet with sequence id 5 instead of 1
        server
            .send_raw(b"\x07\x00\x00\x05\x00\x00\x00\x02\x00\x00\x00")
            .await?;

        anyhow::Ok(server)
    });

    let mut conn = MySqlConnection::connect_with_socket(client, &mock_options()).await?;

    let err = conn.ping().await.unwrap_err();

    assert!(
        matches!(
            err,
            Error::PacketOutOfOrder {
                expected: 1,
                found: 5
            }
        ),
        "{err:?}"
    );
    assert!(conn.is_poisoned());

    let err = conn.execute("SELECT 1").await.unwrap_err();
    assert!(matches!(err, Error::ConnectionPoisoned(_)), "{err:?}");

    // a poisoned connection is only shut down
    conn.close().await?;

    let _server = script.await??;

    Ok(())
}

#[tokio::test]
async fn it_poisons_the_connection_when_the_server_goes_away() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        server.accept(&Greeting::default()).await?;
        server.expect_query().await?;

        // dropping the server closes the pipe mid-command
        anyhow::Ok(())
    });

    let mut conn = MySqlConnection::connect_with_socket(client, &mock_options()).await?;

    let execute = conn.execute("SELECT 1");
    let (result, script) = tokio::join!(execute, script);

    script??;

    let err = result.unwrap_err();
    assert!(err.is_fatal(), "{err:?}");
    assert!(conn.is_poisoned());

    Ok(())
}

#[tokio::test]
async fn it_rejects_responses_over_the_configured_read_limit() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        server.accept(&Greeting::default()).await?;
        server.expect_query().await?;

        let large = "x".repeat(1000);
        server
            .result_set(&[MockColumn::varchar("v")], &[&[Some(&large)]])
            .await?;

        anyhow::Ok(server)
    });

    let options = mock_options().max_read_bytes(512);
    let mut conn = MySqlConnection::connect_with_socket(client, &options).await?;

    let err = conn.fetch_all("SELECT v FROM t").await.unwrap_err();

    assert!(
        matches!(err, Error::PacketTooLarge { len: 1003, max: 512 }),
        "{err:?}"
    );
    assert!(conn.is_poisoned());

    let _server = script.await??;

    Ok(())
}

#[tokio::test]
async fn it_reports_the_error_of_an_abandoned_result_to_the_next_command() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        server.accept(&Greeting::default()).await?;
        server.expect_query().await?;

        server.columns(&[MockColumn::bigint("a")], 0x0002).await?;
        server.text_row(&[Some("1")]).await?;
        server.eof(0x0002 | SERVER_MORE_RESULTS_EXISTS).await?;
        server
            .err(1146, "42S02", "Table 'db.missing' doesn't exist")
            .await?;

        server.expect_command(commands::PING).await?;
        server.ok().await?;

        anyhow::Ok(())
    });

    let mut conn = MySqlConnection::connect_with_socket(client, &mock_options()).await?;

    let mut results = conn.query("SELECT 1; SELECT * FROM missing").await?;
    assert!(matches!(results.next().await?, Some(Either::Right(_))));
    drop(results);

    // the second statement failed while nobody was reading
    let err = conn.ping().await.unwrap_err();

    let db = err.as_database_error().unwrap();
    assert_eq!(db.code().as_deref(), Some("42S02"));
    assert!(!conn.is_poisoned());

    conn.ping().await?;

    script.await??;

    Ok(())
}
