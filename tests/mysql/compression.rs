use mywire::mysql::{Capabilities, MySqlConnection};
use mywire_test::{commands, mock_options, Greeting, MockColumn, MockServer};

#[tokio::test]
async fn it_negotiates_compression() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        server
            .accept(&Greeting::default().with(Capabilities::COMPRESS))
            .await?;

        let compressed = server.is_compressed();

        server.expect_command(commands::PING).await?;
        server.ok().await?;

        anyhow::Ok(compressed)
    });

    let options = mock_options().compression(true);
    let mut conn = MySqlConnection::connect_with_socket(client, &options).await?;

    assert!(conn.session().is_compressed());

    conn.ping().await?;

    assert!(script.await??);

    Ok(())
}

#[tokio::test]
async fn it_stays_uncompressed_when_the_server_cannot_compress() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        server.accept(&Greeting::default()).await?;
        anyhow::Ok(server.is_compressed())
    });

    let options = mock_options().compression(true);
    let conn = MySqlConnection::connect_with_socket(client, &options).await?;

    assert!(!conn.session().is_compressed());
    assert!(!script.await??);

    Ok(())
}

#[tokio::test]
async fn it_moves_large_payloads_through_compressed_envelopes() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();
    let payload = "mywire ".repeat(20_000);

    let script = {
        let payload = payload.clone();

        tokio::spawn(async move {
            server
                .accept(&Greeting::default().with(Capabilities::COMPRESS))
                .await?;

            let sql = server.expect_query().await?;

            server
                .result_set(
                    &[MockColumn::varchar("payload"), MockColumn::bigint("n")],
                    &[&[Some(&payload), Some("1")], &[None, Some("2")]],
                )
                .await?;

            anyhow::Ok(sql)
        })
    };

    let options = mock_options().compression(true).compression_level(9);
    let mut conn = MySqlConnection::connect_with_socket(client, &options).await?;

    let sql = format!("SELECT '{payload}' AS payload, 1 AS n UNION ALL SELECT NULL, 2");
    let rows = conn.fetch_all(&sql).await?;

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].try_get::<String, _>("payload")?, payload);
    assert_eq!(rows[1].try_get::<Option<String>, _>(0)?, None);
    assert_eq!(rows[1].try_get::<i64, _>("n")?, 2);

    assert_eq!(script.await??, sql);

    Ok(())
}
