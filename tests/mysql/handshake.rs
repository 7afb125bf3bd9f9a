use mywire::mysql::{Capabilities, Error, MySqlConnection};
use mywire_test::{commands, mock_options, Greeting, MockServer};

#[tokio::test]
async fn it_connects_and_pings() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        server.accept(&Greeting::default()).await?;

        server.expect_command(commands::PING).await?;
        server.ok().await?;

        server.expect_command(commands::QUIT).await?;

        anyhow::Ok(())
    });

    let mut conn = MySqlConnection::connect_with_socket(client, &mock_options()).await?;

    assert_eq!(conn.thread_id(), 11);
    assert_eq!(conn.session().server_version().major, 8);
    assert!(conn.session().autocommit());
    assert!(!conn.session().is_ssl());
    assert!(!conn.session().is_compressed());

    conn.ping().await?;
    conn.close().await?;

    script.await??;

    Ok(())
}

#[tokio::test]
async fn it_sends_the_requested_database_and_attributes() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move { server.accept(&Greeting::default()).await });

    let options = mock_options()
        .username("app")
        .database("inventory")
        .connect_attribute("program_name", "mywire-tests");

    let _conn = MySqlConnection::connect_with_socket(client, &options).await?;

    let response = script.await??;
    let capabilities = Capabilities::from_bits_truncate(u64::from(u32::from_le_bytes([
        response[0],
        response[1],
        response[2],
        response[3],
    ])));

    assert!(capabilities.contains(Capabilities::CONNECT_WITH_DB));
    assert!(capabilities.contains(Capabilities::CONNECT_ATTRS));
    assert!(!capabilities.contains(Capabilities::SSL));

    let contains = |needle: &[u8]| response.windows(needle.len()).any(|w| w == needle);

    assert!(contains(b"app\0"));
    assert!(contains(b"inventory\0"));
    assert!(contains(b"mysql_native_password\0"));
    assert!(contains(b"mywire-tests"));

    Ok(())
}

#[tokio::test]
async fn it_reports_rejected_credentials() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        server
            .reject(
                &Greeting::default(),
                1045,
                "Access denied for user 'root'@'localhost'",
            )
            .await
    });

    let err = MySqlConnection::connect_with_socket(client, &mock_options())
        .await
        .unwrap_err();

    script.await??;

    assert!(matches!(err, Error::Authentication(_)), "{err:?}");

    let db = err.as_database_error().unwrap();
    assert_eq!(db.code().as_deref(), Some("28000"));
    assert!(db.message().starts_with("Access denied"));

    Ok(())
}

#[tokio::test]
async fn it_runs_the_session_initialization() -> anyhow::Result<()> {
    let (client, mut server) = MockServer::pair();

    let script = tokio::spawn(async move {
        server.accept(&Greeting::default()).await?;

        let sql = server.expect_query().await?;
        server.ok().await?;

        anyhow::Ok(sql)
    });

    let options = mock_options()
        .no_engine_substitution(true)
        .timezone(String::from("+00:00"))
        .set_names(true);

    let _conn = MySqlConnection::connect_with_socket(client, &options).await?;

    assert_eq!(
        script.await??,
        "SET sql_mode=(SELECT CONCAT(@@sql_mode, ',NO_ENGINE_SUBSTITUTION')),time_zone='+00:00',NAMES utf8mb4"
    );

    Ok(())
}

#[tokio::test]
async fn it_times_out_waiting_for_the_greeting() -> anyhow::Result<()> {
    let (client, _server) = MockServer::pair();

    let options = mock_options().connect_timeout(std::time::Duration::from_millis(50));

    let err = MySqlConnection::connect_with_socket(client, &options)
        .await
        .unwrap_err();

    match err {
        Error::Io(err) => assert_eq!(err.kind(), std::io::ErrorKind::TimedOut),
        err => panic!("expected a timeout, got {err:?}"),
    }

    Ok(())
}
