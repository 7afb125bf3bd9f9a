use std::env;

use mywire::mysql::{MySqlConnectOptions, MySqlConnection, MySqlSslMode};

mod mock;

pub use mock::{commands, Greeting, MockColumn, MockServer};

pub fn setup_if_needed() {
    let _ = dotenvy::dotenv();
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Options for a live server, read from `MYWIRE_MYSQL_HOST`, `MYWIRE_MYSQL_PORT`,
/// `MYWIRE_MYSQL_USER`, `MYWIRE_MYSQL_PASSWORD` and `MYWIRE_MYSQL_DATABASE`.
pub fn live_options() -> anyhow::Result<MySqlConnectOptions> {
    setup_if_needed();

    let mut options = MySqlConnectOptions::new().host(&env::var("MYWIRE_MYSQL_HOST")?);

    if let Ok(port) = env::var("MYWIRE_MYSQL_PORT") {
        options = options.port(port.parse()?);
    }

    if let Ok(user) = env::var("MYWIRE_MYSQL_USER") {
        options = options.username(&user);
    }

    if let Ok(password) = env::var("MYWIRE_MYSQL_PASSWORD") {
        options = options.password(&password);
    }

    if let Ok(database) = env::var("MYWIRE_MYSQL_DATABASE") {
        options = options.database(&database);
    }

    Ok(options)
}

// Make a new connection to the live server
// Ensure [dotenvy] and [env_logger] have been setup
pub async fn new() -> anyhow::Result<MySqlConnection> {
    Ok(live_options()?.connect().await?)
}

/// Options for talking to a [`MockServer`]: no TLS and no session initialization, so the
/// first command the server sees is the test's own.
pub fn mock_options() -> MySqlConnectOptions {
    setup_if_needed();

    MySqlConnectOptions::new()
        .ssl_mode(MySqlSslMode::Disabled)
        .pipes_as_concat(false)
        .no_engine_substitution(false)
        .timezone(None)
        .set_names(false)
}
