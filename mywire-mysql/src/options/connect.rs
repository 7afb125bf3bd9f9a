use std::future::Future;
use std::io;

use mywire_core::net::tls::MaybeTlsStream;

use crate::connection::codec::PacketIo;
use crate::connection::instrument::PacketChain;
use crate::connection::HandshakeEngine;
use crate::error::Error;
use crate::{MySqlConnectOptions, MySqlConnection};

impl MySqlConnectOptions {
    /// Opens a connection: connects the transport, runs the connection phase and
    /// initializes the session.
    ///
    /// Everything up to and including session initialization is bounded by
    /// [`connect_timeout`](Self::connect_timeout).
    pub async fn connect(&self) -> Result<MySqlConnection, Error> {
        self.within_connect_timeout(self.connect_inner()).await
    }

    async fn connect_inner(&self) -> Result<MySqlConnection, Error> {
        let socket = match &self.socket {
            #[cfg(unix)]
            Some(path) => MaybeTlsStream::new(mywire_core::net::connect_uds(path).await?),

            #[cfg(not(unix))]
            Some(_) => {
                return Err(Error::Configuration(
                    "unix domain sockets are not supported on this platform".into(),
                ))
            }

            None => MaybeTlsStream::new(mywire_core::net::connect_tcp(&self.host, self.port).await?),
        };

        self.establish(socket).await
    }

    /// Runs the connection phase over a transport the caller connected.
    pub(crate) async fn connect_socket(&self, socket: MaybeTlsStream) -> Result<MySqlConnection, Error> {
        self.within_connect_timeout(self.establish(socket)).await
    }

    async fn within_connect_timeout(
        &self,
        connecting: impl Future<Output = Result<MySqlConnection, Error>>,
    ) -> Result<MySqlConnection, Error> {
        let timeout = self.connect_timeout;

        match tokio::time::timeout(timeout, connecting).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connecting did not complete within {timeout:?}"),
            )
            .into()),
        }
    }

    async fn establish(&self, socket: MaybeTlsStream) -> Result<MySqlConnection, Error> {
        let mut io = PacketIo::new(socket);

        if let Some(size) = self.packet_chunk_size {
            io.set_chunk_size(size);
        }

        io.set_max_write(self.max_allowed_packet);
        io.set_max_read(self.max_read_bytes);
        io.set_read_timeout(self.socket_timeout);

        let chain = PacketChain::new(&self.instrumentation);
        let stream = HandshakeEngine::new(self).establish(io, chain).await?;

        let mut conn = MySqlConnection::new(stream, self);

        tracing::debug!(
            thread_id = conn.thread_id(),
            server_version = %conn.session().server_version(),
            tls = conn.session().is_ssl(),
            compression = conn.session().is_compressed(),
            "connection established"
        );

        // After the connection is established, we initialize by configuring a few
        // connection parameters

        // https://mariadb.com/kb/en/sql-mode/

        // PIPES_AS_CONCAT - Allows using the pipe character (ASCII 124) as string concatenation operator.
        //                   This means that "A" || "B" can be used in place of CONCAT("A", "B").

        // NO_ENGINE_SUBSTITUTION - If not set, if the available storage engine specified by a CREATE TABLE is
        //                          not available, a warning is given and the default storage
        //                          engine is used instead.

        if let Some(sql) = self.init_statement() {
            conn.execute(&sql).await?;
        }

        // rewritten batches derive generated ids from the first one
        if self.rewrite_batched_statements {
            let increment: u64 = conn
                .fetch_one("SELECT @@session.auto_increment_increment")
                .await?
                .try_get(0)?;

            conn.stream.session.auto_increment_increment = increment.max(1);
        }

        Ok(conn)
    }

    /// The `SET` statement run once the session is authenticated, if there is anything to set.
    pub(crate) fn init_statement(&self) -> Option<String> {
        let mut sql_mode = Vec::new();

        if self.pipes_as_concat {
            sql_mode.push("PIPES_AS_CONCAT");
        }

        if self.no_engine_substitution {
            sql_mode.push("NO_ENGINE_SUBSTITUTION");
        }

        let mut assignments = Vec::new();

        if !sql_mode.is_empty() {
            assignments.push(format!(
                "sql_mode=(SELECT CONCAT(@@sql_mode, ',{}'))",
                sql_mode.join(",")
            ));
        }

        if let Some(timezone) = &self.timezone {
            assignments.push(format!("time_zone='{timezone}'"));
        }

        if self.set_names {
            assignments.push(match &self.collation {
                Some(collation) => format!("NAMES {} COLLATE {collation}", self.charset),
                None => format!("NAMES {}", self.charset),
            });
        }

        if assignments.is_empty() {
            return None;
        }

        Some(format!("SET {}", assignments.join(",")))
    }
}

#[cfg(test)]
mod tests {
    use crate::MySqlConnectOptions;

    #[test]
    fn it_initializes_the_session_in_one_statement() {
        let options = MySqlConnectOptions::new();

        assert_eq!(
            options.init_statement().as_deref(),
            Some(
                "SET sql_mode=(SELECT CONCAT(@@sql_mode, ',PIPES_AS_CONCAT,NO_ENGINE_SUBSTITUTION')),\
                 time_zone='+00:00',NAMES utf8mb4"
            )
        );
    }

    #[test]
    fn it_sets_the_requested_collation() {
        let options = MySqlConnectOptions::new()
            .pipes_as_concat(false)
            .timezone(None)
            .collation("utf8mb4_bin");

        assert_eq!(
            options.init_statement().as_deref(),
            Some("SET sql_mode=(SELECT CONCAT(@@sql_mode, ',NO_ENGINE_SUBSTITUTION')),NAMES utf8mb4 COLLATE utf8mb4_bin")
        );
    }

    #[test]
    fn it_skips_initialization_when_nothing_is_set() {
        let options = MySqlConnectOptions::new()
            .pipes_as_concat(false)
            .no_engine_substitution(false)
            .timezone(None)
            .set_names(false);

        assert_eq!(options.init_statement(), None);
    }
}
