//! A scripted MySQL server speaking over an in-memory pipe.
//!
//! Tests drive both ends: the client under test gets the [`DuplexStream`] returned by
//! [`MockServer::pair`], the test script answers its commands packet by packet.

use std::io::{Read, Write};

use anyhow::{bail, ensure};
use bytes::BytesMut;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use mywire::mysql::Capabilities;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

/// Command bytes as sent by the client.
pub mod commands {
    pub const QUIT: u8 = 0x01;
    pub const QUERY: u8 = 0x03;
    pub const PING: u8 = 0x0e;
    pub const STMT_PREPARE: u8 = 0x16;
    pub const STMT_EXECUTE: u8 = 0x17;
    pub const STMT_CLOSE: u8 = 0x19;
    pub const STMT_FETCH: u8 = 0x1c;
}

const SERVER_STATUS_AUTOCOMMIT: u16 = 0x0002;

// below this the mock sends envelopes uncompressed, like the server does
const MIN_COMPRESS_LENGTH: usize = 50;

/// The initial handshake packet of the mock.
#[derive(Debug, Clone)]
pub struct Greeting {
    pub server_version: String,
    pub thread_id: u32,
    pub capabilities: Capabilities,
    pub status: u16,
    pub auth_plugin: String,
}

impl Default for Greeting {
    fn default() -> Self {
        Self {
            server_version: String::from("8.0.36"),
            thread_id: 11,
            capabilities: Capabilities::PROTOCOL_41
                | Capabilities::LONG_PASSWORD
                | Capabilities::LONG_FLAG
                | Capabilities::CONNECT_WITH_DB
                | Capabilities::TRANSACTIONS
                | Capabilities::SECURE_CONNECTION
                | Capabilities::MULTI_STATEMENTS
                | Capabilities::MULTI_RESULTS
                | Capabilities::PS_MULTI_RESULTS
                | Capabilities::PLUGIN_AUTH
                | Capabilities::PLUGIN_AUTH_LENENC_DATA
                | Capabilities::CONNECT_ATTRS,
            status: SERVER_STATUS_AUTOCOMMIT,
            auth_plugin: String::from("mysql_native_password"),
        }
    }
}

impl Greeting {
    pub fn with(mut self, capabilities: Capabilities) -> Self {
        self.capabilities |= capabilities;
        self
    }

    fn encode(&self) -> Vec<u8> {
        let nonce = b"abcdefghijklmnopqrst";
        let capabilities = self.capabilities.bits().to_le_bytes();

        let mut buf = vec![0x0a];
        buf.extend_from_slice(self.server_version.as_bytes());
        buf.push(0);
        buf.extend_from_slice(&self.thread_id.to_le_bytes());
        buf.extend_from_slice(&nonce[..8]);
        buf.push(0);
        buf.extend_from_slice(&capabilities[..2]);
        buf.push(45); // utf8mb4_general_ci
        buf.extend_from_slice(&self.status.to_le_bytes());
        buf.extend_from_slice(&capabilities[2..4]);
        buf.push(21);
        buf.extend_from_slice(&[0; 10]);
        buf.extend_from_slice(&nonce[8..]);
        buf.push(0);
        buf.extend_from_slice(self.auth_plugin.as_bytes());
        buf.push(0);
        buf
    }
}

/// A column of a result set sent by the mock.
#[derive(Debug, Clone)]
pub struct MockColumn {
    pub name: String,
    pub type_id: u8,
    pub charset: u16,
}

impl MockColumn {
    pub fn bigint(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            type_id: 0x08,
            charset: 63,
        }
    }

    pub fn varchar(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            type_id: 0xfd,
            charset: 45,
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        put_str_lenenc(&mut buf, "def");
        put_str_lenenc(&mut buf, ""); // schema
        put_str_lenenc(&mut buf, ""); // table alias
        put_str_lenenc(&mut buf, ""); // table
        put_str_lenenc(&mut buf, &self.name); // alias
        put_str_lenenc(&mut buf, &self.name);

        buf.push(0x0c);
        buf.extend_from_slice(&self.charset.to_le_bytes());
        buf.extend_from_slice(&255_u32.to_le_bytes());
        buf.push(self.type_id);
        buf.extend_from_slice(&0_u16.to_le_bytes()); // flags
        buf.push(0); // decimals
        buf.extend_from_slice(&[0, 0]);

        buf
    }
}

pub struct MockServer {
    socket: DuplexStream,
    sequence_id: u8,
    // the next compressed sequence id, once compression is on
    compression: Option<u8>,
    deprecate_eof: bool,
    inbox: BytesMut,
}

impl MockServer {
    /// Returns the client end of the pipe and the server driving the other end.
    pub fn pair() -> (DuplexStream, MockServer) {
        let (client, server) = tokio::io::duplex(1 << 20);

        let server = MockServer {
            socket: server,
            sequence_id: 0,
            compression: None,
            deprecate_eof: false,
            inbox: BytesMut::new(),
        };

        (client, server)
    }

    /// Runs the connection phase up to the final OK and returns the handshake response.
    ///
    /// Compression and deprecated EOF packets are switched on if both sides advertised them.
    pub async fn accept(&mut self, greeting: &Greeting) -> anyhow::Result<Vec<u8>> {
        self.sequence_id = 0;
        self.send(&greeting.encode()).await?;

        let response = self.recv().await?;
        ensure!(response.len() >= 4, "handshake response too short");

        let client = Capabilities::from_bits_truncate(u64::from(u32::from_le_bytes([
            response[0],
            response[1],
            response[2],
            response[3],
        ])));

        let negotiated = client & greeting.capabilities;

        self.ok().await?;

        if negotiated.contains(Capabilities::COMPRESS) {
            self.compression = Some(0);
        }

        self.deprecate_eof = negotiated.contains(Capabilities::DEPRECATE_EOF);

        Ok(response)
    }

    /// Sends the greeting, then refuses the login with an ERR packet.
    pub async fn reject(&mut self, greeting: &Greeting, code: u16, message: &str) -> anyhow::Result<()> {
        self.sequence_id = 0;
        self.send(&greeting.encode()).await?;
        self.recv().await?;
        self.err(code, "28000", message).await
    }

    pub fn is_compressed(&self) -> bool {
        self.compression.is_some()
    }

    /// Reads one packet and returns its payload. Replies continue its sequence.
    pub async fn recv(&mut self) -> anyhow::Result<Vec<u8>> {
        loop {
            if let Some(payload) = self.take_packet() {
                return Ok(payload);
            }

            self.fill().await?;
        }
    }

    /// Reads the next command, failing unless it is `command`. Returns what follows the
    /// command byte.
    pub async fn expect_command(&mut self, command: u8) -> anyhow::Result<Vec<u8>> {
        let payload = self.recv().await?;

        ensure!(
            payload.first() == Some(&command),
            "expected command 0x{command:02x}, got {:02x?}",
            payload.first()
        );

        Ok(payload[1..].to_vec())
    }

    pub async fn expect_query(&mut self) -> anyhow::Result<String> {
        let sql = self.expect_command(commands::QUERY).await?;
        Ok(String::from_utf8(sql)?)
    }

    /// Reads a `COM_STMT_PREPARE` and returns its SQL.
    pub async fn expect_prepare(&mut self) -> anyhow::Result<String> {
        let sql = self.expect_command(commands::STMT_PREPARE).await?;
        Ok(String::from_utf8(sql)?)
    }

    /// Reads a `COM_STMT_EXECUTE` and returns the statement id, the cursor flag and the
    /// bytes after the iteration count.
    pub async fn expect_execute(&mut self) -> anyhow::Result<(u32, u8, Vec<u8>)> {
        let payload = self.expect_command(commands::STMT_EXECUTE).await?;
        ensure!(payload.len() >= 9, "COM_STMT_EXECUTE too short");

        let statement = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);

        Ok((statement, payload[4], payload[9..].to_vec()))
    }

    pub async fn send(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        let mut packet = payload.len().to_le_bytes()[..3].to_vec();
        packet.push(self.sequence_id);
        packet.extend_from_slice(payload);

        self.sequence_id = self.sequence_id.wrapping_add(1);

        self.send_raw(&packet).await
    }

    /// Writes bytes as they are, inside a compressed envelope if compression is on.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        match self.compression {
            None => self.socket.write_all(bytes).await?,

            Some(sequence_id) => {
                let (body, uncompressed_len) = if bytes.len() < MIN_COMPRESS_LENGTH {
                    (bytes.to_vec(), 0)
                } else {
                    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                    encoder.write_all(bytes)?;
                    (encoder.finish()?, bytes.len())
                };

                let mut envelope = body.len().to_le_bytes()[..3].to_vec();
                envelope.push(sequence_id);
                envelope.extend_from_slice(&uncompressed_len.to_le_bytes()[..3]);
                envelope.extend_from_slice(&body);

                self.compression = Some(sequence_id.wrapping_add(1));
                self.socket.write_all(&envelope).await?;
            }
        }

        Ok(())
    }

    pub async fn ok(&mut self) -> anyhow::Result<()> {
        self.ok_with(0, 0, SERVER_STATUS_AUTOCOMMIT).await
    }

    pub async fn ok_with(&mut self, affected_rows: u64, last_insert_id: u64, status: u16) -> anyhow::Result<()> {
        let mut buf = vec![0x00];
        put_uint_lenenc(&mut buf, affected_rows);
        put_uint_lenenc(&mut buf, last_insert_id);
        buf.extend_from_slice(&status.to_le_bytes());
        buf.extend_from_slice(&0_u16.to_le_bytes());

        self.send(&buf).await
    }

    pub async fn err(&mut self, code: u16, sql_state: &str, message: &str) -> anyhow::Result<()> {
        let mut buf = vec![0xff];
        buf.extend_from_slice(&code.to_le_bytes());
        buf.push(b'#');
        buf.extend_from_slice(sql_state.as_bytes());
        buf.extend_from_slice(message.as_bytes());

        self.send(&buf).await
    }

    /// Ends a list of definitions or rows: an EOF packet, or an OK packet with the EOF
    /// header once EOF is deprecated.
    pub async fn eof(&mut self, status: u16) -> anyhow::Result<()> {
        if self.deprecate_eof {
            let mut buf = vec![0xfe, 0x00, 0x00];
            buf.extend_from_slice(&status.to_le_bytes());
            buf.extend_from_slice(&0_u16.to_le_bytes());

            return self.send(&buf).await;
        }

        let mut buf = vec![0xfe];
        buf.extend_from_slice(&0_u16.to_le_bytes());
        buf.extend_from_slice(&status.to_le_bytes());

        self.send(&buf).await
    }

    /// Sends the column count and definitions that open a result set.
    pub async fn columns(&mut self, columns: &[MockColumn], status: u16) -> anyhow::Result<()> {
        let mut count = Vec::new();
        put_uint_lenenc(&mut count, columns.len() as u64);
        self.send(&count).await?;

        for column in columns {
            self.send(&column.encode()).await?;
        }

        if !self.deprecate_eof {
            self.eof(status).await?;
        }

        Ok(())
    }

    pub async fn text_row(&mut self, values: &[Option<&str>]) -> anyhow::Result<()> {
        let mut buf = Vec::new();

        for value in values {
            match value {
                Some(value) => put_str_lenenc(&mut buf, value),
                None => buf.push(0xfb),
            }
        }

        self.send(&buf).await
    }

    /// Sends a binary row of `BIGINT` values.
    pub async fn binary_row(&mut self, values: &[Option<i64>]) -> anyhow::Result<()> {
        let mut null_bitmap = vec![0_u8; (values.len() + 9) / 8];
        let mut data = Vec::new();

        for (idx, value) in values.iter().enumerate() {
            match value {
                Some(value) => data.extend_from_slice(&value.to_le_bytes()),
                None => null_bitmap[(idx + 2) / 8] |= 1 << ((idx + 2) % 8),
            }
        }

        let mut buf = vec![0x00];
        buf.extend_from_slice(&null_bitmap);
        buf.extend_from_slice(&data);

        self.send(&buf).await
    }

    /// Sends a complete text result set.
    pub async fn result_set(&mut self, columns: &[MockColumn], rows: &[&[Option<&str>]]) -> anyhow::Result<()> {
        self.columns(columns, SERVER_STATUS_AUTOCOMMIT).await?;

        for row in rows {
            self.text_row(row).await?;
        }

        self.eof(SERVER_STATUS_AUTOCOMMIT).await
    }

    /// Answers a `COM_STMT_PREPARE`.
    pub async fn prepare_ok(&mut self, statement: u32, params: u16, columns: &[MockColumn]) -> anyhow::Result<()> {
        let mut buf = vec![0x00];
        buf.extend_from_slice(&statement.to_le_bytes());
        buf.extend_from_slice(&u16::try_from(columns.len())?.to_le_bytes());
        buf.extend_from_slice(&params.to_le_bytes());
        buf.push(0);
        buf.extend_from_slice(&0_u16.to_le_bytes());

        self.send(&buf).await?;

        if params > 0 {
            for _ in 0..params {
                self.send(&MockColumn::varchar("?").encode()).await?;
            }

            if !self.deprecate_eof {
                self.eof(SERVER_STATUS_AUTOCOMMIT).await?;
            }
        }

        if !columns.is_empty() {
            for column in columns {
                self.send(&column.encode()).await?;
            }

            if !self.deprecate_eof {
                self.eof(SERVER_STATUS_AUTOCOMMIT).await?;
            }
        }

        Ok(())
    }

    fn take_packet(&mut self) -> Option<Vec<u8>> {
        if self.inbox.len() < 4 {
            return None;
        }

        let len = u24_le(&self.inbox[..3]);

        if self.inbox.len() < 4 + len {
            return None;
        }

        self.sequence_id = self.inbox[3].wrapping_add(1);

        let packet = self.inbox.split_to(4 + len);
        Some(packet[4..].to_vec())
    }

    async fn fill(&mut self) -> anyhow::Result<()> {
        if self.compression.is_none() {
            let mut buf = [0; 4096];
            let read = self.socket.read(&mut buf).await?;

            if read == 0 {
                bail!("client closed the connection");
            }

            self.inbox.extend_from_slice(&buf[..read]);
            return Ok(());
        }

        let mut header = [0; 7];
        self.socket.read_exact(&mut header).await?;

        let compressed_len = u24_le(&header[..3]);
        let uncompressed_len = u24_le(&header[4..]);

        let mut body = vec![0; compressed_len];
        self.socket.read_exact(&mut body).await?;

        self.compression = Some(header[3].wrapping_add(1));

        if uncompressed_len == 0 {
            self.inbox.extend_from_slice(&body);
        } else {
            let mut inflated = Vec::with_capacity(uncompressed_len);
            ZlibDecoder::new(&body[..]).read_to_end(&mut inflated)?;

            ensure!(inflated.len() == uncompressed_len, "envelope length mismatch");
            self.inbox.extend_from_slice(&inflated);
        }

        Ok(())
    }
}

fn u24_le(buf: &[u8]) -> usize {
    usize::from(buf[0]) | usize::from(buf[1]) << 8 | usize::from(buf[2]) << 16
}

fn put_uint_lenenc(buf: &mut Vec<u8>, value: u64) {
    let bytes = value.to_le_bytes();

    match value {
        0..=250 => buf.push(bytes[0]),
        251..=0xFF_FF => {
            buf.push(0xfc);
            buf.extend_from_slice(&bytes[..2]);
        }
        0x1_00_00..=0xFF_FF_FF => {
            buf.push(0xfd);
            buf.extend_from_slice(&bytes[..3]);
        }
        _ => {
            buf.push(0xfe);
            buf.extend_from_slice(&bytes);
        }
    }
}

fn put_str_lenenc(buf: &mut Vec<u8>, value: &str) {
    put_uint_lenenc(buf, value.len() as u64);
    buf.extend_from_slice(value.as_bytes());
}
