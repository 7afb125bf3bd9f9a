// The collation id in a column definition is informational only. The server transcodes every
// string to the connection character set except for `binary` (63), so that is the one id the
// decoder needs to tell strings from bytes.
//
// The handshake carries the low byte of the collation id the session starts with.

/// A server collation id.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Collation(pub u16);

impl Collation {
    /// Collation used for all non-string data.
    pub const BINARY: Self = Collation(63);

    /// Most broadly supported UTF-8 collation.
    pub const UTF8MB4_GENERAL_CI: Self = Collation(45);

    /// Default collation of `utf8mb4` on MySQL 8.
    pub const UTF8MB4_0900_AI_CI: Self = Collation(255);

    pub const UTF8MB3_GENERAL_CI: Self = Collation(33);

    pub const LATIN1_SWEDISH_CI: Self = Collation(8);

    /// The collation announced in the handshake for a character set name, if it is one the
    /// handshake can express.
    pub(crate) fn for_charset(charset: &str) -> Option<Self> {
        match charset.to_ascii_lowercase().as_str() {
            "utf8mb4" => Some(Self::UTF8MB4_GENERAL_CI),
            "utf8" | "utf8mb3" => Some(Self::UTF8MB3_GENERAL_CI),
            "latin1" => Some(Self::LATIN1_SWEDISH_CI),
            "binary" => Some(Self::BINARY),
            _ => None,
        }
    }

    /// The id as sent in the one-byte handshake field.
    pub(crate) fn handshake_id(self) -> u8 {
        // ids above 255 fall back to utf8mb4_general_ci until `SET NAMES` runs
        u8::try_from(self.0).unwrap_or(45)
    }
}
