use bytes::Bytes;

use super::{to_asciz, AuthContext, AuthPlugin};
use crate::error::Error;

/// Implements SHA-256 authentication.
///
/// Without TLS every connect performs an RSA key exchange, which slows down
/// auth quite a bit.
///
/// <https://dev.mysql.com/doc/refman/8.0/en/sha256-pluggable-authentication.html>
/// <https://mariadb.com/kb/en/sha256_password-plugin/>
#[derive(Debug)]
pub(crate) struct Sha256AuthPlugin;

impl AuthPlugin for Sha256AuthPlugin {
    fn name(&self) -> &'static str {
        "sha256_password"
    }

    fn scramble(&self, cx: AuthContext<'_>) -> Result<Vec<u8>, Error> {
        if cx.password.is_empty() {
            // no password => do not ask for RSA key
            return Ok(Vec::new());
        }

        if cx.secure {
            return Ok(to_asciz(cx.password));
        }

        // ask for the RSA key
        Ok(vec![0x01])
    }

    fn handle(&self, data: Bytes, cx: AuthContext<'_>) -> Result<Option<Vec<u8>>, Error> {
        let rsa_pub_key = data;
        let encrypted = super::rsa::encrypt(self.name(), &rsa_pub_key, cx.password, cx.nonce)?;

        Ok(Some(encrypted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_requests_the_key_unless_secure() {
        let mut cx = AuthContext {
            nonce: b"01234567890123456789",
            password: "pw",
            secure: false,
        };

        assert_eq!(Sha256AuthPlugin.scramble(cx).unwrap(), b"\x01");

        cx.secure = true;
        assert_eq!(Sha256AuthPlugin.scramble(cx).unwrap(), b"pw\0");
    }
}
