use bytes::Bytes;
use sha2::{Digest, Sha256};

use super::rsa::encrypt as rsa_encrypt;
use super::{to_asciz, xor_eq, AuthContext, AuthPlugin};
use crate::error::{Error, MySqlClientError};

/// Implements SHA-256 authentication but uses caching on the server-side for better performance.
/// After the first authentication, a fast path is used that doesn't involve the RSA key exchange.
///
/// <https://dev.mysql.com/doc/refman/8.0/en/caching-sha2-pluggable-authentication.html>
/// <https://mariadb.com/kb/en/caching_sha2_password-authentication-plugin/>
#[derive(Debug)]
pub(crate) struct CachingSha2AuthPlugin;

const REQUEST_PUBLIC_KEY: u8 = 0x02;
const FAST_AUTH_SUCCESS: u8 = 0x03;
const PERFORM_FULL_AUTH: u8 = 0x04;

impl AuthPlugin for CachingSha2AuthPlugin {
    fn name(&self) -> &'static str {
        "caching_sha2_password"
    }

    fn scramble(&self, cx: AuthContext<'_>) -> Result<Vec<u8>, Error> {
        if cx.password.is_empty() {
            // empty password => no scramble
            return Ok(Vec::new());
        }

        // SHA256( password ) ^ SHA256( SHA256( SHA256( password ) ) + nonce )

        let mut hasher = Sha256::new();

        hasher.update(cx.password);

        // SHA256( password )
        let mut pw_sha2 = hasher.finalize_reset();

        hasher.update(&pw_sha2);

        // SHA256( SHA256( password ) )
        let pw_sha2_sha2 = hasher.finalize_reset();

        hasher.update(pw_sha2_sha2);
        hasher.update(cx.nonce);

        // SHA256( SHA256( SHA256( password ) ) + nonce )
        let pw_sha2_sha2_nonce = hasher.finalize();

        xor_eq(&mut pw_sha2, &pw_sha2_sha2_nonce);

        Ok(pw_sha2.to_vec())
    }

    fn handle(&self, data: Bytes, cx: AuthContext<'_>) -> Result<Option<Vec<u8>>, Error> {
        match data.first() {
            None => Err(MySqlClientError::EmptyPacket {
                context: "caching_sha2_password more data",
            }
            .into()),

            // good to go, the OK packet follows
            Some(&FAST_AUTH_SUCCESS) => Ok(None),

            // the password is not cached on the server, so it must be sent in full
            Some(&PERFORM_FULL_AUTH) if cx.secure => Ok(Some(to_asciz(cx.password))),
            Some(&PERFORM_FULL_AUTH) => Ok(Some(vec![REQUEST_PUBLIC_KEY])),

            // anything else is the PEM encoded public key we asked for
            Some(_) => rsa_encrypt(self.name(), &data, cx.password, cx.nonce).map(Some),
        }
    }
}
