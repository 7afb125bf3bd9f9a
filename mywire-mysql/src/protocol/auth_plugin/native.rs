use bytes::Bytes;
use sha1::{Digest, Sha1};

use super::{xor_eq, AuthContext, AuthPlugin};
use crate::error::{Error, MySqlClientError};

/// The pre-8.0 default: a SHA-1 challenge/response.
///
/// <https://dev.mysql.com/doc/internals/en/secure-password-authentication.html>
#[derive(Debug)]
pub(crate) struct NativeAuthPlugin;

impl AuthPlugin for NativeAuthPlugin {
    fn name(&self) -> &'static str {
        "mysql_native_password"
    }

    fn scramble(&self, cx: AuthContext<'_>) -> Result<Vec<u8>, Error> {
        if cx.password.is_empty() {
            return Ok(Vec::new());
        }

        // SHA1( password ) ^ SHA1( nonce + SHA1( SHA1( password ) ) )

        let mut hasher = Sha1::new();

        hasher.update(cx.password);

        // SHA1( password )
        let mut pw_sha1 = hasher.finalize_reset();

        hasher.update(&pw_sha1);

        // SHA1( SHA1( password ) )
        let pw_sha1_sha1 = hasher.finalize_reset();

        hasher.update(cx.nonce);
        hasher.update(pw_sha1_sha1);

        // SHA1( nonce + SHA1( SHA1( password ) ) )
        let nonce_pw_sha1_sha1 = hasher.finalize();

        xor_eq(&mut pw_sha1, &nonce_pw_sha1_sha1);

        Ok(pw_sha1.to_vec())
    }

    fn handle(&self, _data: Bytes, _cx: AuthContext<'_>) -> Result<Option<Vec<u8>>, Error> {
        Err(MySqlClientError::auth_plugin(self.name(), "unexpected extra data from the server").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cx(password: &str) -> AuthContext<'_> {
        const NONCE: &[u8] = &[
            1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20,
        ];

        AuthContext {
            nonce: NONCE,
            password,
            secure: false,
        }
    }

    #[test]
    fn it_scrambles_with_sha1() {
        let scramble = NativeAuthPlugin.scramble(cx("secret")).unwrap();

        assert_eq!(
            hex::encode(scramble),
            "b32bb3a583e1340c0a1108d58b1be49781ad8c2f"
        );
    }

    #[test]
    fn it_sends_nothing_for_an_empty_password() {
        assert!(NativeAuthPlugin.scramble(cx("")).unwrap().is_empty());
    }
}
