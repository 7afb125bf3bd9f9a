use std::str::from_utf8;

use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};

use super::{to_asciz, xor_eq};
use crate::error::{Error, MySqlClientError};

/// Encrypts `password` for a full authentication round without TLS.
///
/// The NUL terminated password is XORed with the (cycled) nonce and then encrypted with
/// RSA-OAEP/SHA-1 under the server's public key.
pub(super) fn encrypt(
    plugin: &'static str,
    key: &[u8],
    password: &str,
    nonce: &[u8],
) -> Result<Vec<u8>, Error> {
    // xor the password with the given nonce
    let mut pass = to_asciz(password);
    xor_eq(&mut pass, nonce);

    // client sends an RSA encrypted password
    let public = parse_rsa_pub_key(plugin, key)?;
    let padding = Oaep::new::<sha1::Sha1>();

    public
        .encrypt(&mut rand::thread_rng(), padding, &pass[..])
        .map_err(|err| MySqlClientError::auth_plugin(plugin, err).into())
}

// MySQL sends PKCS#8 keys, some proxies PKCS#1
fn parse_rsa_pub_key(plugin: &'static str, key: &[u8]) -> Result<RsaPublicKey, Error> {
    let pem = from_utf8(key).map_err(|err| MySqlClientError::auth_plugin(plugin, err))?;

    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|err| MySqlClientError::auth_plugin(plugin, err).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PKCS8: &str = "-----BEGIN PUBLIC KEY-----
MIGfMA0GCSqGSIb3DQEBAQUAA4GNADCBiQKBgQCwp3GFTZ/ALfYBaPRz6i38cCTB
UkNBSgd3HrjB4Lcyo+Ejwjwn8ljlcfOKihN7m06jAydqTiKdeYMHqCuTEF4dd2C/
hFzJxYKxfaI99WjC6WAtQh9zvPdYfpkt92G33mW02BbsxukJJFz5UH4r8o3hKoJ7
ETMpFdmWUXF6XLpyWwIDAQAB
-----END PUBLIC KEY-----
";

    const PKCS1: &str = "-----BEGIN RSA PUBLIC KEY-----
MIGJAoGBALCncYVNn8At9gFo9HPqLfxwJMFSQ0FKB3ceuMHgtzKj4SPCPCfyWOVx
84qKE3ubTqMDJ2pOIp15gweoK5MQXh13YL+EXMnFgrF9oj31aMLpYC1CH3O891h+
mS33YbfeZbTYFuzG6QkkXPlQfivyjeEqgnsRMykV2ZZRcXpcunJbAgMBAAE=
-----END RSA PUBLIC KEY-----
";

    #[test]
    fn it_encrypts_with_either_key_encoding() {
        for key in [PKCS8, PKCS1] {
            let encrypted =
                encrypt("sha256_password", key.as_bytes(), "secret", b"01234567890123456789")
                    .unwrap();

            // a 1024 bit modulus
            assert_eq!(encrypted.len(), 128);
        }
    }

    #[test]
    fn it_rejects_garbage_keys() {
        assert!(encrypt("sha256_password", b"not a key", "secret", b"nonce").is_err());
    }
}
