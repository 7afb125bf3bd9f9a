use std::fmt::Debug;

use bytes::Bytes;

use crate::error::{Error, MySqlClientError};

mod caching_sha2;
mod clear;
mod native;
mod rsa;
mod sha256;

pub(crate) use self::caching_sha2::CachingSha2AuthPlugin;
pub(crate) use self::clear::ClearPasswordAuthPlugin;
pub(crate) use self::native::NativeAuthPlugin;
pub(crate) use self::sha256::Sha256AuthPlugin;

/// What a plugin gets to see while computing a response.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AuthContext<'a> {
    /// The 20 byte challenge from the greeting or the latest auth switch.
    pub(crate) nonce: &'a [u8],
    pub(crate) password: &'a str,
    /// The transport is encrypted, so the password may travel in cleartext.
    pub(crate) secure: bool,
}

pub(crate) trait AuthPlugin: 'static + Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// The first auth response, sent in the handshake response or auth switch response.
    fn scramble(&self, cx: AuthContext<'_>) -> Result<Vec<u8>, Error>;

    // Handle "more data" from the MySQL server
    //  which tells the plugin some plugin-specific information
    //  if the plugin returns Some(_) that is sent back to MySQL
    fn handle(&self, data: Bytes, cx: AuthContext<'_>) -> Result<Option<Vec<u8>>, Error>;
}

impl dyn AuthPlugin {
    pub(crate) fn parse(name: &str, enable_cleartext_plugin: bool) -> Result<Box<Self>, Error> {
        match name {
            "caching_sha2_password" => Ok(Box::new(CachingSha2AuthPlugin)),
            "sha256_password" => Ok(Box::new(Sha256AuthPlugin)),
            "mysql_native_password" => Ok(Box::new(NativeAuthPlugin)),
            "mysql_clear_password" if enable_cleartext_plugin => {
                Ok(Box::new(ClearPasswordAuthPlugin))
            }

            _ => Err(MySqlClientError::UnknownAuthPlugin(name.to_owned()).into()),
        }
    }
}

// XOR(x, y)
// If len(y) < len(x), wrap around inside y
fn xor_eq(x: &mut [u8], y: &[u8]) {
    if y.is_empty() {
        return;
    }

    for (i, b) in x.iter_mut().enumerate() {
        *b ^= y[i % y.len()];
    }
}

fn to_asciz(s: &str) -> Vec<u8> {
    let mut z = Vec::with_capacity(s.len() + 1);
    z.extend_from_slice(s.as_bytes());
    z.push(0);

    z
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_loads_known_plugins() {
        for name in ["caching_sha2_password", "sha256_password", "mysql_native_password"] {
            assert_eq!(<dyn AuthPlugin>::parse(name, false).unwrap().name(), name);
        }
    }

    #[test]
    fn it_gates_the_cleartext_plugin() {
        assert!(<dyn AuthPlugin>::parse("mysql_clear_password", false).is_err());
        assert!(<dyn AuthPlugin>::parse("mysql_clear_password", true).is_ok());
    }

    #[test]
    fn it_rejects_unknown_plugins() {
        let err = <dyn AuthPlugin>::parse("dialog", true).unwrap_err();

        assert_eq!(
            err.as_database_error().unwrap().message(),
            "Authentication plugin 'dialog' cannot be loaded"
        );
    }

    #[test]
    fn it_cycles_the_xor_key() {
        let mut x = vec![0xff, 0x0f, 0xf0];
        xor_eq(&mut x, &[0x0f]);

        assert_eq!(x, [0xf0, 0x00, 0xff]);
    }
}
