use std::str::FromStr;

use crate::error::Error;

/// How the connection phase treats TLS. Set with
/// [`ssl_mode`](super::MySqlConnectOptions::ssl_mode).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MySqlSslMode {
    /// Never upgrade, even when the server offers TLS.
    Disabled,

    /// Upgrade when the server advertises TLS, stay in plaintext otherwise.
    #[default]
    Preferred,

    /// Fail the connection unless it can be upgraded. The certificate is not verified.
    Required,

    /// As `Required`, and the certificate chain must lead to a trusted root.
    VerifyCa,

    /// As `VerifyCa`, and the certificate must be issued for the configured host.
    VerifyIdentity,
}

impl MySqlSslMode {
    /// Whether the connection fails rather than falling back to plaintext.
    pub(crate) fn is_required(self) -> bool {
        matches!(
            self,
            MySqlSslMode::Required | MySqlSslMode::VerifyCa | MySqlSslMode::VerifyIdentity
        )
    }
}

impl FromStr for MySqlSslMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        Ok(match &*s.to_ascii_lowercase() {
            "disabled" => MySqlSslMode::Disabled,
            "preferred" => MySqlSslMode::Preferred,
            "required" => MySqlSslMode::Required,
            "verify_ca" => MySqlSslMode::VerifyCa,
            "verify_identity" => MySqlSslMode::VerifyIdentity,

            _ => {
                return Err(Error::Configuration(
                    format!("unknown value {s:?} for `ssl_mode`").into(),
                ));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_parses_modes_case_insensitively() {
        assert_eq!(
            "VERIFY_IDENTITY".parse::<MySqlSslMode>().unwrap(),
            MySqlSslMode::VerifyIdentity
        );
        assert_eq!("disabled".parse::<MySqlSslMode>().unwrap(), MySqlSslMode::Disabled);
        assert!("sometimes".parse::<MySqlSslMode>().is_err());
    }

    #[test]
    fn it_defaults_to_preferred() {
        assert_eq!(MySqlSslMode::default(), MySqlSslMode::Preferred);
        assert!(!MySqlSslMode::Preferred.is_required());
        assert!(MySqlSslMode::VerifyCa.is_required());
    }
}
