use std::io::Cursor;
use std::sync::Arc;

use ::rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use ::rustls::client::WebPkiServerVerifier;
use ::rustls::crypto::CryptoProvider;
use ::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use ::rustls::{
    CertificateError, ClientConfig, DigitallySignedStruct, Error as TlsError, RootCertStore,
    SignatureScheme, SupportedProtocolVersion,
};
use tokio_rustls::TlsConnector;

use crate::error::Error;
use crate::net::tls::TlsConfig;

pub(super) async fn configure_tls_connector(config: &TlsConfig<'_>) -> Result<TlsConnector, Error> {
    let provider = Arc::new(::rustls::crypto::ring::default_provider());
    let versions = protocol_versions(config.tls_versions)?;

    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&versions)
        .map_err(Error::tls)?;

    let client_config = if config.accept_invalid_certs {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate { provider }))
            .with_no_client_auth()
    } else {
        let mut cert_store = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect(),
        };

        if let Some(ca) = config.root_cert_path {
            let data = ca.data().await?;
            let mut cursor = Cursor::new(data);

            for cert in rustls_pemfile::certs(&mut cursor) {
                cert_store
                    .add(cert.map_err(Error::tls)?)
                    .map_err(Error::tls)?;
            }
        }

        if config.accept_invalid_hostnames {
            let verifier = WebPkiServerVerifier::builder_with_provider(Arc::new(cert_store), provider)
                .build()
                .map_err(Error::tls)?;

            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(IgnoreHostname { verifier }))
                .with_no_client_auth()
        } else {
            builder
                .with_root_certificates(cert_store)
                .with_no_client_auth()
        }
    };

    Ok(TlsConnector::from(Arc::new(client_config)))
}

fn protocol_versions(names: &[String]) -> Result<Vec<&'static SupportedProtocolVersion>, Error> {
    if names.is_empty() {
        return Ok(::rustls::DEFAULT_VERSIONS.to_vec());
    }

    names
        .iter()
        .map(|name| match name.trim() {
            "TLSv1.2" => Ok(&::rustls::version::TLS12),
            "TLSv1.3" => Ok(&::rustls::version::TLS13),
            other => Err(Error::Configuration(
                format!("unsupported TLS protocol version {other:?}").into(),
            )),
        })
        .collect()
}

// `Required`: encrypt, but trust whatever certificate the server presents
#[derive(Debug)]
struct AcceptAnyCertificate {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        ::rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        ::rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

// `VerifyCa`: the chain must be trusted, the name on the certificate may differ
#[derive(Debug)]
struct IgnoreHostname {
    verifier: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for IgnoreHostname {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        match self.verifier.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Err(TlsError::InvalidCertificate(CertificateError::NotValidForName)) => {
                Ok(ServerCertVerified::assertion())
            }
            res => res,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        self.verifier.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        self.verifier.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.verifier.supported_verify_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_maps_protocol_versions() {
        let versions = protocol_versions(&["TLSv1.3".to_owned()]).unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, ::rustls::ProtocolVersion::TLSv1_3);

        assert!(protocol_versions(&["SSLv3".to_owned()]).is_err());
        assert!(!protocol_versions(&[]).unwrap().is_empty());
    }
}
