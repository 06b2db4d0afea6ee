use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use serde::Deserialize;
use tracing::warn;

use crate::transport::TransportError;

/// Server certificate verification mode for `wss://` endpoints.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TlsVerifyMode {
    /// Verify the server chain against the configured roots.
    #[default]
    Verify,
    /// Accept any server certificate.
    None,
}

/// TLS trust options for the websocket transport.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct TlsOptions {
    pub verify: TlsVerifyMode,
    /// PEM file with the roots to trust instead of the webpki bundle.
    pub ca_path: Option<PathBuf>,
}

impl TlsOptions {
    /// Options that skip certificate verification, for self-signed local servers.
    pub fn insecure() -> Self {
        Self {
            verify: TlsVerifyMode::None,
            ca_path: None,
        }
    }

    /// Options that trust only the roots in `ca_path`.
    pub fn with_ca(ca_path: impl Into<PathBuf>) -> Self {
        Self {
            verify: TlsVerifyMode::Verify,
            ca_path: Some(ca_path.into()),
        }
    }

    /// Builds the rustls client configuration for these options.
    pub fn client_config(&self) -> Result<Arc<ClientConfig>, TransportError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|err| TransportError::Tls(format!("protocol versions: {err}")))?;

        let config = match self.verify {
            TlsVerifyMode::None => {
                warn!(event = "tls_verification_disabled");
                builder
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
                    .with_no_client_auth()
            }
            TlsVerifyMode::Verify => builder
                .with_root_certificates(self.root_store()?)
                .with_no_client_auth(),
        };

        Ok(Arc::new(config))
    }

    fn root_store(&self) -> Result<RootCertStore, TransportError> {
        let mut roots = RootCertStore::empty();
        match self.ca_path.as_deref() {
            Some(path) => {
                for cert in load_certificates(path)? {
                    roots.add(cert).map_err(|err| {
                        TransportError::Tls(format!("{}: {err}", path.display()))
                    })?;
                }
            }
            None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
        }
        Ok(roots)
    }
}

fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let file = File::open(path)
        .map_err(|err| TransportError::Tls(format!("{}: {err}", path.display())))?;
    let mut reader = BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| TransportError::Tls(format!("{}: {err}", path.display())))?;

    if certs.is_empty() {
        return Err(TransportError::Tls(format!(
            "{}: no certificates found",
            path.display()
        )));
    }
    Ok(certs)
}

#[derive(Debug)]
struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{TlsOptions, TlsVerifyMode};
    use crate::transport::TransportError;

    #[test]
    fn default_options_verify_against_webpki_roots() {
        let options = TlsOptions::default();
        assert_eq!(options.verify, TlsVerifyMode::Verify);
        assert!(options.client_config().is_ok());
    }

    #[test]
    fn insecure_options_build_a_config() {
        assert!(TlsOptions::insecure().client_config().is_ok());
    }

    #[test]
    fn missing_ca_file_is_a_tls_error() {
        let options = TlsOptions::with_ca(PathBuf::from("/nonexistent/ws-session-ca.pem"));
        let err = options.client_config().expect_err("missing ca file");
        assert!(matches!(err, TransportError::Tls(_)));
    }
}
