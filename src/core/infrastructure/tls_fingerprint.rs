//! Trust-on-first-use certificate fingerprint capture.

use crate::core::domain::{
    contract::FingerprintFetcher,
    error::{TlsFailure, UpstreamError},
    value_object::hostname_of,
};
use async_trait::async_trait;
use rustls::{
    CertificateError, DigitallySignedStruct, OtherError, SignatureScheme,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature},
    pki_types::{CertificateDer, ServerName, UnixTime},
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Completes a TLS handshake without verifying the peer and hashes its leaf certificate.
#[derive(Debug, Clone)]
pub struct TlsFingerprintFetcher {
    timeout: Duration,
}

impl TlsFingerprintFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn handshake(&self, host: &str, port: u16) -> Result<String, UpstreamError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = client_config_with(
            provider.clone(),
            Arc::new(AcceptAnyCertificate { provider }),
        )?;

        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| UpstreamError::Tls(TlsFailure::Certificate(e.to_string())))?;
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        let tls = TlsConnector::from(Arc::new(config))
            .connect(server_name, stream)
            .await
            .map_err(|e| UpstreamError::Tls(TlsFailure::Certificate(e.to_string())))?;

        let (_, session) = tls.get_ref();
        let leaf = session
            .peer_certificates()
            .and_then(|certs| certs.first())
            .ok_or_else(|| {
                UpstreamError::Tls(TlsFailure::Certificate(
                    "peer presented no certificate".to_string(),
                ))
            })?;
        Ok(format_fingerprint(leaf))
    }
}

impl Default for TlsFingerprintFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}

#[async_trait]
impl FingerprintFetcher for TlsFingerprintFetcher {
    async fn fetch(&self, host: &str) -> Result<String, UpstreamError> {
        let (hostname, port) = target_of(host)?;
        match tokio::time::timeout(self.timeout, self.handshake(&hostname, port)).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout),
        }
    }
}

/// SHA-256 of a DER certificate as colon-separated uppercase hex.
pub fn format_fingerprint(cert: &CertificateDer<'_>) -> String {
    Sha256::digest(cert.as_ref())
        .iter()
        .map(|byte| format!("{byte:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Compares fingerprints ignoring case and separators.
pub fn fingerprints_match(expected: &str, actual: &str) -> bool {
    let canonical = |value: &str| {
        value
            .chars()
            .filter(char::is_ascii_hexdigit)
            .map(|c| c.to_ascii_uppercase())
            .collect::<String>()
    };
    let expected = canonical(expected);
    !expected.is_empty() && expected == canonical(actual)
}

fn target_of(host: &str) -> Result<(String, u16), UpstreamError> {
    let with_scheme = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };
    let url = url::Url::parse(&with_scheme)
        .map_err(|e| UpstreamError::Transport(format!("invalid host {host}: {e}")))?;
    let port = url.port_or_known_default().unwrap_or(443);
    let hostname = hostname_of(host);
    if hostname.is_empty() {
        return Err(UpstreamError::Transport(format!("invalid host {host}")));
    }
    Ok((hostname, port))
}

/// TLS settings for a client that trusts exactly one leaf certificate.
///
/// The pin replaces chain and hostname verification, which is how self-signed Proxmox
/// certificates are trusted after the first capture. Handshake signatures are still
/// checked against the pinned certificate's key.
///
/// # Errors
/// `UpstreamError::Tls` if the protocol versions cannot be configured.
pub fn pinned_client_config(expected: &str) -> Result<rustls::ClientConfig, UpstreamError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = PinnedCertificateVerifier {
        expected: expected.to_string(),
        provider: provider.clone(),
    };
    client_config_with(provider, Arc::new(verifier))
}

fn client_config_with(
    provider: Arc<CryptoProvider>,
    verifier: Arc<dyn ServerCertVerifier>,
) -> Result<rustls::ClientConfig, UpstreamError> {
    Ok(rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| UpstreamError::Tls(TlsFailure::Certificate(e.to_string())))?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth())
}

/// Accepts a peer only when its leaf hashes to the pinned fingerprint.
///
/// A mismatch is reported as [`TlsFailure::FingerprintMismatch`] wrapped in the rustls
/// error, so callers can recover both fingerprints from a failed request.
#[derive(Debug)]
pub struct PinnedCertificateVerifier {
    expected: String,
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for PinnedCertificateVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let actual = format_fingerprint(end_entity);
        if fingerprints_match(&self.expected, &actual) {
            return Ok(ServerCertVerified::assertion());
        }
        let mismatch = TlsFailure::FingerprintMismatch {
            expected: self.expected.clone(),
            actual,
        };
        Err(rustls::Error::InvalidCertificate(CertificateError::Other(
            OtherError(Arc::new(mismatch)),
        )))
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
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
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
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

/// Certificate "verifier" used only to read the certificate a host presents.
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
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
