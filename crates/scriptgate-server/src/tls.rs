//! Server-side mutual-TLS settings.
//!
//! The certificate file must hold exactly two certificates: the agent's leaf
//! followed by the CA that issued it. That CA is also the only trust anchor for
//! client certificates.

use std::path::Path;
use std::sync::Arc;

use rustls::server::WebPkiClientVerifier;
use rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use scriptgate_common::protocol::error::{Result, ScriptgateError};
use scriptgate_common::transport::tls::{
    install_crypto_provider, parse_certificates, parse_private_key, read_pem_file, root_store,
};

/// Number of certificates the agent's certificate file must contain.
pub const EXPECTED_CHAIN_LENGTH: usize = 2;

/// Immutable rustls server configuration requiring client certificates.
#[derive(Clone)]
pub struct TlsSettings {
    config: Arc<ServerConfig>,
}

impl TlsSettings {
    /// Loads the certificate chain and key from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptgateError::Certificate`] if either file cannot be read
    /// or fails validation (see [`TlsSettings::from_pem`]).
    pub fn load(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let cert_pem = read_pem_file(cert_path)?;
        let key_pem = read_pem_file(key_path)?;
        Self::from_pem(&cert_pem, &key_pem)
    }

    /// Builds settings from PEM bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptgateError::Certificate`] if the chain does not contain
    /// exactly [`EXPECTED_CHAIN_LENGTH`] certificates, the CA certificate
    /// cannot be parsed, or the key cannot be loaded for the leaf.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        install_crypto_provider();

        let chain = parse_certificates(cert_pem)?;
        if chain.len() != EXPECTED_CHAIN_LENGTH {
            return Err(ScriptgateError::Certificate(format!(
                "certificate file should contain {} certificates, server and CA certificate; \
                 found {}",
                EXPECTED_CHAIN_LENGTH,
                chain.len()
            )));
        }

        let roots = root_store(&chain[1..])?;
        for (i, cert) in chain.iter().enumerate() {
            tracing::info!("certificate[{}]: {}", i, describe_certificate(cert));
        }

        let key = parse_private_key(key_pem)?;

        let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| ScriptgateError::Certificate(format!("client verifier error: {e}")))?;

        let config = ServerConfig::builder()
            .with_client_cert_verifier(verifier)
            .with_single_cert(chain, key)
            .map_err(|e| ScriptgateError::Certificate(format!("server config error: {e}")))?;

        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn acceptor(&self) -> TlsAcceptor {
        TlsAcceptor::from(self.config.clone())
    }
}

/// `CN=.. O=.. serial=..` of a DER certificate, for startup logs.
pub fn describe_certificate(der: &[u8]) -> String {
    let cert = match x509_parser::parse_x509_certificate(der) {
        Ok((_, cert)) => cert,
        Err(e) => return format!("unparsable certificate ({e})"),
    };

    let subject = cert.subject();
    let common_name = subject
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .unwrap_or("-")
        .to_string();
    let organization = subject
        .iter_organization()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .unwrap_or("-")
        .to_string();

    format!(
        "CN={} O={} serial={}",
        common_name,
        organization,
        cert.raw_serial_as_string()
    )
}


#[cfg(test)]
mod tests {
    use super::test_utils::TestPki;
    use super::*;

    #[test]
    fn test_two_certificate_chain_is_accepted() {
        let pki = TestPki::generate();
        let settings =
            TlsSettings::from_pem(pki.chain_pem().as_bytes(), pki.leaf_key_pem.as_bytes());
        assert!(settings.is_ok());
    }

    #[test]
    fn test_single_certificate_is_rejected() {
        let pki = TestPki::generate();
        let result = TlsSettings::from_pem(pki.leaf_pem.as_bytes(), pki.leaf_key_pem.as_bytes());
        assert!(matches!(result, Err(ScriptgateError::Certificate(_))));
    }

    #[test]
    fn test_three_certificates_are_rejected() {
        let pki = TestPki::generate();
        let bundle = format!("{}{}", pki.chain_pem(), pki.ca_pem);
        let result = TlsSettings::from_pem(bundle.as_bytes(), pki.leaf_key_pem.as_bytes());
        assert!(matches!(result, Err(ScriptgateError::Certificate(_))));
    }

    #[test]
    fn test_unparsable_ca_is_rejected() {
        let pki = TestPki::generate();
        let bundle = format!(
            "{}-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n",
            pki.leaf_pem
        );
        let result = TlsSettings::from_pem(bundle.as_bytes(), pki.leaf_key_pem.as_bytes());
        assert!(matches!(result, Err(ScriptgateError::Certificate(_))));
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let pki = TestPki::generate();
        let result = TlsSettings::from_pem(pki.chain_pem().as_bytes(), b"");
        assert!(matches!(result, Err(ScriptgateError::Certificate(_))));
    }

    #[test]
    fn test_describe_certificate_names_subject() {
        let pki = TestPki::generate();
        let chain = parse_certificates(pki.chain_pem().as_bytes()).unwrap();

        let leaf = describe_certificate(&chain[0]);
        assert!(leaf.starts_with("CN=localhost O=- serial="), "{}", leaf);

        let ca = describe_certificate(&chain[1]);
        assert!(ca.starts_with("CN=scriptgate test CA O=scriptgate serial="), "{}", ca);
    }

    #[test]
    fn test_describe_certificate_tolerates_garbage() {
        assert!(describe_certificate(b"not a certificate").starts_with("unparsable certificate"));
    }

    #[test]
    fn test_missing_files_are_certificate_errors() {
        let result = TlsSettings::load(
            Path::new("/nonexistent/agent.crt"),
            Path::new("/nonexistent/agent.key"),
        );
        assert!(matches!(result, Err(ScriptgateError::Certificate(_))));
    }
}
