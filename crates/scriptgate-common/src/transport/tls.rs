//! PEM loading and rustls configuration shared by the agent and its clients.

use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};

use crate::protocol::error::{Result, ScriptgateError};

/// Installs the ring crypto provider as the process default.
///
/// Safe to call repeatedly; only the first call has an effect.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Parses every PEM certificate in `pem`, in file order.
pub fn parse_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    CertificateDer::pem_slice_iter(pem)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ScriptgateError::Certificate(format!("failed to parse certificates: {e}")))
}

/// Parses the first PEM private key in `pem` (PKCS#8, PKCS#1 or SEC1).
pub fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    PrivateKeyDer::from_pem_slice(pem)
        .map_err(|e| ScriptgateError::Certificate(format!("failed to parse private key: {e}")))
}

/// Reads a file that is part of the TLS material.
pub fn read_pem_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        ScriptgateError::Certificate(format!("unable to read {}: {e}", path.display()))
    })
}

/// Builds a trust store holding exactly the given CA certificates.
pub fn root_store(ca_certs: &[CertificateDer<'static>]) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in ca_certs {
        roots.add(cert.clone()).map_err(|e| {
            ScriptgateError::Certificate(format!("unable to parse CA certificate: {e}"))
        })?;
    }
    Ok(roots)
}

/// Client side of the mutual-TLS handshake: the CA to trust and the
/// certificate/key pair to present.
#[derive(Clone)]
pub struct ClientIdentity {
    config: Arc<ClientConfig>,
}

impl ClientIdentity {
    /// Builds a client identity from PEM bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptgateError::Certificate`] if any input fails to parse or
    /// the key does not match the certificate.
    pub fn from_pem(ca_pem: &[u8], cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        install_crypto_provider();

        let ca_certs = parse_certificates(ca_pem)?;
        if ca_certs.is_empty() {
            return Err(ScriptgateError::Certificate("no CA certificates found".into()));
        }
        let roots = root_store(&ca_certs)?;

        let chain = parse_certificates(cert_pem)?;
        if chain.is_empty() {
            return Err(ScriptgateError::Certificate("no client certificates found".into()));
        }
        let key = parse_private_key(key_pem)?;

        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_client_auth_cert(chain, key)
            .map_err(|e| ScriptgateError::Certificate(format!("client config error: {e}")))?;

        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Same as [`ClientIdentity::from_pem`], reading each input from disk.
    pub fn from_files(ca_path: &Path, cert_path: &Path, key_path: &Path) -> Result<Self> {
        Self::from_pem(
            &read_pem_file(ca_path)?,
            &read_pem_file(cert_path)?,
            &read_pem_file(key_path)?,
        )
    }

    pub fn connector(&self) -> tokio_rustls::TlsConnector {
        tokio_rustls::TlsConnector::from(self.config.clone())
    }
}
