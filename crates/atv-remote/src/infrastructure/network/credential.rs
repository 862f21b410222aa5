//! Persistent client credential for the TLS remote protocol.
//!
//! The TV remembers a remote by the public key of its client certificate, so
//! the certificate is generated once (RSA-2048, self-signed) and reused on
//! every later run.  Both PEM files are written next to each other,
//! creating the parent directory if needed.
//!
//! Running two controllers against the same credential paths at the same
//! time is not supported: nothing locks the files.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use atv_core::protocol::pairing::RsaPublicComponents;
use atv_core::RemoteError;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tracing::info;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;
use x509_parser::public_key::PublicKey;

/// Loaded certificate chain and key, ready for a `rustls` client config.
pub struct ClientIdentity {
    pub certs: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
    pub public: RsaPublicComponents,
}

impl ClientIdentity {
    /// `PrivateKeyDer` is not `Clone`; each TLS config needs its own copy.
    pub fn key(&self) -> PrivateKeyDer<'static> {
        self.key.clone_key()
    }
}

/// Certificate and key file locations.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    cert_path: PathBuf,
    key_path: PathBuf,
    common_name: String,
}

impl CredentialStore {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>, common_name: &str) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            common_name: common_name.to_string(),
        }
    }

    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    pub fn exists(&self) -> bool {
        self.cert_path.is_file() && self.key_path.is_file()
    }

    /// Generates and writes a credential unless both files already exist.
    /// Returns `true` if a new credential was written.
    ///
    /// # Errors
    ///
    /// [`RemoteError::CredentialIo`] if generation or any file write fails.
    pub fn ensure(&self) -> Result<bool, RemoteError> {
        if self.exists() {
            return Ok(false);
        }
        let (cert_pem, key_pem) = generate_pem(&self.common_name)
            .map_err(|reason| io_error(&self.cert_path, reason))?;
        write_pem(&self.key_path, &key_pem)?;
        write_pem(&self.cert_path, &cert_pem)?;
        info!("client credential written to {}", self.cert_path.display());
        Ok(true)
    }

    /// Reads the credential from disk.
    ///
    /// # Errors
    ///
    /// [`RemoteError::CredentialIo`] for missing, unreadable or malformed files.
    pub fn load(&self) -> Result<ClientIdentity, RemoteError> {
        let cert_pem = read_pem(&self.cert_path)?;
        let key_pem = read_pem(&self.key_path)?;

        let certs = rustls_pemfile::certs(&mut Cursor::new(cert_pem.as_bytes()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| io_error(&self.cert_path, e))?;
        let leaf = certs
            .first()
            .ok_or_else(|| io_error(&self.cert_path, "no certificate in file"))?;
        let public = rsa_components(leaf.as_ref()).map_err(|e| io_error(&self.cert_path, e))?;

        let key = rustls_pemfile::private_key(&mut Cursor::new(key_pem.as_bytes()))
            .map_err(|e| io_error(&self.key_path, e))?
            .ok_or_else(|| io_error(&self.key_path, "no private key in file"))?;

        Ok(ClientIdentity { certs, key, public })
    }
}

/// Extracts the RSA modulus and exponent from a DER certificate.
///
/// # Errors
///
/// Returns a description when the certificate is unparseable or not RSA.
pub fn rsa_components(der: &[u8]) -> Result<RsaPublicComponents, String> {
    let (_, cert) = X509Certificate::from_der(der).map_err(|e| e.to_string())?;
    match cert.public_key().parsed().map_err(|e| e.to_string())? {
        PublicKey::RSA(rsa) => Ok(RsaPublicComponents::new(rsa.modulus, rsa.exponent)),
        _ => Err("certificate public key is not RSA".to_string()),
    }
}

fn generate_pem(common_name: &str) -> Result<(String, String), String> {
    let private_key =
        RsaPrivateKey::new(&mut rsa::rand_core::OsRng, 2048).map_err(|e| e.to_string())?;
    let key_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| e.to_string())?;

    let key_pair = rcgen::KeyPair::from_pem_and_sign_algo(&key_pem, &rcgen::PKCS_RSA_SHA256)
        .map_err(|e| e.to_string())?;
    let mut params =
        rcgen::CertificateParams::new(vec![common_name.to_string()]).map_err(|e| e.to_string())?;
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, common_name);
    let cert = params.self_signed(&key_pair).map_err(|e| e.to_string())?;

    Ok((cert.pem(), key_pem.to_string()))
}

fn read_pem(path: &Path) -> Result<String, RemoteError> {
    std::fs::read_to_string(path).map_err(|e| io_error(path, e))
}

fn write_pem(path: &Path, content: &str) -> Result<(), RemoteError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
    }
    std::fs::write(path, content).map_err(|e| io_error(path, e))
}

fn io_error(path: &Path, reason: impl ToString) -> RemoteError {
    RemoteError::CredentialIo {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}
