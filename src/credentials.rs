// X509 credentials for TLS
// (c) 2024 Ross Younger

use std::path::Path;

use rustls_pki_types::{
    CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer, PrivateSec1KeyDer,
};
use tracing::trace;

use crate::certificate::CERTIFICATE_PEM_LABEL;
use crate::{Error, Result};

/// In-memory representation of X509 credentials (for TLS)
#[derive(Debug)]
pub struct Credentials {
    /// X509 certificate
    pub certificate: CertificateDer<'static>,
    /// Private key the certificate relates to
    pub keypair: PrivateKeyDer<'static>,
}

impl Credentials {
    /// Reads a PEM certificate and PEM private key, as written by [`TemporaryPki`](crate::TemporaryPki)
    pub fn load(cert_file: &Path, key_file: &Path) -> Result<Self> {
        let certificate = read_certificate(cert_file)?;
        let keypair = read_private_key(key_file)?;
        trace!(
            "loaded credentials from {} and {}",
            cert_file.display(),
            key_file.display()
        );
        Ok(Self {
            certificate,
            keypair,
        })
    }

    /// Cloning accessor
    #[must_use]
    pub fn cert_chain(&self) -> Vec<CertificateDer<'static>> {
        vec![self.certificate.clone()]
    }
}

fn read_pem(path: &Path) -> Result<(String, Vec<u8>)> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let (label, der) = der::pem::decode_vec(text.as_bytes())
        .map_err(|e| Error::Pem(format!("{}: {e}", path.display())))?;
    Ok((label.to_string(), der))
}

fn read_certificate(path: &Path) -> Result<CertificateDer<'static>> {
    let (label, der) = read_pem(path)?;
    if label != CERTIFICATE_PEM_LABEL {
        return Err(Error::Pem(format!(
            "{}: expected a certificate, found `{label}`",
            path.display()
        )));
    }
    Ok(CertificateDer::from(der))
}

/// The PEM label decides how the DER payload is to be interpreted
fn read_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let (label, der) = read_pem(path)?;
    match label.as_str() {
        "RSA PRIVATE KEY" => Ok(PrivatePkcs1KeyDer::from(der).into()),
        "EC PRIVATE KEY" => Ok(PrivateSec1KeyDer::from(der).into()),
        "OPENSSH PRIVATE KEY" | "PRIVATE KEY" => Ok(PrivatePkcs8KeyDer::from(der).into()),
        other => Err(Error::Pem(format!(
            "{}: not a supported private key (`{other}`)",
            path.display()
        ))),
    }
}
