//! Certificate templates
// (c) 2024 Ross Younger

use std::time::{Duration, SystemTime};

use const_oid::{db::rfc5280, ObjectIdentifier};
use rand::{rngs::OsRng, RngCore as _};
use x509_cert::ext::pkix::{KeyUsage, KeyUsages};

/// Common name used by [`CertificateTemplate::default_leaf`]
pub const DEFAULT_LEAF_COMMON_NAME: &str = "Temporary PKI Certificate";
/// Common name used by [`CertificateTemplate::default_ca`]
pub const DEFAULT_CA_COMMON_NAME: &str = "Temporary PKI Certificate Authority";

/// Default validity period (one year)
pub const DEFAULT_VALIDITY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Length of a serial number in bytes; the top byte only carries two bits
const SERIAL_BYTES: usize = 17;

/// The contents of a certificate, before it is signed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateTemplate {
    /// Serial number, big-endian and unsigned
    pub serial_number: Vec<u8>,
    /// Subject common name (CN)
    pub subject_common_name: String,
    /// Start of the validity period
    pub not_before: SystemTime,
    /// End of the validity period
    pub not_after: SystemTime,
    /// Key usage bits
    pub key_usage: KeyUsage,
    /// Extended key usage purposes
    pub ext_key_usage: Vec<ObjectIdentifier>,
    /// Whether this certificate may sign others
    pub is_ca: bool,
    /// Whether to emit the basic constraints extension at all
    pub basic_constraints_valid: bool,
    /// Path length constraint, when this is a CA
    pub max_path_len: Option<u8>,
    /// DNS names for the subject alternative name extension. Empty means no extension.
    pub dns_names: Vec<String>,
}

impl CertificateTemplate {
    /// The template used for leaf certificates when the caller gives none.
    ///
    /// Valid from now for one year, for digital signature, with server and client authentication purposes.
    ///
    /// # Panics
    /// If the system random source fails.
    #[must_use]
    pub fn default_leaf() -> Self {
        let now = SystemTime::now();
        Self {
            serial_number: random_serial_number(),
            subject_common_name: DEFAULT_LEAF_COMMON_NAME.into(),
            not_before: now,
            not_after: now + DEFAULT_VALIDITY,
            key_usage: KeyUsage(KeyUsages::DigitalSignature.into()),
            ext_key_usage: vec![rfc5280::ID_KP_SERVER_AUTH, rfc5280::ID_KP_CLIENT_AUTH],
            is_ca: false,
            basic_constraints_valid: false,
            max_path_len: None,
            dns_names: Vec::new(),
        }
    }

    /// The template used for CA certificates.
    ///
    /// As [`default_leaf`](Self::default_leaf), but marked as a CA which may sign certificates.
    ///
    /// # Panics
    /// If the system random source fails.
    #[must_use]
    pub fn default_ca() -> Self {
        Self {
            subject_common_name: DEFAULT_CA_COMMON_NAME.into(),
            key_usage: KeyUsage(KeyUsages::DigitalSignature | KeyUsages::KeyCertSign),
            is_ca: true,
            basic_constraints_valid: true,
            ..Self::default_leaf()
        }
    }

    /// Builder-style setter for the subject common name
    #[must_use]
    pub fn with_common_name(mut self, name: impl Into<String>) -> Self {
        self.subject_common_name = name.into();
        self
    }

    /// Builder-style setter for the subject alternative DNS names
    #[must_use]
    pub fn with_dns_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dns_names = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Draws a uniformly random serial number in `[0, 2^130 - 1)`.
///
/// # Panics
/// If the system random source fails. There is no sensible way to continue without entropy.
#[must_use]
pub fn random_serial_number() -> Vec<u8> {
    loop {
        let mut bytes = vec![0u8; SERIAL_BYTES];
        if let Err(e) = OsRng.try_fill_bytes(&mut bytes) {
            panic!("failed to generate serial number: {e}");
        }
        bytes[0] &= 0x03;
        // 2^130 - 1 is outside the range; draw again
        if bytes[0] == 0x03 && bytes[1..].iter().all(|b| *b == 0xff) {
            continue;
        }
        return bytes;
    }
}
