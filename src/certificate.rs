//! Lazily-signed X.509 certificates
// (c) 2024 Ross Younger

use std::io::Write;
use std::sync::Arc;
use std::time::SystemTime;

use const_oid::db::rfc4519;
use der::{
    asn1::{GeneralizedTime, Ia5String, SetOfVec, UtcTime, Utf8StringRef},
    pem::LineEnding,
    Any, DateTime, Decode as _, Encode as _,
};
use spki::SubjectPublicKeyInfoOwned;
use tracing::{debug, trace};
use x509_cert::{
    attr::AttributeTypeAndValue,
    builder::{Builder as _, CertificateBuilder, Profile},
    ext::pkix::{
        name::GeneralName, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAltName,
    },
    name::{Name, RdnSequence, RelativeDistinguishedName},
    serial_number::SerialNumber,
    time::{Time, Validity},
};

use crate::key::{Key, PrivateKey, PublicKey, SignatureBytes};
use crate::template::CertificateTemplate;
use crate::{Error, Result};

/// PEM label for certificates of every algorithm
pub const CERTIFICATE_PEM_LABEL: &str = "CERTIFICATE";

/// How a certificate is to be created, when it is first needed
#[derive(Clone, Debug)]
enum Creation {
    /// Issuer is subject; signed by the owning key
    SelfSigned { template: CertificateTemplate },
    /// Issuer is the CA's subject; signed by the CA's key
    CaSigned {
        template: CertificateTemplate,
        issuer_template: CertificateTemplate,
        issuer_key: Arc<Key>,
    },
}

/// An X.509 certificate for a [`Key`].
///
/// The certificate is not signed until first marshalled; after that the DER bytes are
/// cached, so repeated calls return the same certificate.
#[derive(Debug)]
pub struct Certificate {
    key: Arc<Key>,
    creation: Creation,
    der: Option<Vec<u8>>,
}

impl Certificate {
    pub(crate) fn self_signed(key: Arc<Key>, template: CertificateTemplate) -> Self {
        Self {
            key,
            creation: Creation::SelfSigned { template },
            der: None,
        }
    }

    pub(crate) fn ca_signed(
        key: Arc<Key>,
        template: CertificateTemplate,
        issuer_template: CertificateTemplate,
        issuer_key: Arc<Key>,
    ) -> Self {
        Self {
            key,
            creation: Creation::CaSigned {
                template,
                issuer_template,
                issuer_key,
            },
            der: None,
        }
    }

    /// The key this certificate certifies
    #[must_use]
    pub fn key(&self) -> &Arc<Key> {
        &self.key
    }

    /// The certified public key
    #[must_use]
    pub fn public(&self) -> PublicKey {
        self.key.public()
    }

    /// The private key corresponding to the certificate
    #[must_use]
    pub fn private(&self) -> &PrivateKey {
        self.key.private()
    }

    /// The template this certificate is (or will be) built from
    #[must_use]
    pub fn template(&self) -> &CertificateTemplate {
        match &self.creation {
            Creation::SelfSigned { template } | Creation::CaSigned { template, .. } => template,
        }
    }

    /// Whether this certificate is signed by a separate issuer
    #[must_use]
    pub fn is_ca_signed(&self) -> bool {
        matches!(self.creation, Creation::CaSigned { .. })
    }

    /// Returns the DER encoding of the certificate, creating and signing it on first call.
    ///
    /// If creation fails nothing is cached, so a later call tries again.
    pub fn marshal_der(&mut self) -> Result<&[u8]> {
        let der = if let Some(der) = self.der.take() {
            trace!("using cached certificate");
            der
        } else {
            let der = self.create()?;
            debug!(
                "created {} certificate ({} bytes)",
                if self.is_ca_signed() { "CA-signed" } else { "self-signed" },
                der.len()
            );
            der
        };
        Ok(self.der.insert(der).as_slice())
    }

    /// Returns the PEM encoding of the certificate
    pub fn marshal_pem(&mut self) -> Result<String> {
        let der = self.marshal_der()?;
        der::pem::encode_string(CERTIFICATE_PEM_LABEL, LineEnding::LF, der).map_err(Error::encoding)
    }

    /// Writes the PEM encoding to `sink`, which is closed on return.
    pub fn encode_pem<W: Write>(&mut self, mut sink: W) -> Result<()> {
        let pem = self.marshal_pem()?;
        sink.write_all(pem.as_bytes()).map_err(Error::Write)?;
        sink.flush().map_err(Error::Write)
    }

    /// Decodes the certificate structure for inspection
    pub fn parsed(&mut self) -> Result<x509_cert::Certificate> {
        x509_cert::Certificate::from_der(self.marshal_der()?).map_err(Error::encoding)
    }

    /// Checks that this certificate was signed by the holder of `issuer`'s private key
    pub fn verify_signed_by(&mut self, issuer: &PublicKey) -> Result<()> {
        let cert = self.parsed()?;
        let tbs = cert.tbs_certificate.to_der().map_err(Error::encoding)?;
        issuer.verify(&tbs, cert.signature.raw_bytes())
    }

    /// Subject common name, as it appears in the signed certificate
    pub fn subject_common_name(&mut self) -> Result<Option<String>> {
        Ok(common_name(&self.parsed()?.tbs_certificate.subject))
    }

    /// Issuer common name, as it appears in the signed certificate
    pub fn issuer_common_name(&mut self) -> Result<Option<String>> {
        Ok(common_name(&self.parsed()?.tbs_certificate.issuer))
    }

    /// Key usage bits, as they appear in the signed certificate
    pub fn key_usage(&mut self) -> Result<Option<KeyUsage>> {
        let cert = self.parsed()?;
        let Some(extensions) = cert.tbs_certificate.extensions else {
            return Ok(None);
        };
        extensions
            .iter()
            .find(|e| e.extn_id == const_oid::db::rfc5280::ID_CE_KEY_USAGE)
            .map(|e| KeyUsage::from_der(e.extn_value.as_bytes()).map_err(Error::encoding))
            .transpose()
    }

    fn create(&self) -> Result<Vec<u8>> {
        match &self.creation {
            Creation::SelfSigned { template } => build(&self.key, template, None, &self.key),
            Creation::CaSigned {
                template,
                issuer_template,
                issuer_key,
            } => build(&self.key, template, Some(issuer_template), issuer_key),
        }
    }
}

/// Builds and signs a certificate for `subject_key`.
///
/// With no issuer template the certificate is self-signed, so `signing_key` must be `subject_key`.
fn build(
    subject_key: &Key,
    template: &CertificateTemplate,
    issuer_template: Option<&CertificateTemplate>,
    signing_key: &Key,
) -> Result<Vec<u8>> {
    let subject = name_from_common_name(&template.subject_common_name)?;
    let issuer = issuer_template
        .map(|t| name_from_common_name(&t.subject_common_name))
        .transpose()?;
    let serial = SerialNumber::new(&template.serial_number).map_err(Error::certificate)?;
    let validity = Validity {
        not_before: x509_time(template.not_before)?,
        not_after: x509_time(template.not_after)?,
    };
    let spki = SubjectPublicKeyInfoOwned::from_der(&subject_key.public_key_der()?)
        .map_err(Error::encoding)?;

    let signer = signing_key.signer();
    let mut builder = CertificateBuilder::new(
        Profile::Manual { issuer },
        serial,
        validity,
        subject,
        spki,
        &signer,
    )
    .map_err(Error::certificate)?;

    if template.basic_constraints_valid {
        builder
            .add_extension(&BasicConstraints {
                ca: template.is_ca,
                path_len_constraint: template.max_path_len,
            })
            .map_err(Error::certificate)?;
    }
    builder
        .add_extension(&template.key_usage)
        .map_err(Error::certificate)?;
    if !template.ext_key_usage.is_empty() {
        builder
            .add_extension(&ExtendedKeyUsage(template.ext_key_usage.clone()))
            .map_err(Error::certificate)?;
    }
    if !template.dns_names.is_empty() {
        let names = template
            .dns_names
            .iter()
            .map(|n| Ia5String::new(n).map(GeneralName::DnsName))
            .collect::<der::Result<Vec<_>>>()
            .map_err(Error::certificate)?;
        builder
            .add_extension(&SubjectAltName(names))
            .map_err(Error::certificate)?;
    }

    let cert = builder
        .build::<SignatureBytes>()
        .map_err(Error::certificate)?;
    cert.to_der().map_err(Error::encoding)
}

fn name_from_common_name(cn: &str) -> Result<Name> {
    let value = Any::encode_from(&Utf8StringRef::new(cn).map_err(Error::encoding)?)
        .map_err(Error::encoding)?;
    let atv = AttributeTypeAndValue {
        oid: rfc4519::CN,
        value,
    };
    let rdn = SetOfVec::try_from(vec![atv]).map_err(Error::encoding)?;
    Ok(RdnSequence(vec![RelativeDistinguishedName(rdn)]))
}

fn common_name(name: &Name) -> Option<String> {
    name.0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .find(|atv| atv.oid == rfc4519::CN)
        .and_then(|atv| std::str::from_utf8(atv.value.value()).ok())
        .map(str::to_owned)
}

/// UTCTime up to 2049, GeneralizedTime thereafter (RFC 5280 4.1.2.5)
fn x509_time(t: SystemTime) -> Result<Time> {
    let dt = DateTime::from_system_time(t).map_err(Error::encoding)?;
    if dt.year() < 2050 {
        Ok(Time::UtcTime(
            UtcTime::from_date_time(dt).map_err(Error::encoding)?,
        ))
    } else {
        Ok(Time::GeneralTime(GeneralizedTime::from_date_time(dt)))
    }
}
