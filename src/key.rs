//! Private keys and their encodings
// (c) 2024 Ross Younger

use std::io::Write;
use std::sync::Arc;

use const_oid::db::{rfc5912, rfc8410};
use const_oid::ObjectIdentifier;
use der::{asn1::AnyRef, pem::LineEnding, Decode as _, Encode as _};
use ed25519_dalek::pkcs8::{DecodePrivateKey as _, EncodePrivateKey as _};
use rsa::pkcs1::{DecodeRsaPrivateKey as _, EncodeRsaPrivateKey as _};
use sha2::{Digest as _, Sha256, Sha384};
use signature::{
    hazmat::{PrehashSigner as _, PrehashVerifier as _},
    Keypair, SignatureEncoding as _, Signer, Verifier as _,
};
use spki::{
    AlgorithmIdentifierOwned, DynSignatureAlgorithmIdentifier, EncodePublicKey,
    SignatureBitStringEncoding,
};
use tracing::trace;
use zeroize::Zeroizing;

use crate::certificate::Certificate;
use crate::strength::EcdsaCurve;
use crate::template::CertificateTemplate;
use crate::{Algorithm, Error, Result};

/// An ECDSA private key on one of the supported curves
#[derive(Clone, Debug)]
pub enum EcdsaPrivateKey {
    /// NIST P-224
    P224(p224::SecretKey),
    /// NIST P-256
    P256(p256::SecretKey),
    /// NIST P-384
    P384(p384::SecretKey),
}

/// The private half of a key pair, one variant per algorithm family
#[derive(Clone, Debug)]
pub enum PrivateKey {
    /// ECDSA
    Ecdsa(EcdsaPrivateKey),
    /// Ed25519
    Ed25519(ed25519_dalek::SigningKey),
    /// RSA
    Rsa(Box<rsa::RsaPrivateKey>),
}

impl PrivateKey {
    /// The family this handle belongs to
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        match self {
            PrivateKey::Ecdsa(_) => Algorithm::Ecdsa,
            PrivateKey::Ed25519(_) => Algorithm::Ed25519,
            PrivateKey::Rsa(_) => Algorithm::Rsa,
        }
    }
}

/// The public half of a key pair
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublicKey {
    /// ECDSA on P-224
    P224(p224::PublicKey),
    /// ECDSA on P-256
    P256(p256::PublicKey),
    /// ECDSA on P-384
    P384(p384::PublicKey),
    /// Ed25519
    Ed25519(ed25519_dalek::VerifyingKey),
    /// RSA
    Rsa(rsa::RsaPublicKey),
}

impl PublicKey {
    /// The family this key belongs to
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        match self {
            PublicKey::P224(_) | PublicKey::P256(_) | PublicKey::P384(_) => Algorithm::Ecdsa,
            PublicKey::Ed25519(_) => Algorithm::Ed25519,
            PublicKey::Rsa(_) => Algorithm::Rsa,
        }
    }

    /// Checks a signature made by [`Key::sign`] over `message`
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        let fail = |e: signature::Error| Error::Verification(e.to_string());
        match self {
            PublicKey::P224(pk) => {
                let sig = p224::ecdsa::Signature::from_der(signature).map_err(fail)?;
                p224::ecdsa::VerifyingKey::from(pk)
                    .verify_prehash(&Sha256::digest(message), &sig)
                    .map_err(fail)
            }
            PublicKey::P256(pk) => {
                let sig = p256::ecdsa::Signature::from_der(signature).map_err(fail)?;
                p256::ecdsa::VerifyingKey::from(pk)
                    .verify_prehash(&Sha256::digest(message), &sig)
                    .map_err(fail)
            }
            PublicKey::P384(pk) => {
                let sig = p384::ecdsa::Signature::from_der(signature).map_err(fail)?;
                p384::ecdsa::VerifyingKey::from(pk)
                    .verify_prehash(&Sha384::digest(message), &sig)
                    .map_err(fail)
            }
            PublicKey::Ed25519(pk) => {
                let sig = ed25519_dalek::Signature::from_slice(signature).map_err(fail)?;
                pk.verify(message, &sig).map_err(fail)
            }
            PublicKey::Rsa(pk) => {
                let sig = rsa::pkcs1v15::Signature::try_from(signature).map_err(fail)?;
                rsa::pkcs1v15::VerifyingKey::<Sha256>::new(pk.clone())
                    .verify(message, &sig)
                    .map_err(fail)
            }
        }
    }
}

impl EncodePublicKey for PublicKey {
    /// Encodes as a `SubjectPublicKeyInfo` structure
    fn to_public_key_der(&self) -> spki::Result<spki::Document> {
        match self {
            PublicKey::P224(pk) => pk.to_public_key_der(),
            PublicKey::P256(pk) => pk.to_public_key_der(),
            PublicKey::P384(pk) => pk.to_public_key_der(),
            PublicKey::Ed25519(pk) => pk.to_public_key_der(),
            PublicKey::Rsa(pk) => pk.to_public_key_der(),
        }
    }
}

/// A private key together with the algorithm family it was generated under.
///
/// Keys are created by [`Algorithm::generate_key`] (or parsed back with [`Key::from_pem`])
/// and are immutable afterwards.
#[derive(Debug)]
pub struct Key {
    algorithm: Algorithm,
    private: PrivateKey,
}

impl Key {
    pub(crate) fn new(algorithm: Algorithm, private: PrivateKey) -> Self {
        let key = Self { algorithm, private };
        key.check_consistency();
        key
    }

    /// The handle and the tag are set together by our constructors, so a mismatch is a defect.
    fn check_consistency(&self) {
        assert_eq!(
            self.algorithm,
            self.private.algorithm(),
            "key handle does not match its algorithm tag"
        );
    }

    /// Algorithm family
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The private key handle
    #[must_use]
    pub fn private(&self) -> &PrivateKey {
        &self.private
    }

    /// The ECDSA curve in use, if this is an ECDSA key
    #[must_use]
    pub fn curve(&self) -> Option<EcdsaCurve> {
        match &self.private {
            PrivateKey::Ecdsa(EcdsaPrivateKey::P224(_)) => Some(EcdsaCurve::P224),
            PrivateKey::Ecdsa(EcdsaPrivateKey::P256(_)) => Some(EcdsaCurve::P256),
            PrivateKey::Ecdsa(EcdsaPrivateKey::P384(_)) => Some(EcdsaCurve::P384),
            _ => None,
        }
    }

    /// Derives the public key
    #[must_use]
    pub fn public(&self) -> PublicKey {
        match (self.algorithm, &self.private) {
            (Algorithm::Ecdsa, PrivateKey::Ecdsa(k)) => match k {
                EcdsaPrivateKey::P224(k) => PublicKey::P224(k.public_key()),
                EcdsaPrivateKey::P256(k) => PublicKey::P256(k.public_key()),
                EcdsaPrivateKey::P384(k) => PublicKey::P384(k.public_key()),
            },
            (Algorithm::Ed25519, PrivateKey::Ed25519(k)) => PublicKey::Ed25519(k.verifying_key()),
            (Algorithm::Rsa, PrivateKey::Rsa(k)) => PublicKey::Rsa(k.to_public_key()),
            _ => self.mismatch(),
        }
    }

    /// Encodes the public key as a DER `SubjectPublicKeyInfo`
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        Ok(self
            .public()
            .to_public_key_der()
            .map_err(Error::encoding)?
            .into_vec())
    }

    /// Encodes the private key in the family's binary format:
    /// SEC1 `ECPrivateKey` for ECDSA, PKCS#8 for Ed25519, PKCS#1 for RSA.
    pub fn marshal_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        let der = match (self.algorithm, &self.private) {
            (Algorithm::Ecdsa, PrivateKey::Ecdsa(k)) => {
                let (sec1, curve) = match k {
                    EcdsaPrivateKey::P224(k) => (k.to_sec1_der(), rfc5912::SECP_224_R_1),
                    EcdsaPrivateKey::P256(k) => (k.to_sec1_der(), rfc5912::SECP_256_R_1),
                    EcdsaPrivateKey::P384(k) => (k.to_sec1_der(), rfc5912::SECP_384_R_1),
                };
                with_named_curve(&sec1.map_err(Error::encoding)?, curve)?
            }
            (Algorithm::Ed25519, PrivateKey::Ed25519(k)) => Zeroizing::new(
                k.to_pkcs8_der()
                    .map_err(Error::encoding)?
                    .as_bytes()
                    .to_vec(),
            ),
            (Algorithm::Rsa, PrivateKey::Rsa(k)) => Zeroizing::new(
                k.to_pkcs1_der()
                    .map_err(Error::encoding)?
                    .as_bytes()
                    .to_vec(),
            ),
            _ => self.mismatch(),
        };
        Ok(der)
    }

    /// Encodes the private key as PEM, under the algorithm's label
    pub fn marshal_pem(&self) -> Result<Zeroizing<String>> {
        let der = self.marshal_der()?;
        let pem = der::pem::encode_string(self.algorithm.pem_label(), LineEnding::LF, &der)
            .map_err(Error::encoding)?;
        Ok(Zeroizing::new(pem))
    }

    /// Writes the PEM encoding to `sink`.
    ///
    /// The sink is consumed, so it is closed on return whether or not encoding succeeded.
    pub fn encode_pem<W: Write>(&self, mut sink: W) -> Result<()> {
        let pem = self.marshal_pem()?;
        sink.write_all(pem.as_bytes()).map_err(Error::Write)?;
        sink.flush().map_err(Error::Write)
    }

    /// Parses a PEM private key as written by [`marshal_pem`](Self::marshal_pem).
    ///
    /// The PEM label selects the algorithm family; for ECDSA the curve comes from the key's parameters.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let (label, der) =
            der::pem::decode_vec(pem.as_bytes()).map_err(|e| Error::Pem(e.to_string()))?;
        let algorithm = Algorithm::from_pem_label(label)
            .ok_or_else(|| Error::Pem(format!("unexpected label `{label}`")))?;
        Self::from_der(algorithm, &Zeroizing::new(der))
    }

    /// Parses a DER private key in the family's binary format (see [`marshal_der`](Self::marshal_der))
    pub fn from_der(algorithm: Algorithm, der: &[u8]) -> Result<Self> {
        let private = match algorithm {
            Algorithm::Ecdsa => {
                let parsed = sec1::EcPrivateKey::from_der(der).map_err(Error::encoding)?;
                let curve = parsed
                    .parameters
                    .and_then(|p| p.named_curve())
                    .ok_or_else(|| Error::Pem("EC private key does not name its curve".into()))?;
                let key = if curve == rfc5912::SECP_224_R_1 {
                    EcdsaPrivateKey::P224(
                        p224::SecretKey::from_sec1_der(der).map_err(Error::encoding)?,
                    )
                } else if curve == rfc5912::SECP_256_R_1 {
                    EcdsaPrivateKey::P256(
                        p256::SecretKey::from_sec1_der(der).map_err(Error::encoding)?,
                    )
                } else if curve == rfc5912::SECP_384_R_1 {
                    EcdsaPrivateKey::P384(
                        p384::SecretKey::from_sec1_der(der).map_err(Error::encoding)?,
                    )
                } else {
                    return Err(Error::Pem(format!("unsupported curve {curve}")));
                };
                PrivateKey::Ecdsa(key)
            }
            Algorithm::Ed25519 => PrivateKey::Ed25519(
                ed25519_dalek::SigningKey::from_pkcs8_der(der).map_err(Error::encoding)?,
            ),
            Algorithm::Rsa => PrivateKey::Rsa(Box::new(
                rsa::RsaPrivateKey::from_pkcs1_der(der).map_err(Error::encoding)?,
            )),
        };
        Ok(Self::new(algorithm, private))
    }

    /// Signs `message`, using SHA-256 (SHA-384 for P-384) where the algorithm needs a digest.
    ///
    /// ECDSA signatures are DER encoded; RSA uses PKCS#1 v1.5.
    pub fn sign(&self, message: &[u8]) -> std::result::Result<Vec<u8>, signature::Error> {
        match (self.algorithm, &self.private) {
            (Algorithm::Ecdsa, PrivateKey::Ecdsa(k)) => match k {
                EcdsaPrivateKey::P224(k) => {
                    let sig: p224::ecdsa::Signature = p224::ecdsa::SigningKey::from(k)
                        .sign_prehash(&Sha256::digest(message))?;
                    Ok(sig.to_der().as_bytes().to_vec())
                }
                EcdsaPrivateKey::P256(k) => {
                    let sig: p256::ecdsa::Signature = p256::ecdsa::SigningKey::from(k)
                        .sign_prehash(&Sha256::digest(message))?;
                    Ok(sig.to_der().as_bytes().to_vec())
                }
                EcdsaPrivateKey::P384(k) => {
                    let sig: p384::ecdsa::Signature = p384::ecdsa::SigningKey::from(k)
                        .sign_prehash(&Sha384::digest(message))?;
                    Ok(sig.to_der().as_bytes().to_vec())
                }
            },
            (Algorithm::Ed25519, PrivateKey::Ed25519(k)) => {
                let sig: ed25519_dalek::Signature = k.try_sign(message)?;
                Ok(sig.to_bytes().to_vec())
            }
            (Algorithm::Rsa, PrivateKey::Rsa(k)) => {
                let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(k.as_ref().clone());
                let sig: rsa::pkcs1v15::Signature = signer.try_sign(message)?;
                Ok(sig.to_vec())
            }
            _ => self.mismatch(),
        }
    }

    /// The X.509 signature algorithm that [`sign`](Self::sign) produces
    #[must_use]
    pub fn signature_algorithm(&self) -> AlgorithmIdentifierOwned {
        let (oid, parameters) = match (self.algorithm, &self.private) {
            (Algorithm::Ecdsa, PrivateKey::Ecdsa(EcdsaPrivateKey::P384(_))) => {
                (rfc5912::ECDSA_WITH_SHA_384, None)
            }
            (Algorithm::Ecdsa, PrivateKey::Ecdsa(_)) => (rfc5912::ECDSA_WITH_SHA_256, None),
            (Algorithm::Ed25519, PrivateKey::Ed25519(_)) => (rfc8410::ID_ED_25519, None),
            // RFC 4055 requires explicit NULL parameters for the PKCS#1 v1.5 algorithms
            (Algorithm::Rsa, PrivateKey::Rsa(_)) => (
                rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
                Some(AnyRef::NULL.into()),
            ),
            _ => self.mismatch(),
        };
        AlgorithmIdentifierOwned { oid, parameters }
    }

    /// Creates a self-signed certificate for this key.
    ///
    /// If no template is given, [`CertificateTemplate::default_leaf`] is used.
    /// Nothing is signed until the certificate is first marshalled.
    #[must_use]
    pub fn certificate(self: &Arc<Self>, template: Option<CertificateTemplate>) -> Certificate {
        Certificate::self_signed(
            Arc::clone(self),
            template.unwrap_or_else(CertificateTemplate::default_leaf),
        )
    }

    /// Creates a certificate for this key, to be signed by `issuer_key`.
    ///
    /// The certificate's issuer name is taken from `issuer_template`'s subject.
    /// If no template is given, [`CertificateTemplate::default_leaf`] is used.
    #[must_use]
    pub fn ca_signed_certificate(
        self: &Arc<Self>,
        template: Option<CertificateTemplate>,
        issuer_template: CertificateTemplate,
        issuer_key: Arc<Key>,
    ) -> Certificate {
        Certificate::ca_signed(
            Arc::clone(self),
            template.unwrap_or_else(CertificateTemplate::default_leaf),
            issuer_template,
            issuer_key,
        )
    }

    pub(crate) fn signer(&self) -> KeySigner<'_> {
        KeySigner(self)
    }

    #[cold]
    fn mismatch(&self) -> ! {
        panic!(
            "internal error: {} key holds a {} handle",
            self.algorithm,
            self.private.algorithm()
        )
    }
}

/// Rewrites a SEC1 `ECPrivateKey` so its parameters name the curve.
///
/// OpenSSL (and our own [`Key::from_der`]) cannot load an EC key that does not say which curve it is on.
fn with_named_curve(der: &[u8], curve: ObjectIdentifier) -> Result<Zeroizing<Vec<u8>>> {
    let mut key = sec1::EcPrivateKey::from_der(der).map_err(Error::encoding)?;
    key.parameters = Some(sec1::EcParameters::NamedCurve(curve));
    Ok(Zeroizing::new(key.to_der().map_err(Error::encoding)?))
}

/// Adapter presenting a [`Key`] to the X.509 certificate builder
#[derive(Debug, Clone, Copy)]
pub(crate) struct KeySigner<'a>(&'a Key);

/// Raw signature bytes, as they appear in the certificate's signature field
#[derive(Debug, Clone)]
pub(crate) struct SignatureBytes(Vec<u8>);

impl SignatureBitStringEncoding for SignatureBytes {
    fn to_bitstring(&self) -> der::Result<der::asn1::BitString> {
        der::asn1::BitString::from_bytes(&self.0)
    }
}

impl Keypair for KeySigner<'_> {
    type VerifyingKey = PublicKey;

    fn verifying_key(&self) -> PublicKey {
        self.0.public()
    }
}

impl DynSignatureAlgorithmIdentifier for KeySigner<'_> {
    fn signature_algorithm_identifier(&self) -> spki::Result<AlgorithmIdentifierOwned> {
        Ok(self.0.signature_algorithm())
    }
}

impl Signer<SignatureBytes> for KeySigner<'_> {
    fn try_sign(&self, msg: &[u8]) -> std::result::Result<SignatureBytes, signature::Error> {
        trace!("signing {} bytes with {} key", msg.len(), self.0.algorithm);
        self.0.sign(msg).map(SignatureBytes)
    }
}
