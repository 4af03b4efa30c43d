//! Key algorithm families
// (c) 2024 Ross Younger

use std::str::FromStr;

use rand::rngs::OsRng;
use serde::{de, Deserialize, Serialize};
use strum::VariantNames as _;
use tracing::debug;

use crate::key::{EcdsaPrivateKey, Key, PrivateKey};
use crate::strength::{ecdsa_curve, rsa_modulus_bits, EcdsaCurve, SecurityStrength};
use crate::{Error, Result};

/// The supported public-key algorithm families
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::VariantNames,
    clap::ValueEnum,
    Serialize,
)]
#[serde(into = "String")]
pub enum Algorithm {
    /// ECDSA over a NIST prime curve chosen by strength
    #[strum(serialize = "ecdsa")]
    Ecdsa,
    /// Ed25519 (fixed strength)
    #[strum(serialize = "ed25519")]
    Ed25519,
    /// RSA with a modulus size chosen by strength
    #[strum(serialize = "rsa")]
    Rsa,
}

impl Algorithm {
    /// Every algorithm we support
    pub const ALL: [Algorithm; 3] = [Algorithm::Ecdsa, Algorithm::Ed25519, Algorithm::Rsa];

    /// The PEM type label for private keys of this family
    #[must_use]
    pub fn pem_label(self) -> &'static str {
        match self {
            Algorithm::Ecdsa => "EC PRIVATE KEY",
            // The payload is PKCS#8, but the label is kept for compatibility
            Algorithm::Ed25519 => "OPENSSH PRIVATE KEY",
            Algorithm::Rsa => "RSA PRIVATE KEY",
        }
    }

    /// Finds the algorithm whose private keys carry a given PEM label
    #[must_use]
    pub fn from_pem_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.pem_label() == label)
    }

    /// Whether this family needs a [`SecurityStrength`] to generate a key
    #[must_use]
    pub fn requires_strength(self) -> bool {
        !matches!(self, Algorithm::Ed25519)
    }

    /// The strengths this family can generate keys for.
    ///
    /// Ed25519 returns an empty list; it has exactly one key size and ignores strength.
    #[must_use]
    pub fn strengths(self) -> Vec<SecurityStrength> {
        SecurityStrength::ALL
            .into_iter()
            .filter(|s| match self {
                Algorithm::Ecdsa => ecdsa_curve(*s).is_some(),
                Algorithm::Rsa => rsa_modulus_bits(*s).is_some(),
                Algorithm::Ed25519 => false,
            })
            .collect()
    }

    /// Generates a fresh private key of this family.
    ///
    /// ECDSA and RSA require a strength; Ed25519 ignores it.
    pub fn generate_key(self, strength: Option<SecurityStrength>) -> Result<Key> {
        let private = match self {
            Algorithm::Ecdsa => {
                let strength = strength.ok_or(Error::StrengthRequired(self))?;
                let curve = ecdsa_curve(strength).ok_or(Error::StrengthUnsupported {
                    algorithm: self,
                    strength,
                })?;
                debug!("generating ECDSA key on {curve}");
                PrivateKey::Ecdsa(match curve {
                    EcdsaCurve::P224 => EcdsaPrivateKey::P224(p224::SecretKey::random(&mut OsRng)),
                    EcdsaCurve::P256 => EcdsaPrivateKey::P256(p256::SecretKey::random(&mut OsRng)),
                    EcdsaCurve::P384 => EcdsaPrivateKey::P384(p384::SecretKey::random(&mut OsRng)),
                })
            }
            Algorithm::Ed25519 => {
                debug!("generating Ed25519 key");
                let key = ed25519_dalek::SigningKey::generate(&mut OsRng);
                // Re-derive the public half from the seed and compare with the one the key carries
                let derived = ed25519_dalek::SigningKey::from_bytes(key.as_bytes()).verifying_key();
                if derived != key.verifying_key() {
                    return Err(Error::KeyConsistency);
                }
                PrivateKey::Ed25519(key)
            }
            Algorithm::Rsa => {
                let strength = strength.ok_or(Error::StrengthRequired(self))?;
                let bits = rsa_modulus_bits(strength).ok_or(Error::StrengthUnsupported {
                    algorithm: self,
                    strength,
                })?;
                debug!("generating {bits} bit RSA key");
                let key = rsa::RsaPrivateKey::new(&mut OsRng, bits)
                    .map_err(|e| Error::KeyGeneration(e.to_string()))?;
                PrivateKey::Rsa(Box::new(key))
            }
        };
        Ok(Key::new(self, private))
    }

    /// As [`generate_key`](Self::generate_key), for callers that cannot continue without a key.
    ///
    /// # Panics
    /// If key generation fails for any reason.
    #[must_use]
    pub fn must_generate_key(self, strength: Option<SecurityStrength>) -> Key {
        match self.generate_key(strength) {
            Ok(key) => key,
            Err(e) => panic!("{self} key generation failed: {e}"),
        }
    }
}

impl From<Algorithm> for String {
    fn from(value: Algorithm) -> Self {
        value.to_string()
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|a| a.to_string() == lower)
            .ok_or_else(|| Error::UnrecognizedAlgorithm(s.into()))
    }
}

impl<'de> Deserialize<'de> for Algorithm {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(|_| de::Error::unknown_variant(&s, Algorithm::VARIANTS))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::Algorithm;
    use crate::{Error, SecurityStrength};

    #[test]
    fn parse_names() {
        assert_eq!(Algorithm::from_str("ECDSA").unwrap(), Algorithm::Ecdsa);
        assert_eq!(Algorithm::from_str("ed25519").unwrap(), Algorithm::Ed25519);
        assert_eq!(Algorithm::from_str(" rsa ").unwrap(), Algorithm::Rsa);
        let e = Algorithm::from_str("dsa").unwrap_err();
        assert!(matches!(e, Error::UnrecognizedAlgorithm(s) if s == "dsa"));
    }

    #[test]
    fn labels_are_distinct() {
        assert_eq!(Algorithm::Ecdsa.pem_label(), "EC PRIVATE KEY");
        assert_eq!(Algorithm::Ed25519.pem_label(), "OPENSSH PRIVATE KEY");
        assert_eq!(Algorithm::Rsa.pem_label(), "RSA PRIVATE KEY");
        for a in Algorithm::ALL {
            assert_eq!(Algorithm::from_pem_label(a.pem_label()), Some(a));
        }
        assert_eq!(Algorithm::from_pem_label("CERTIFICATE"), None);
    }

    #[test]
    fn strength_required() {
        for a in [Algorithm::Ecdsa, Algorithm::Rsa] {
            let e = a.generate_key(None).unwrap_err();
            assert!(matches!(e, Error::StrengthRequired(alg) if alg == a));
        }
    }

    #[test]
    fn strength_unsupported() {
        for s in [SecurityStrength::S160, SecurityStrength::S256] {
            let e = Algorithm::Ecdsa.generate_key(Some(s)).unwrap_err();
            assert!(matches!(
                e,
                Error::StrengthUnsupported {
                    algorithm: Algorithm::Ecdsa,
                    strength
                } if strength == s
            ));
        }
    }

    #[test]
    fn ecdsa_strengths() {
        for s in Algorithm::Ecdsa.strengths() {
            let key = Algorithm::Ecdsa.generate_key(Some(s)).unwrap();
            assert_eq!(key.algorithm(), Algorithm::Ecdsa);
            assert_eq!(key.public(), key.public());
        }
    }

    #[test]
    fn ed25519_ignores_strength() {
        assert!(Algorithm::Ed25519.strengths().is_empty());
        let _ = Algorithm::Ed25519.generate_key(None).unwrap();
        for s in SecurityStrength::ALL {
            let key = Algorithm::Ed25519.generate_key(Some(s)).unwrap();
            assert_eq!(key.public(), key.public());
        }
    }

    #[test]
    fn rsa_small_strengths() {
        for s in [SecurityStrength::S112, SecurityStrength::S128] {
            let key = Algorithm::Rsa.generate_key(Some(s)).unwrap();
            assert_eq!(key.algorithm(), Algorithm::Rsa);
            assert_eq!(key.public(), key.public());
        }
    }

    #[test]
    #[ignore = "large RSA keys take minutes to generate"]
    fn rsa_large_strengths() {
        for s in [
            SecurityStrength::S160,
            SecurityStrength::S192,
            SecurityStrength::S256,
        ] {
            let _ = Algorithm::Rsa.generate_key(Some(s)).unwrap();
        }
    }

    #[test]
    #[should_panic(expected = "security strength is required")]
    fn must_generate_panics() {
        let _ = Algorithm::Rsa.must_generate_key(None);
    }

    #[test]
    fn serde() {
        let j = serde_json::to_string(&Algorithm::Ed25519).unwrap();
        assert_eq!(j, "\"ed25519\"");
        let a: Algorithm = serde_json::from_str("\"Rsa\"").unwrap();
        assert_eq!(a, Algorithm::Rsa);
        let _ = serde_json::from_str::<Algorithm>("\"dsa\"").expect_err("should have failed");
    }
}
