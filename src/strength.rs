//! Security strengths and the per-family tables that map them to key sizes
// (c) 2024 Ross Younger

use std::{fmt::Display, marker::PhantomData, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::util::cli::IntOrString;
use crate::{Error, Result};

/// An abstract security strength, in bits of equivalent symmetric security.
///
/// Not every strength is available to every algorithm; see [`ecdsa_curve`] and [`rsa_modulus_bits`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "u32")]
pub enum SecurityStrength {
    /// 112 bits
    S112 = 112,
    /// 128 bits
    S128 = 128,
    /// 160 bits
    S160 = 160,
    /// 192 bits
    S192 = 192,
    /// 256 bits
    S256 = 256,
}

impl SecurityStrength {
    /// All defined strengths, weakest first
    pub const ALL: [SecurityStrength; 5] = [
        SecurityStrength::S112,
        SecurityStrength::S128,
        SecurityStrength::S160,
        SecurityStrength::S192,
        SecurityStrength::S256,
    ];

    /// Numeric value in bits
    #[must_use]
    pub fn bits(self) -> u32 {
        self as u32
    }
}

impl Display for SecurityStrength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.bits())
    }
}

impl From<SecurityStrength> for u32 {
    fn from(value: SecurityStrength) -> Self {
        value.bits()
    }
}

impl TryFrom<u32> for SecurityStrength {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.bits() == value)
            .ok_or_else(|| Error::UnknownStrength(value.to_string()))
    }
}

impl TryFrom<u64> for SecurityStrength {
    type Error = Error;

    fn try_from(value: u64) -> Result<Self> {
        u32::try_from(value)
            .map_err(|_| Error::UnknownStrength(value.to_string()))
            .and_then(Self::try_from)
    }
}

impl FromStr for SecurityStrength {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let n: u32 = s
            .trim()
            .parse()
            .map_err(|_| Error::UnknownStrength(s.into()))?;
        Self::try_from(n)
    }
}

impl<'de> Deserialize<'de> for SecurityStrength {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_any(IntOrString(PhantomData))
    }
}

/// NIST prime curves usable for ECDSA keys
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum EcdsaCurve {
    /// NIST P-224 (secp224r1)
    #[strum(serialize = "P-224")]
    P224,
    /// NIST P-256 (secp256r1)
    #[strum(serialize = "P-256")]
    P256,
    /// NIST P-384 (secp384r1)
    #[strum(serialize = "P-384")]
    P384,
}

/// Looks up the ECDSA curve for a strength.
///
/// | strength | curve |
/// |---|---|
/// | 112 | P-224 |
/// | 128 | P-256 |
/// | 192 | P-384 |
///
/// 160 and 256 have no ECDSA curve.
#[must_use]
pub fn ecdsa_curve(strength: SecurityStrength) -> Option<EcdsaCurve> {
    match strength {
        SecurityStrength::S112 => Some(EcdsaCurve::P224),
        SecurityStrength::S128 => Some(EcdsaCurve::P256),
        SecurityStrength::S192 => Some(EcdsaCurve::P384),
        SecurityStrength::S160 | SecurityStrength::S256 => None,
    }
}

/// Looks up the RSA modulus size for a strength.
///
/// Every defined strength has an RSA modulus size.
#[must_use]
pub fn rsa_modulus_bits(strength: SecurityStrength) -> Option<usize> {
    Some(match strength {
        SecurityStrength::S112 => 2048,
        SecurityStrength::S128 => 3072,
        SecurityStrength::S160 => 4096,
        SecurityStrength::S192 => 7680,
        SecurityStrength::S256 => 15360,
    })
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::{ecdsa_curve, rsa_modulus_bits, EcdsaCurve, SecurityStrength as Uut};

    #[test]
    fn ecdsa_table() {
        assert_eq!(ecdsa_curve(Uut::S112), Some(EcdsaCurve::P224));
        assert_eq!(ecdsa_curve(Uut::S128), Some(EcdsaCurve::P256));
        assert_eq!(ecdsa_curve(Uut::S160), None);
        assert_eq!(ecdsa_curve(Uut::S192), Some(EcdsaCurve::P384));
        assert_eq!(ecdsa_curve(Uut::S256), None);
    }

    #[test]
    fn rsa_table() {
        let bits: Vec<_> = Uut::ALL
            .into_iter()
            .filter_map(rsa_modulus_bits)
            .collect();
        assert_eq!(bits, vec![2048, 3072, 4096, 7680, 15360]);
    }

    #[test]
    fn parse() {
        assert_eq!(Uut::from_str("192").unwrap(), Uut::S192);
        assert_eq!(Uut::try_from(256u32).unwrap(), Uut::S256);
        let _ = Uut::from_str("100").expect_err("should have failed");
        let _ = Uut::from_str("strong").expect_err("should have failed");
    }

    #[test]
    fn curve_names() {
        assert_eq!(EcdsaCurve::P384.to_string(), "P-384");
    }

    #[test]
    fn serde_int_or_string() {
        let j = serde_json::to_string(&Uut::S160).unwrap();
        assert_eq!(j, "160");
        let s: Uut = serde_json::from_str("112").unwrap();
        assert_eq!(s, Uut::S112);
        let s: Uut = serde_json::from_str("\"256\"").unwrap();
        assert_eq!(s, Uut::S256);
        let _ = serde_json::from_str::<Uut>("111").expect_err("should have failed");
    }
}
