//! Configuration structure
// (c) 2024 Ross Younger

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use struct_field_names_as_array::FieldNamesAsSlice;

use crate::{
    pki::{
        ArtifactPath, DEFAULT_CA_CERT_PATH, DEFAULT_CA_KEY_PATH, DEFAULT_CERT_PATH,
        DEFAULT_KEY_PATH, TEMP_CA_CERT_PATTERN, TEMP_CA_KEY_PATTERN, TEMP_CERT_PATTERN,
        TEMP_KEY_PATTERN,
    },
    template::{CertificateTemplate, DEFAULT_LEAF_COMMON_NAME},
    util::derive_deftly_template_Optionalify,
    Algorithm, SecurityStrength, TemporaryPki,
};

use derive_deftly::Deftly;

/// The set of configurable options supported by tmppki.
///
/// **Note:** The implementation of `default()` for this struct returns tmppki's hard-wired configuration defaults.
///
/// This structure uses the [Optionalify](derive_deftly_template_Optionalify) deftly macro to automatically
/// define the `Configuration_Optional` struct, which is the same but has all members of type `Option<whatever>`.
/// This is the magic that lets us use the same underlying struct for CLI and saved configuration files:
/// the CLI uses the `_Optional` version , with everything defaulting to `None`.
/// The result is that wherever the user does not provide a value, values read from lower priority sources
/// (configuration files and system defaults) obtain.
///
// Maintainer note: None of the members of this struct should be Option<anything>. That leads to sunspots in the CLI and strange warts (Some(Some(foo))).
// Boolean members take an optional value on the command line (`--ca`, `--ca=false`) so that leaving them out means "not specified".
#[derive(Deftly)]
#[derive_deftly(Optionalify)]
#[deftly(visibility = "pub(crate)")]
#[derive(Debug, Clone, PartialEq, Eq, Parser, Deserialize, Serialize, FieldNamesAsSlice)]
#[allow(clippy::struct_excessive_bools)]
pub struct Configuration {
    // KEYS ============================================================================================
    /// The key algorithm for the leaf certificate [default: rsa]
    #[arg(short, long, value_name("alg"), help_heading("Keys"))]
    #[clap(value_enum)]
    pub algorithm: Algorithm,

    /// Security strength in bits: 112, 128, 160, 192 or 256 [default: 128]
    ///
    /// RSA supports every strength; ECDSA supports 112, 128 and 192.
    /// Ed25519 ignores this setting.
    #[arg(short, long, value_name("bits"), help_heading("Keys"))]
    pub strength: SecurityStrength,

    /// Signs the leaf certificate with a freshly generated CA, instead of self-signing it
    #[arg(long, help_heading("Keys"), action = clap::ArgAction::Set, num_args(0..=1), default_missing_value("true"), value_name("bool"))]
    pub ca: bool,

    // CERTIFICATE =====================================================================================
    /// Subject common name of the leaf certificate
    #[arg(long, value_name("name"), help_heading("Certificate"))]
    pub common_name: String,

    /// DNS names to add to the leaf certificate [default: none]
    ///
    /// **On the command line** repeat `--dns-name` for each.
    /// **In a configuration file** this field is an array of strings.
    #[arg(long = "dns-name", value_name("name"), help_heading("Certificate"))]
    pub dns_names: Vec<String>,

    // FILES ===========================================================================================
    /// Writes uniquely-named temporary files instead of using the fixed paths
    #[arg(short, long, help_heading("Files"), action = clap::ArgAction::Set, num_args(0..=1), default_missing_value("true"), value_name("bool"))]
    pub temporary: bool,

    /// Directory for temporary files. Empty means the system temporary directory.
    #[arg(long, value_name("dir"), help_heading("Files"))]
    pub temp_dir: String,

    /// Path to write the leaf private key to (ignored with `--temporary`)
    #[arg(long, value_name("file"), help_heading("Files"))]
    pub key_path: String,

    /// Path to write the leaf certificate to (ignored with `--temporary`)
    #[arg(long, value_name("file"), help_heading("Files"))]
    pub cert_path: String,

    /// Path to write the CA private key to (ignored with `--temporary`)
    #[arg(long, value_name("file"), help_heading("Files"))]
    pub ca_key_path: String,

    /// Path to write the CA certificate to (ignored with `--temporary`)
    #[arg(long, value_name("file"), help_heading("Files"))]
    pub ca_cert_path: String,

    /// Writes the CA private key to disk as well as the CA certificate
    #[arg(long, help_heading("Files"), action = clap::ArgAction::Set, num_args(0..=1), default_missing_value("true"), value_name("bool"))]
    pub write_ca_key: bool,
}

impl Configuration {
    /// The temporary directory, if one was configured
    #[must_use]
    pub fn temp_dir(&self) -> Option<&Path> {
        if self.temp_dir.is_empty() {
            None
        } else {
            Some(Path::new(&self.temp_dir))
        }
    }

    /// The strength to pass to key generation; Ed25519 does not take one
    #[must_use]
    pub fn effective_strength(&self) -> Option<SecurityStrength> {
        self.algorithm.requires_strength().then_some(self.strength)
    }

    /// The leaf certificate template this configuration describes
    #[must_use]
    pub fn template(&self) -> CertificateTemplate {
        CertificateTemplate::default_leaf()
            .with_common_name(self.common_name.clone())
            .with_dns_names(self.dns_names.iter().cloned())
    }

    fn artifact(&self, fixed: &str, pattern: &str) -> ArtifactPath {
        if self.temporary {
            ArtifactPath::Temporary {
                dir: self.temp_dir().map(PathBuf::from),
                pattern: pattern.into(),
            }
        } else {
            ArtifactPath::Fixed(fixed.into())
        }
    }

    /// Generates the keys for a [`TemporaryPki`] as configured.
    ///
    /// Nothing is written to disk yet.
    pub fn build_pki(&self) -> crate::Result<TemporaryPki> {
        let strength = self.effective_strength();
        let template = Some(self.template());
        let mut pki = if self.ca {
            TemporaryPki::with_ca(self.algorithm, strength, template)?
        } else {
            TemporaryPki::new(self.algorithm, strength, template)?
        };
        pki.set_key_path(self.artifact(&self.key_path, TEMP_KEY_PATTERN));
        pki.set_cert_path(self.artifact(&self.cert_path, TEMP_CERT_PATTERN));
        pki.set_ca_key_path(self.artifact(&self.ca_key_path, TEMP_CA_KEY_PATTERN));
        pki.set_ca_cert_path(self.artifact(&self.ca_cert_path, TEMP_CA_CERT_PATTERN));
        pki.set_write_ca_key(self.write_ca_key);
        Ok(pki)
    }
}

impl Default for Configuration {
    /// **(Unusual!)**
    /// Returns tmppki's hard-wired configuration defaults.
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Rsa,
            strength: SecurityStrength::S128,
            ca: false,

            common_name: DEFAULT_LEAF_COMMON_NAME.into(),
            dns_names: Vec::new(),

            temporary: false,
            temp_dir: String::new(),
            key_path: DEFAULT_KEY_PATH.into(),
            cert_path: DEFAULT_CERT_PATH.into(),
            ca_key_path: DEFAULT_CA_KEY_PATH.into(),
            ca_cert_path: DEFAULT_CA_CERT_PATH.into(),
            write_ca_key: false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::Configuration;
    use crate::pki::ArtifactPath;
    use crate::{Algorithm, SecurityStrength};

    #[test]
    fn serialized_names() {
        let v = Configuration::default();
        let j = serde_json::to_value(&v).unwrap();
        assert_eq!(j["algorithm"], "rsa");
        assert_eq!(j["strength"], 128);
        assert!(j.get("dns_names").is_some());
    }

    #[test]
    fn ed25519_has_no_strength() {
        let c = Configuration {
            algorithm: Algorithm::Ed25519,
            ..Default::default()
        };
        assert_eq!(c.effective_strength(), None);
        let c = Configuration {
            algorithm: Algorithm::Ecdsa,
            strength: SecurityStrength::S192,
            ..Default::default()
        };
        assert_eq!(c.effective_strength(), Some(SecurityStrength::S192));
    }

    #[test]
    fn build_fixed() {
        let c = Configuration {
            algorithm: Algorithm::Ecdsa,
            common_name: "example".into(),
            ..Default::default()
        };
        let mut pki = c.build_pki().unwrap();
        assert_eq!(
            pki.key_path(),
            &ArtifactPath::Fixed(crate::pki::DEFAULT_KEY_PATH.into())
        );
        assert!(pki.ca_key().is_none());
        assert_eq!(
            pki.certificate().template().subject_common_name,
            "example"
        );
    }

    #[test]
    fn build_temporary() {
        let c = Configuration {
            algorithm: Algorithm::Ed25519,
            temporary: true,
            temp_dir: "/var/tmp".into(),
            ..Default::default()
        };
        let pki = c.build_pki().unwrap();
        assert_eq!(
            pki.cert_path(),
            &ArtifactPath::Temporary {
                dir: Some("/var/tmp".into()),
                pattern: crate::pki::TEMP_CERT_PATTERN.into()
            }
        );
    }

    #[test]
    fn build_bad_strength() {
        let c = Configuration {
            algorithm: Algorithm::Ecdsa,
            strength: SecurityStrength::S160,
            ..Default::default()
        };
        let _ = c.build_pki().expect_err("should have failed");
    }
}
