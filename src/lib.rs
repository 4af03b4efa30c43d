// (c) 2024 Ross Younger

//! Short-lived keys, X.509 certificates and PKI bundles for TLS test harnesses.
//!
//! tmppki generates a private key (RSA, ECDSA or Ed25519, sized by [`SecurityStrength`]),
//! wraps it in a certificate (self-signed, or signed by a freshly generated CA),
//! writes both to disk as PEM, and removes them again when you are done.
//!
//! ## Library usage
//!
//! ```
//! use tmppki::{Algorithm, TemporaryPki};
//!
//! let mut pki = TemporaryPki::new(Algorithm::Ed25519, None, None)?;
//! pki.use_temporary_paths();
//! let cleanup = pki.generate_pki()?;
//! for path in cleanup.paths() {
//!     assert!(path.exists());
//! }
//! cleanup.run()?;
//! # Ok::<(), tmppki::Error>(())
//! ```
//!
//! To serve TLS directly from a bundle, see [`TemporaryPki::listen_and_serve_tls`] and [`HttpsServer`].
//!
//! ## Command line
//!
//! The `tmppki` binary writes a bundle, prints where it went, and removes it on Ctrl-C.
//! `tmppki --serve 127.0.0.1:8443` serves HTTPS from the bundle instead.
//! Options may also be set in configuration files; see [`config`].

mod algorithm;
pub use algorithm::Algorithm;
mod certificate;
pub use certificate::{Certificate, CERTIFICATE_PEM_LABEL};
mod cli;
pub use cli::cli;
pub mod config;
mod credentials;
pub use credentials::Credentials;
mod error;
pub use error::{Error, Result};
mod key;
pub use key::{EcdsaPrivateKey, Key, PrivateKey, PublicKey};
pub mod pki;
pub use pki::{ArtifactPath, Cleanup, TemporaryPki};
pub mod serve;
pub use serve::{HttpsServer, ServerHandle, TlsServer};
mod strength;
pub use strength::{ecdsa_curve, rsa_modulus_bits, EcdsaCurve, SecurityStrength};
pub mod template;
pub use template::CertificateTemplate;
/// Utilities
pub mod util;

// The exported Optionalify template refers to derive_deftly through `$crate`
#[doc(hidden)]
pub use derive_deftly;
