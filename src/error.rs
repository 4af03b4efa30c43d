//! Error types
// (c) 2024 Ross Younger

use std::path::PathBuf;

use crate::{Algorithm, SecurityStrength};

/// The result type for tmppki operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while generating or materialising temporary PKI.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Configuration ---------------------------------------------------------
    /// The algorithm name is not one we know about
    #[error("unrecognized key algorithm `{0}`")]
    UnrecognizedAlgorithm(String),
    /// ECDSA and RSA keys need a security strength
    #[error("a security strength is required for {0} keys")]
    StrengthRequired(Algorithm),
    /// The algorithm family has no entry for this strength
    #[error("{strength} bit strength is not available for {algorithm} keys")]
    StrengthUnsupported {
        /// Requested algorithm
        algorithm: Algorithm,
        /// Requested strength
        strength: SecurityStrength,
    },
    /// The number given does not name a security strength
    #[error("{0} is not a recognised security strength (expected one of 112, 128, 160, 192, 256)")]
    UnknownStrength(String),

    // Generation ------------------------------------------------------------
    /// The underlying key generation primitive failed
    #[error("key generation failed: {0}")]
    KeyGeneration(String),
    /// The public half of a generated key did not match the private half
    #[error("public keys don't match")]
    KeyConsistency,
    /// DER or PEM encoding/decoding failed
    #[error("encoding failed: {0}")]
    Encoding(String),
    /// A PEM document could not be understood
    #[error("unusable PEM document: {0}")]
    Pem(String),
    /// The X.509 builder or signer failed
    #[error("certificate creation failed: {0}")]
    Certificate(String),
    /// A signature did not verify
    #[error("signature verification failed: {0}")]
    Verification(String),

    // I/O -------------------------------------------------------------------
    /// Filesystem operation failed
    #[error("{path}: {source}")]
    Io {
        /// The offending path
        path: PathBuf,
        /// What went wrong
        #[source]
        source: std::io::Error,
    },
    /// Writing to a caller-supplied sink failed
    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),
    /// One or more artifacts could not be removed
    #[error("failed to remove {}", describe_failures(.0))]
    Cleanup(Vec<(PathBuf, std::io::Error)>),

    // Serving ---------------------------------------------------------------
    /// The server could not listen on its address
    #[error("could not listen on {addr}: {source}")]
    Bind {
        /// Requested address
        addr: std::net::SocketAddr,
        /// What went wrong
        #[source]
        source: std::io::Error,
    },
    /// TLS setup or serving failed
    #[error("TLS error: {0}")]
    Tls(String),
    /// The server was shut down; this is the normal way for serving to end
    #[error("server closed")]
    ServerClosed,
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn encoding(e: impl std::fmt::Display) -> Self {
        Self::Encoding(e.to_string())
    }

    pub(crate) fn certificate(e: impl std::fmt::Display) -> Self {
        Self::Certificate(e.to_string())
    }

    pub(crate) fn tls(e: impl std::fmt::Display) -> Self {
        Self::Tls(e.to_string())
    }

    /// Is this the normal end-of-service condition?
    #[must_use]
    pub fn is_server_closed(&self) -> bool {
        matches!(self, Self::ServerClosed)
    }
}

fn describe_failures(failures: &[(PathBuf, std::io::Error)]) -> String {
    failures
        .iter()
        .map(|(path, e)| format!("{} ({e})", path.display()))
        .collect::<Vec<_>>()
        .join(", ")
}
