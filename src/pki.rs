//! Temporary PKI bundles: generation, materialisation on disk, serving and cleanup
// (c) 2024 Ross Younger

use std::{
    fmt::Display,
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, info, warn};

use crate::certificate::Certificate;
use crate::key::Key;
use crate::serve::TlsServer;
use crate::template::CertificateTemplate;
use crate::util::io::{create_truncate_file, remove_all};
use crate::{Algorithm, Error, Result, SecurityStrength};

/// Default location of the leaf private key
pub const DEFAULT_KEY_PATH: &str = "/tmp/server.key";
/// Default location of the leaf certificate
pub const DEFAULT_CERT_PATH: &str = "/tmp/server.crt";
/// Default location of the CA private key
pub const DEFAULT_CA_KEY_PATH: &str = "/tmp/tmppki-ca.key";
/// Default location of the CA certificate
pub const DEFAULT_CA_CERT_PATH: &str = "/tmp/tmppki-ca.crt";

/// Temporary file name pattern for the leaf private key
pub const TEMP_KEY_PATTERN: &str = "server-*.key";
/// Temporary file name pattern for the leaf certificate
pub const TEMP_CERT_PATTERN: &str = "server-*.crt";
/// Temporary file name pattern for the CA private key
pub const TEMP_CA_KEY_PATTERN: &str = "tmppki-ca-*.key";
/// Temporary file name pattern for the CA certificate
pub const TEMP_CA_CERT_PATTERN: &str = "tmppki-ca-*.crt";

/// Algorithm of the CA key in bundles that include a CA
pub const CA_ALGORITHM: Algorithm = Algorithm::Rsa;
/// Strength of the CA key in bundles that include a CA
pub const CA_STRENGTH: SecurityStrength = SecurityStrength::S160;

/// Where an artifact is to be written
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArtifactPath {
    /// Exactly this path. An existing file is overwritten.
    Fixed(PathBuf),
    /// A new, uniquely named file.
    ///
    /// The last `*` in the pattern is replaced by a random string; if there is none,
    /// the random string goes at the end.
    Temporary {
        /// Directory to create the file in. `None` means the system temporary directory.
        dir: Option<PathBuf>,
        /// File name pattern
        pattern: String,
    },
}

impl ArtifactPath {
    /// Splits a path into a directory and a file name pattern, for a temporary file.
    ///
    /// An empty directory component means the system temporary directory.
    #[must_use]
    pub fn temporary(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let dir = path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .map(Path::to_path_buf);
        let pattern = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::Temporary { dir, pattern }
    }

    /// The path, if it is fixed (or has been resolved by writing the artifact)
    #[must_use]
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            ArtifactPath::Fixed(p) => Some(p),
            ArtifactPath::Temporary { .. } => None,
        }
    }

    /// Creates the file, returning its actual path
    fn create(&self, private: bool) -> std::io::Result<(PathBuf, File)> {
        match self {
            ArtifactPath::Fixed(path) => Ok((path.clone(), create_truncate_file(path, private)?)),
            ArtifactPath::Temporary { dir, pattern } => {
                let (prefix, suffix) = match pattern.rfind('*') {
                    Some(i) => (&pattern[..i], &pattern[i + 1..]),
                    None => (pattern.as_str(), ""),
                };
                let mut builder = tempfile::Builder::new();
                let _ = builder.prefix(prefix).suffix(suffix);
                let file = match dir {
                    Some(d) => builder.tempfile_in(d)?,
                    None => builder.tempfile()?,
                };
                let (file, path) = file.keep().map_err(|e| e.error)?;
                Ok((path, file))
            }
        }
    }
}

impl From<PathBuf> for ArtifactPath {
    fn from(value: PathBuf) -> Self {
        Self::Fixed(value)
    }
}

impl From<&Path> for ArtifactPath {
    fn from(value: &Path) -> Self {
        Self::Fixed(value.to_path_buf())
    }
}

impl From<&str> for ArtifactPath {
    fn from(value: &str) -> Self {
        Self::Fixed(value.into())
    }
}

impl Display for ArtifactPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactPath::Fixed(p) => write!(f, "{}", p.display()),
            ArtifactPath::Temporary { dir: None, pattern } => write!(f, "<tempdir>/{pattern}"),
            ArtifactPath::Temporary {
                dir: Some(d),
                pattern,
            } => write!(f, "{}", d.join(pattern).display()),
        }
    }
}

/// Removes the files written by [`TemporaryPki::generate_pki`]
#[derive(Clone, Debug)]
#[must_use = "the generated files remain on disk until cleanup is run"]
pub struct Cleanup {
    paths: Vec<PathBuf>,
}

impl Cleanup {
    /// The files this cleanup will remove, in the order they were written
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Removes every file.
    ///
    /// Removal is attempted for every file even if an earlier one fails; all failures are reported together.
    /// Running this a second time fails, because the files are already gone.
    pub fn run(&self) -> Result<()> {
        let failures = remove_all(&self.paths);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Cleanup(failures))
        }
    }
}

#[derive(Debug)]
struct Authority {
    key: Arc<Key>,
    cert: Certificate,
}

/// A leaf key and certificate, optionally with the CA that signed it,
/// that can be written to disk for the benefit of a TLS server.
///
/// Keys are generated when the bundle is created; certificates are signed, and files written,
/// by [`generate_pki`](Self::generate_pki).
#[derive(Debug)]
pub struct TemporaryPki {
    key: Arc<Key>,
    cert: Certificate,
    ca: Option<Authority>,
    key_path: ArtifactPath,
    cert_path: ArtifactPath,
    ca_key_path: ArtifactPath,
    ca_cert_path: ArtifactPath,
    write_ca_key: bool,
    written: Vec<PathBuf>,
    ready: bool,
}

impl TemporaryPki {
    /// Creates a bundle with a self-signed leaf certificate.
    ///
    /// If no template is given, [`CertificateTemplate::default_leaf`] is used.
    pub fn new(
        algorithm: Algorithm,
        strength: Option<SecurityStrength>,
        template: Option<CertificateTemplate>,
    ) -> Result<Self> {
        let key = algorithm.generate_key(strength)?;
        Ok(Self::from_keys(key, template, None))
    }

    /// Creates a bundle whose leaf certificate is signed by a freshly generated CA.
    ///
    /// The CA key is always [`CA_ALGORITHM`] at [`CA_STRENGTH`].
    pub fn with_ca(
        algorithm: Algorithm,
        strength: Option<SecurityStrength>,
        template: Option<CertificateTemplate>,
    ) -> Result<Self> {
        debug!("generating CA key");
        let ca_key = CA_ALGORITHM.generate_key(Some(CA_STRENGTH))?;
        let key = algorithm.generate_key(strength)?;
        Ok(Self::from_keys(key, template, Some(ca_key)))
    }

    pub(crate) fn from_keys(
        key: Key,
        template: Option<CertificateTemplate>,
        ca_key: Option<Key>,
    ) -> Self {
        let key = Arc::new(key);
        let (cert, ca) = match ca_key {
            None => (key.certificate(template), None),
            Some(ca_key) => {
                let ca_key = Arc::new(ca_key);
                let ca_template = CertificateTemplate::default_ca();
                let ca_cert = ca_key.certificate(Some(ca_template.clone()));
                let cert = key.ca_signed_certificate(template, ca_template, Arc::clone(&ca_key));
                (
                    cert,
                    Some(Authority {
                        key: ca_key,
                        cert: ca_cert,
                    }),
                )
            }
        };
        Self {
            key,
            cert,
            ca,
            key_path: DEFAULT_KEY_PATH.into(),
            cert_path: DEFAULT_CERT_PATH.into(),
            ca_key_path: DEFAULT_CA_KEY_PATH.into(),
            ca_cert_path: DEFAULT_CA_CERT_PATH.into(),
            write_ca_key: false,
            written: Vec::new(),
            ready: false,
        }
    }

    /// The leaf key
    #[must_use]
    pub fn key(&self) -> &Arc<Key> {
        &self.key
    }

    /// The leaf certificate
    pub fn certificate(&mut self) -> &mut Certificate {
        &mut self.cert
    }

    /// The CA key, if this bundle has a CA
    #[must_use]
    pub fn ca_key(&self) -> Option<&Arc<Key>> {
        self.ca.as_ref().map(|ca| &ca.key)
    }

    /// The CA certificate, if this bundle has a CA
    pub fn ca_certificate(&mut self) -> Option<&mut Certificate> {
        self.ca.as_mut().map(|ca| &mut ca.cert)
    }

    /// Whether the files have been written (and not yet cleaned up)
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Where the leaf key is written. After [`generate_pki`](Self::generate_pki) this is the actual path.
    #[must_use]
    pub fn key_path(&self) -> &ArtifactPath {
        &self.key_path
    }

    /// Where the leaf certificate is written. After [`generate_pki`](Self::generate_pki) this is the actual path.
    #[must_use]
    pub fn cert_path(&self) -> &ArtifactPath {
        &self.cert_path
    }

    /// Where the CA key is written, if enabled
    #[must_use]
    pub fn ca_key_path(&self) -> &ArtifactPath {
        &self.ca_key_path
    }

    /// Where the CA certificate is written
    #[must_use]
    pub fn ca_cert_path(&self) -> &ArtifactPath {
        &self.ca_cert_path
    }

    /// Setter
    pub fn set_key_path(&mut self, path: impl Into<ArtifactPath>) {
        self.key_path = path.into();
    }

    /// Setter
    pub fn set_cert_path(&mut self, path: impl Into<ArtifactPath>) {
        self.cert_path = path.into();
    }

    /// Setter
    pub fn set_ca_key_path(&mut self, path: impl Into<ArtifactPath>) {
        self.ca_key_path = path.into();
    }

    /// Setter
    pub fn set_ca_cert_path(&mut self, path: impl Into<ArtifactPath>) {
        self.ca_cert_path = path.into();
    }

    /// Whether to write the CA private key to disk. Off by default; it is not needed to serve TLS.
    pub fn set_write_ca_key(&mut self, enabled: bool) {
        self.write_ca_key = enabled;
    }

    /// Whether the CA private key will be written
    #[must_use]
    pub fn writes_ca_key(&self) -> bool {
        self.write_ca_key
    }

    /// Switches every artifact to a uniquely named temporary file in the system temporary directory
    pub fn use_temporary_paths(&mut self) {
        self.use_temporary_paths_in(None);
    }

    /// Switches every artifact to a uniquely named temporary file in the given directory
    pub fn use_temporary_paths_in(&mut self, dir: Option<&Path>) {
        let temp = |pattern: &str| ArtifactPath::Temporary {
            dir: dir.map(Path::to_path_buf),
            pattern: pattern.into(),
        };
        self.key_path = temp(TEMP_KEY_PATTERN);
        self.cert_path = temp(TEMP_CERT_PATTERN);
        self.ca_key_path = temp(TEMP_CA_KEY_PATTERN);
        self.ca_cert_path = temp(TEMP_CA_CERT_PATTERN);
    }

    /// Writes the bundle to disk: CA material first (if any), then the leaf key and certificate.
    ///
    /// Temporary paths are resolved to the names actually created; read them back with
    /// [`key_path`](Self::key_path) and friends.
    ///
    /// If any step fails this returns immediately. Files already written by this call are left in place.
    pub fn generate_pki(&mut self) -> Result<Cleanup> {
        self.written.clear();
        self.ready = false;

        if let Some(ca) = self.ca.as_mut() {
            if self.write_ca_key {
                let key = &ca.key;
                let path = write_artifact(&mut self.ca_key_path, true, "CA key", |f| {
                    key.encode_pem(f)
                })?;
                self.written.push(path);
            }
            let cert = &mut ca.cert;
            let path = write_artifact(&mut self.ca_cert_path, false, "CA certificate", |f| {
                cert.encode_pem(f)
            })?;
            self.written.push(path);
        }

        let key = &self.key;
        let path = write_artifact(&mut self.key_path, true, "key", |f| key.encode_pem(f))?;
        self.written.push(path);

        let cert = &mut self.cert;
        let path = write_artifact(&mut self.cert_path, false, "certificate", |f| {
            cert.encode_pem(f)
        })?;
        self.written.push(path);

        self.ready = true;
        Ok(Cleanup {
            paths: self.written.clone(),
        })
    }

    /// Removes the files written by the last [`generate_pki`](Self::generate_pki)
    pub fn cleanup(&mut self) -> Result<()> {
        let cleanup = Cleanup {
            paths: std::mem::take(&mut self.written),
        };
        self.ready = false;
        cleanup.run()
    }

    /// Runs `server` against the bundle's certificate and key files.
    ///
    /// The files are written first if need be. They are always removed when the server returns,
    /// however it returns. If the server fails and so does cleanup, the server's error is returned.
    pub async fn listen_and_serve_tls<S: TlsServer>(&mut self, server: &S) -> Result<()> {
        if !self.ready {
            let _ = self.generate_pki()?;
        }
        let (cert_file, key_file) = match (self.cert_path.as_path(), self.key_path.as_path()) {
            (Some(c), Some(k)) => (c.to_path_buf(), k.to_path_buf()),
            _ => {
                return Err(Error::Tls(
                    "certificate or key path was not resolved".into(),
                ))
            }
        };
        info!("serving TLS with {}", cert_file.display());
        let served = server.serve_tls(&cert_file, &key_file).await;
        let cleaned = self.cleanup();
        match (served, cleaned) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(c)) if !e.is_server_closed() => {
                warn!("{c}");
                Err(e)
            }
            (_, Err(c)) => Err(c),
        }
    }
}

/// Creates a file for an artifact, records where it went and fills it.
fn write_artifact<F>(
    path: &mut ArtifactPath,
    private: bool,
    what: &str,
    write: F,
) -> Result<PathBuf>
where
    F: FnOnce(File) -> Result<()>,
{
    let (resolved, file) = path
        .create(private)
        .map_err(|e| Error::io(path.to_string(), e))?;
    *path = ArtifactPath::Fixed(resolved.clone());
    write(file).map_err(|e| match e {
        Error::Write(source) => Error::io(&resolved, source),
        other => other,
    })?;
    debug!("wrote {what} to {}", resolved.display());
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use assertables::assert_contains;

    use super::{ArtifactPath, TemporaryPki, TEMP_CERT_PATTERN};
    use crate::template::CertificateTemplate;
    use crate::{Algorithm, Error, Key, SecurityStrength};

    fn ec_key() -> Key {
        Algorithm::Ecdsa.must_generate_key(Some(SecurityStrength::S128))
    }

    fn label_of(path: &Path) -> String {
        let pem = std::fs::read_to_string(path).unwrap();
        let (label, _) = der::pem::decode_vec(pem.as_bytes()).unwrap();
        label.to_string()
    }

    #[test]
    fn temporary_path_split() {
        assert_eq!(
            ArtifactPath::temporary("/var/tmp/server-*.key"),
            ArtifactPath::Temporary {
                dir: Some("/var/tmp".into()),
                pattern: "server-*.key".into()
            }
        );
        assert_eq!(
            ArtifactPath::temporary("server-*.key"),
            ArtifactPath::Temporary {
                dir: None,
                pattern: "server-*.key".into()
            }
        );
    }

    #[test]
    fn temporary_names() {
        let dir = tempfile::tempdir().unwrap();
        let p = ArtifactPath::Temporary {
            dir: Some(dir.path().into()),
            pattern: TEMP_CERT_PATTERN.into(),
        };
        let (a, _) = p.create(false).unwrap();
        let (b, _) = p.create(false).unwrap();
        assert_ne!(a, b);
        let name = a.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("server-"));
        assert!(name.ends_with(".crt"));
        assert_eq!(a.parent().unwrap(), dir.path());

        let p = ArtifactPath::Temporary {
            dir: Some(dir.path().into()),
            pattern: "nostar".into(),
        };
        let (c, _) = p.create(false).unwrap();
        let name = c.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("nostar"));
        assert!(name.len() > "nostar".len());
    }

    #[test]
    fn fixed_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut pki = TemporaryPki::from_keys(ec_key(), None, None);
        let key_path = dir.path().join("leaf.key");
        let cert_path = dir.path().join("leaf.crt");
        pki.set_key_path(key_path.clone());
        pki.set_cert_path(cert_path.clone());
        assert!(!pki.is_ready());

        let cleanup = pki.generate_pki().unwrap();
        assert!(pki.is_ready());
        assert_eq!(cleanup.paths(), &[key_path.clone(), cert_path.clone()]);
        assert_eq!(label_of(&key_path), "EC PRIVATE KEY");
        assert_eq!(label_of(&cert_path), "CERTIFICATE");

        cleanup.run().unwrap();
        assert!(!key_path.exists());
        assert!(!cert_path.exists());
        let e = cleanup.run().unwrap_err();
        assert!(matches!(e, Error::Cleanup(ref v) if v.len() == 2));
    }

    #[cfg(unix)]
    #[test]
    fn overwritten_key_becomes_private() {
        use std::os::unix::fs::PermissionsExt as _;
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("server.key");
        std::fs::write(&key_path, b"stale").unwrap();
        std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let mut pki = TemporaryPki::from_keys(ec_key(), None, None);
        pki.set_key_path(key_path.clone());
        pki.set_cert_path(dir.path().join("server.crt"));
        let cleanup = pki.generate_pki().unwrap();
        let mode = std::fs::metadata(&key_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(label_of(&key_path), "EC PRIVATE KEY");
        cleanup.run().unwrap();
    }

    #[test]
    fn temporary_paths_are_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let mut pki = TemporaryPki::from_keys(ec_key(), None, None);
        pki.use_temporary_paths_in(Some(dir.path()));
        assert!(pki.key_path().as_path().is_none());

        let cleanup = pki.generate_pki().unwrap();
        let key = pki.key_path().as_path().unwrap().to_path_buf();
        let cert = pki.cert_path().as_path().unwrap().to_path_buf();
        assert!(key.starts_with(dir.path()));
        assert!(key.exists());
        assert!(cert.exists());
        // the CA paths are untouched when there is no CA
        assert!(pki.ca_cert_path().as_path().is_none());
        pki.cleanup().unwrap();
        assert!(!key.exists());
        assert!(!pki.is_ready());
        // the standalone cleanup now has nothing left to remove
        let _ = cleanup.run().expect_err("should have failed");
    }

    #[test]
    fn ca_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let ca_key = Algorithm::Ecdsa.must_generate_key(Some(SecurityStrength::S192));
        let mut pki = TemporaryPki::from_keys(
            Algorithm::Ed25519.must_generate_key(None),
            Some(CertificateTemplate::default_leaf().with_common_name("leaf")),
            Some(ca_key),
        );
        pki.use_temporary_paths_in(Some(dir.path()));
        pki.set_write_ca_key(true);
        let cleanup = pki.generate_pki().unwrap();

        let written: Vec<PathBuf> = cleanup.paths().to_vec();
        assert_eq!(written.len(), 4);
        assert_eq!(label_of(&written[0]), "EC PRIVATE KEY");
        assert_eq!(label_of(&written[1]), "CERTIFICATE");
        assert_eq!(label_of(&written[2]), "OPENSSH PRIVATE KEY");
        assert_eq!(label_of(&written[3]), "CERTIFICATE");

        let ca_public = pki.ca_key().unwrap().public();
        pki.certificate().verify_signed_by(&ca_public).unwrap();
        let ca_cert = pki.ca_certificate().unwrap();
        ca_cert.verify_signed_by(&ca_public).unwrap();
        assert_eq!(
            pki.certificate().subject_common_name().unwrap().as_deref(),
            Some("leaf")
        );
        cleanup.run().unwrap();
        for p in written {
            assert!(!p.exists());
        }
    }

    #[test]
    fn ca_key_not_written_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut pki = TemporaryPki::from_keys(ec_key(), None, Some(ec_key()));
        pki.use_temporary_paths_in(Some(dir.path()));
        let cleanup = pki.generate_pki().unwrap();
        assert_eq!(cleanup.paths().len(), 3);
        assert!(pki.ca_key_path().as_path().is_none());
        cleanup.run().unwrap();
    }

    #[test]
    fn write_failure_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut pki = TemporaryPki::from_keys(ec_key(), None, None);
        pki.set_key_path(dir.path().join("leaf.key"));
        pki.set_cert_path(dir.path().join("no/such/dir/leaf.crt"));
        let e = pki.generate_pki().unwrap_err();
        assert_contains!(e.to_string(), "no/such/dir/leaf.crt");
        assert!(!pki.is_ready());
        // the key was written before the failure and is left behind
        assert!(dir.path().join("leaf.key").exists());
    }

    /// Records what it was asked to serve, optionally deletes the key file, then returns `result`
    struct FakeServer {
        result: fn() -> crate::Result<()>,
        sabotage: bool,
        seen: std::sync::Mutex<Option<(PathBuf, PathBuf, bool)>>,
    }

    impl crate::TlsServer for FakeServer {
        async fn serve_tls(&self, cert_file: &Path, key_file: &Path) -> crate::Result<()> {
            let existed = cert_file.exists() && key_file.exists();
            *self.seen.lock().unwrap() = Some((cert_file.into(), key_file.into(), existed));
            if self.sabotage {
                std::fs::remove_file(key_file).unwrap();
            }
            (self.result)()
        }
    }

    fn fake(result: fn() -> crate::Result<()>, sabotage: bool) -> FakeServer {
        FakeServer {
            result,
            sabotage,
            seen: std::sync::Mutex::new(None),
        }
    }

    #[tokio::test]
    async fn serve_writes_then_removes() {
        let dir = tempfile::tempdir().unwrap();
        let mut pki = TemporaryPki::from_keys(ec_key(), None, None);
        pki.use_temporary_paths_in(Some(dir.path()));
        let server = fake(|| Err(Error::ServerClosed), false);
        let e = pki.listen_and_serve_tls(&server).await.unwrap_err();
        assert!(e.is_server_closed());
        let (cert, key, existed) = server.seen.lock().unwrap().take().unwrap();
        assert!(existed);
        assert!(!cert.exists());
        assert!(!key.exists());
        assert!(!pki.is_ready());
    }

    #[tokio::test]
    async fn serve_success_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let mut pki = TemporaryPki::from_keys(ec_key(), None, None);
        pki.use_temporary_paths_in(Some(dir.path()));
        pki.listen_and_serve_tls(&fake(|| Ok(()), false))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn serve_error_beats_cleanup_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut pki = TemporaryPki::from_keys(ec_key(), None, None);
        pki.use_temporary_paths_in(Some(dir.path()));
        let server = fake(|| Err(Error::Tls("boom".into())), true);
        let e = pki.listen_and_serve_tls(&server).await.unwrap_err();
        assert!(matches!(e, Error::Tls(_)));
    }

    #[tokio::test]
    async fn cleanup_error_beats_server_closed() {
        let dir = tempfile::tempdir().unwrap();
        let mut pki = TemporaryPki::from_keys(ec_key(), None, None);
        pki.use_temporary_paths_in(Some(dir.path()));
        let server = fake(|| Err(Error::ServerClosed), true);
        let e = pki.listen_and_serve_tls(&server).await.unwrap_err();
        assert!(matches!(e, Error::Cleanup(ref v) if v.len() == 1));
        // the certificate was still removed
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn serve_ca_signed_https() {
        use crate::serve::{https_get, HELLO_BODY, HELLO_PATH};

        let dir = tempfile::tempdir().unwrap();
        let ca_key = Algorithm::Ecdsa.must_generate_key(Some(SecurityStrength::S192));
        let template = CertificateTemplate::default_leaf().with_dns_names(["localhost"]);
        let mut pki = TemporaryPki::from_keys(ec_key(), Some(template), Some(ca_key));
        pki.use_temporary_paths_in(Some(dir.path()));
        // the client trusts only the CA
        let ca_der = pki
            .ca_certificate()
            .unwrap()
            .marshal_der()
            .unwrap()
            .to_vec();

        let server = crate::HttpsServer::new("127.0.0.1:0".parse().unwrap());
        let handle = server.handle();
        let client = tokio::spawn(async move {
            let addr = handle.listening().await.unwrap();
            let hello = https_get(addr, &ca_der, HELLO_PATH).await;
            let other = https_get(addr, &ca_der, "/elsewhere").await;
            handle.shutdown();
            (hello, other)
        });
        let e = pki.listen_and_serve_tls(&server).await.unwrap_err();
        assert!(e.is_server_closed());

        let (hello, other) = client.await.unwrap();
        let hello = hello.unwrap();
        assert!(hello.starts_with("HTTP/1.1 200 OK"), "{hello}");
        assert!(hello.ends_with(HELLO_BODY), "{hello}");
        assert!(other.unwrap().starts_with("HTTP/1.1 404 Not Found"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    #[ignore = "generating the 4096 bit CA key is slow"]
    fn with_ca_uses_rsa() {
        let pki = TemporaryPki::with_ca(Algorithm::Ed25519, None, None).unwrap();
        assert_eq!(pki.ca_key().unwrap().algorithm(), super::CA_ALGORITHM);
    }
}
