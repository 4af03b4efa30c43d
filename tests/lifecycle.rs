//! End-to-end lifecycle of a temporary PKI bundle
// (c) 2024 Ross Younger

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tmppki::serve::{HELLO_BODY, HELLO_PATH};
use tmppki::{
    Algorithm, CertificateTemplate, Error, HttpsServer, SecurityStrength, TemporaryPki,
};
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

fn pem_label(path: &Path) -> String {
    let text = std::fs::read_to_string(path).unwrap();
    let first = text.lines().next().unwrap();
    first
        .strip_prefix("-----BEGIN ")
        .and_then(|s| s.strip_suffix("-----"))
        .unwrap()
        .to_string()
}

fn resolved(pki: &TemporaryPki) -> (PathBuf, PathBuf) {
    (
        pki.key_path().as_path().unwrap().to_path_buf(),
        pki.cert_path().as_path().unwrap().to_path_buf(),
    )
}

/// GET over TLS, trusting only `trusted_der`, to the name `localhost`
async fn https_get(addr: SocketAddr, trusted_der: &[u8], path: &str) -> anyhow::Result<String> {
    let mut roots = rustls::RootCertStore::empty();
    roots.add(rustls_pki_types::CertificateDer::from(trusted_der.to_vec()))?;
    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_root_certificates(roots)
    .with_no_client_auth();
    let connector = tokio_rustls::TlsConnector::from(Arc::new(config));
    let tcp = tokio::net::TcpStream::connect(addr).await?;
    let name = rustls_pki_types::ServerName::try_from("localhost")?.to_owned();
    let mut tls = connector.connect(name, tcp).await?;
    tls.write_all(format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").as_bytes())
        .await?;
    let mut response = Vec::new();
    match tls.read_to_end(&mut response).await {
        Ok(_) => (),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => (),
        Err(e) => return Err(e.into()),
    }
    Ok(String::from_utf8(response)?)
}

#[test]
fn generate_then_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let mut pki = TemporaryPki::new(Algorithm::Rsa, Some(SecurityStrength::S128), None).unwrap();
    pki.use_temporary_paths_in(Some(dir.path()));

    let cleanup = pki.generate_pki().unwrap();
    assert!(pki.is_ready());
    let (key, cert) = resolved(&pki);
    assert!(key.exists());
    assert!(cert.exists());
    assert_eq!(pem_label(&key), "RSA PRIVATE KEY");
    assert_eq!(pem_label(&cert), "CERTIFICATE");

    cleanup.run().unwrap();
    assert_eq!(
        std::fs::metadata(&key).unwrap_err().kind(),
        std::io::ErrorKind::NotFound
    );
    assert_eq!(
        std::fs::metadata(&cert).unwrap_err().kind(),
        std::io::ErrorKind::NotFound
    );
}

#[tokio::test]
async fn serve_until_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let template = CertificateTemplate::default_leaf().with_dns_names(["localhost"]);
    let mut pki =
        TemporaryPki::new(Algorithm::Ecdsa, Some(SecurityStrength::S128), Some(template)).unwrap();
    pki.use_temporary_paths_in(Some(dir.path()));
    let trusted = pki.certificate().marshal_der().unwrap().to_vec();

    let server = HttpsServer::new("127.0.0.1:0".parse().unwrap());
    let handle = server.handle();
    let client = tokio::spawn(async move {
        let addr = handle.listening().await.unwrap();
        assert_ne!(addr.port(), 0);
        let hello = https_get(addr, &trusted, HELLO_PATH).await;
        let other = https_get(addr, &trusted, "/not-here").await;
        handle.shutdown();
        (hello, other)
    });

    let result = tokio::time::timeout(Duration::from_secs(30), pki.listen_and_serve_tls(&server))
        .await
        .unwrap();
    assert!(matches!(result, Err(Error::ServerClosed)));

    let (hello, other) = client.await.unwrap();
    let hello = hello.unwrap();
    assert!(hello.starts_with("HTTP/1.1 200 OK"), "{hello}");
    assert!(hello.ends_with(HELLO_BODY), "{hello}");
    assert!(other.unwrap().starts_with("HTTP/1.1 404 Not Found"));

    let (key, cert) = resolved(&pki);
    assert!(!key.exists());
    assert!(!cert.exists());
    assert!(!pki.is_ready());
}
