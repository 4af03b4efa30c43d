// Main CLI entrypoint
// (c) 2024 Ross Younger

use std::future::Future;
use std::net::SocketAddr;
use std::process::ExitCode;

use super::args::CliArgs;
use super::styles::{INFO, PATH};

use crate::{
    config::{Configuration, Manager},
    pki::{ArtifactPath, Cleanup, TemporaryPki},
    serve::HttpsServer,
    util::setup_tracing,
    Error,
};
use anstream::println;
use anyhow::Context as _;
use clap::Parser;
use tracing::{error_span, info, Instrument as _};

/// Main CLI entrypoint
pub fn cli() -> anyhow::Result<ExitCode> {
    let args = CliArgs::parse();
    if args.config_files {
        println!("{:?}", Manager::config_files());
        return Ok(ExitCode::SUCCESS);
    }

    let mut manager = Manager::new();
    manager.merge_provider(args.config.clone());
    if args.show_config {
        println!("{}", manager.to_display_adapter::<Configuration>(true));
        return Ok(ExitCode::SUCCESS);
    }

    setup_tracing(args.trace_level(), args.log_file.as_deref())
        .inspect_err(|e| eprintln!("{e:?}"))?;
    let config = manager
        .get::<Configuration>()
        .context("failed to read configuration")
        .inspect_err(|e| tracing::error!("{e:#}"))?;

    run(&args, &config)
}

#[tokio::main(flavor = "current_thread")]
async fn run(args: &CliArgs, config: &Configuration) -> anyhow::Result<ExitCode> {
    let mut pki = config
        .build_pki()
        .inspect_err(|e| tracing::error!("{e}"))?;

    if let Some(addr) = args.serve {
        return serve(pki, addr)
            .instrument(error_span!("SERVER"))
            .await;
    }

    let cleanup = pki.generate_pki().inspect_err(|e| tracing::error!("{e}"))?;
    print_paths(&pki);

    if args.keep {
        info!("leaving files in place");
        return Ok(ExitCode::SUCCESS);
    }
    info!("press Ctrl-C to remove the files and exit");
    cleanup_after(tokio::signal::ctrl_c(), &cleanup)
        .await
        .inspect_err(|e| tracing::error!("{e:#}"))?;
    info!("removed {} files", cleanup.paths().len());
    Ok(ExitCode::SUCCESS)
}

/// Waits for `signal`, then cleans up whether or not waiting succeeded.
///
/// A failed wait is reported after cleanup has run; if cleanup fails too, that failure is reported instead.
async fn cleanup_after<F>(signal: F, cleanup: &Cleanup) -> anyhow::Result<()>
where
    F: Future<Output = std::io::Result<()>>,
{
    let waited = signal.await;
    cleanup.run()?;
    waited.context("failed to wait for Ctrl-C")
}

async fn serve(mut pki: TemporaryPki, addr: SocketAddr) -> anyhow::Result<ExitCode> {
    let server = HttpsServer::new(addr);
    let stopper = server.handle();
    let _ = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted");
            stopper.shutdown();
        }
    });

    match pki.listen_and_serve_tls(&server).await {
        Ok(()) | Err(Error::ServerClosed) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            tracing::error!("{e}");
            Err(e.into())
        }
    }
}

fn print_paths(pki: &TemporaryPki) {
    let show = |what: &str, path: &ArtifactPath| {
        if let Some(p) = path.as_path() {
            println!("{INFO}{what:>15}{INFO:#} {PATH}{}{PATH:#}", p.display());
        }
    };
    if pki.ca_key().is_some() {
        show("CA certificate:", pki.ca_cert_path());
        if pki.writes_ca_key() {
            show("CA key:", pki.ca_key_path());
        }
    }
    show("Certificate:", pki.cert_path());
    show("Key:", pki.key_path());
}

#[cfg(test)]
mod tests {
    use super::cleanup_after;
    use crate::{Algorithm, SecurityStrength, TemporaryPki};

    fn written() -> (tempfile::TempDir, TemporaryPki, crate::Cleanup) {
        let dir = tempfile::tempdir().unwrap();
        let mut pki =
            TemporaryPki::new(Algorithm::Ecdsa, Some(SecurityStrength::S128), None).unwrap();
        pki.use_temporary_paths_in(Some(dir.path()));
        let cleanup = pki.generate_pki().unwrap();
        (dir, pki, cleanup)
    }

    #[tokio::test]
    async fn removes_files_after_signal() {
        let (dir, _pki, cleanup) = written();
        cleanup_after(async { Ok(()) }, &cleanup).await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn removes_files_when_signal_fails() {
        let (dir, _pki, cleanup) = written();
        let e = cleanup_after(
            async { Err(std::io::Error::other("no signal handler")) },
            &cleanup,
        )
        .await
        .unwrap_err();
        assert!(format!("{e:#}").contains("no signal handler"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
