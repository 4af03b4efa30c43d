// tmppki top-level command-line arguments
// (c) 2024 Ross Younger

use std::net::SocketAddr;

use clap::Parser;

use crate::config::Configuration_Optional;

#[derive(Debug, Parser, Clone)]
#[command(
    author,
    version(env!("TMPPKI_VERSION_STRING")),
    about,
    before_help = "e.g.   tmppki --ca --dns-name localhost",
    infer_long_args(true)
)]
#[command(help_template(
    "\
{name} version {version}
{about-with-newline}
{usage-heading} {usage}
{before-help}
{all-args}{after-help}
"
))]
#[command(styles=super::styles::CLAP_STYLES)]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct CliArgs {
    // MODE SELECTION ======================================================================
    /// Serves HTTPS on the given address using the generated files, removing them on exit.
    ///
    /// The server answers `/hello`. Stop it with Ctrl-C.
    #[arg(long, value_name("addr"), help_heading("Modes"), conflicts_with("keep"))]
    pub serve: Option<SocketAddr>,

    /// Writes the files and exits, leaving them in place
    ///
    /// Without this option (and without `--serve`), tmppki waits for Ctrl-C then removes the files.
    #[arg(short, long, action, help_heading("Modes"))]
    pub keep: bool,

    /// Outputs the configuration, then exits
    #[arg(long, action, help_heading("Configuration"), display_order(0))]
    pub show_config: bool,

    /// Outputs the paths to configuration file(s), then exits
    #[arg(long, action, help_heading("Configuration"), display_order(0))]
    pub config_files: bool,

    // DEBUG ===============================================================================
    /// Enable detailed debug output
    ///
    /// This has the same effect as setting `RUST_LOG=tmppki=debug` in the environment.
    /// If present, `RUST_LOG` overrides this option.
    #[arg(short, long, action, help_heading("Debug"))]
    pub debug: bool,

    /// Reports only errors
    #[arg(short, long, action, conflicts_with("debug"), help_heading("Debug"))]
    pub quiet: bool,

    /// Log to a file
    ///
    /// By default the log receives everything printed to stderr.
    /// To override this behaviour, set the environment variable `RUST_LOG_FILE_DETAIL` (same semantics as `RUST_LOG`).
    #[arg(short('l'), long, action, help_heading("Debug"), value_name("FILE"))]
    pub log_file: Option<String>,

    // CONFIGURABLE OPTIONS ================================================================
    #[command(flatten)]
    pub config: Configuration_Optional,
}

impl CliArgs {
    pub(crate) fn trace_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }
}
