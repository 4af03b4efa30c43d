//! Command Line Interface for tmppki
// (c) 2024 Ross Younger
mod args;
mod cli_main;
pub(crate) mod styles;
pub use cli_main::cli;
