// (c) 2024 Ross Younger
//! # Configuration management
//!
//! tmppki obtains run-time configuration from the following sources, in order:
//! 1. Command-line options
//! 2. The user's configuration file (`~/.tmppki.toml`)
//! 3. The system-wide configuration file (`/etc/tmppki.toml`)
//! 4. Hard-wired defaults
//!
//! Each option may appear in multiple places, but only the first match is used.
//!
//! ## File format
//!
//! Configuration files are [TOML](https://toml.io/). Field names are as in [Configuration].
//!
//! ### Example
//!
//! ```text
//! # Short ECDSA keys, signed by a CA, in uniquely-named files under /var/tmp
//! algorithm = "ecdsa"
//! strength = 128
//! ca = true
//! temporary = true
//! temp_dir = "/var/tmp"
//! dns_names = ["localhost"]
//! ```
//!
//! ## Configurable options
//!
//! The full list of supported fields is defined by [Configuration].
//!
//! On the command line:
//! * `tmppki --show-config` outputs a list of supported fields, their current values, and where each value came from.
//! * For an explanation of each field, refer to `tmppki --help` .
//! * `tmppki --config-files` outputs the list of configuration files for the current user and platform.

mod structure;
pub use structure::Configuration;
pub(crate) use structure::Configuration_Optional;

mod manager;
pub use manager::{DisplayAdapter, Manager};
