//! Configuration file wrangling
// (c) 2024 Ross Younger

use super::Configuration;

use anyhow::Result;
use figment::{
    providers::{Format, Serialized, Toml},
    value::{Dict, Map, Value},
    Figment, Metadata, Profile, Provider,
};
use serde::Deserialize;
use std::{
    collections::HashSet,
    fmt::Display,
    path::{Path, PathBuf},
};
use struct_field_names_as_array::FieldNamesAsSlice;
use tabled::{settings::style::Style, Table, Tabled};

use tracing::{trace, warn};

// PATHS /////////////////////////////////////////////////////////////////////////////////////////////////////

const BASE_CONFIG_FILENAME: &str = "tmppki.toml";

fn user_config_path() -> Result<PathBuf> {
    // ~/.<filename> for now
    let mut p = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("could not determine home directory"))?;
    p.push(format!(".{BASE_CONFIG_FILENAME}"));
    Ok(p)
}

fn system_config_path() -> PathBuf {
    // /etc/<filename> for now
    Path::new("/etc").join(BASE_CONFIG_FILENAME)
}

// SYSTEM DEFAULTS //////////////////////////////////////////////////////////////////////////////////////////////

/// A [`figment::Provider`] holding the hard-wired defaults
#[derive(Debug, Default)]
struct SystemDefault {}

impl SystemDefault {
    const META_NAME: &str = "default";
}

impl Provider for SystemDefault {
    fn metadata(&self) -> Metadata {
        Metadata::named(Self::META_NAME)
    }

    fn data(&self) -> std::result::Result<Map<Profile, Dict>, figment::Error> {
        Serialized::defaults(Configuration::default()).data()
    }
}

// CONFIG MANAGER /////////////////////////////////////////////////////////////////////////////////////////////

/// Processes and merges all possible configuration sources.
///
/// In increasing order of priority:
/// 1. Hard-wired defaults
/// 2. The system configuration file (`/etc/tmppki.toml`)
/// 3. The user configuration file (`~/.tmppki.toml`)
/// 4. Anything merged in afterwards, usually the command line
///
/// To see which files apply, run `tmppki --config-files`.
#[derive(Debug, Default)]
pub struct Manager {
    /// Configuration data
    data: Figment,
}

fn add_file_if_present(f: Figment, what: &str, path: &Path) -> Figment {
    if !path.exists() {
        trace!("{what} configuration file {} not present", path.display());
        return f;
    }
    trace!("reading {what} configuration from {}", path.display());
    f.merge(Toml::file(path))
}

impl Manager {
    /// Initialises this structure, reading the system and user configuration files.
    #[must_use]
    pub fn new() -> Self {
        let mut data = Figment::new().merge(SystemDefault::default());
        data = add_file_if_present(data, "system", &system_config_path());
        match user_config_path() {
            // N.B. This may leave data in a fused-error state, if a data file isn't parseable.
            Ok(p) => data = add_file_if_present(data, "user", &p),
            Err(e) => warn!("could not determine user configuration file path: {e}"),
        }
        Self { data }
    }

    /// Returns the list of configuration files we would read, whether or not they exist.
    #[must_use]
    pub fn config_files() -> Vec<String> {
        [Ok(system_config_path()), user_config_path()]
            .into_iter()
            .filter_map(std::result::Result::ok)
            .map(|p| p.to_string_lossy().into())
            .collect()
    }

    /// Testing/internal constructor, does not read files from system
    #[must_use]
    pub fn without_files() -> Self {
        Self {
            data: Figment::new().merge(SystemDefault::default()),
        }
    }

    /// Merges in a data set, which is some sort of [`figment::Provider`].
    ///
    /// The command line arrives here as `Configuration_Optional`, which implements Provider
    /// by way of [`crate::util::derive_deftly_template_Optionalify`].
    pub fn merge_provider<T>(&mut self, provider: T)
    where
        T: Provider,
    {
        let f = std::mem::take(&mut self.data);
        self.data = f.merge(provider); // in the error case, this leaves the provider in a fused state
    }

    /// Merges in a data set from a TOML file, which must exist
    pub fn merge_toml_file<T>(&mut self, toml: T)
    where
        T: AsRef<Path>,
    {
        self.merge_provider(Toml::file_exact(toml.as_ref()));
    }

    /// Attempts to extract a particular struct from the data.
    ///
    /// `T` is usually [Configuration], but it isn't intrinsically required to be.
    pub fn get<'de, T>(&self) -> Result<T, figment::Error>
    where
        T: Deserialize<'de>,
    {
        self.data.extract::<T>()
    }

    /// Creates a `DisplayAdapter` showing the fields of `T`, their values and where each came from.
    ///
    /// # Returns
    /// An ephemeral structure implementing `Display`.
    #[must_use]
    pub fn to_display_adapter<'de, T>(&self, warn_on_unused: bool) -> DisplayAdapter<'_>
    where
        T: Deserialize<'de> + FieldNamesAsSlice,
    {
        DisplayAdapter {
            source: self,
            warn_on_unused,
            fields: T::FIELD_NAMES_AS_SLICE.iter().map(|s| String::from(*s)).collect(),
        }
    }
}

// PRETTY PRINT SUPPORT ///////////////////////////////////////////////////////////////////////////////////////

#[derive(Tabled)]
struct PrettyConfig {
    field: String,
    value: String,
    source: String,
}

impl PrettyConfig {
    fn render_source(meta: Option<&Metadata>) -> String {
        meta.map(|m| {
            m.source
                .as_ref()
                .map_or_else(|| m.name.to_string(), figment::Source::to_string)
        })
        .unwrap_or_default()
    }

    fn render_value(value: &Value) -> String {
        match value {
            Value::String(_tag, s) => s.to_string(),
            Value::Char(_tag, c) => c.to_string(),
            Value::Bool(_tag, b) => b.to_string(),
            Value::Num(_tag, num) => num
                .to_i128()
                .map(|i| i.to_string())
                .or_else(|| num.to_u128().map(|u| u.to_string()))
                .or_else(|| num.to_f64().map(|f| f.to_string()))
                .unwrap_or_else(|| "<number>".into()),
            Value::Empty(_tag, _) => "<empty>".into(),
            Value::Dict(_tag, dict) => format!(
                "{{{}}}",
                dict.iter()
                    .map(|(k, v)| format!("{k}={}", PrettyConfig::render_value(v)))
                    .collect::<Vec<_>>()
                    .join(",")
            ),
            Value::Array(_tag, vec) => format!(
                "[{}]",
                vec.iter()
                    .map(PrettyConfig::render_value)
                    .collect::<Vec<_>>()
                    .join(",")
            ),
        }
    }

    fn new(field: &str, value: &Value, meta: Option<&Metadata>) -> Self {
        Self {
            field: field.into(),
            value: PrettyConfig::render_value(value),
            source: PrettyConfig::render_source(meta),
        }
    }
}

/// Pretty-printing type wrapper to Manager
#[derive(Debug)]
pub struct DisplayAdapter<'a> {
    /// Data source
    source: &'a Manager,
    /// Whether to warn if unused fields are present
    warn_on_unused: bool,
    /// The fields we want to output
    fields: HashSet<String>,
}

impl Display for DisplayAdapter<'_> {
    /// Formats the contents of this structure which are relevant to a given output type.
    ///
    /// N.B. This function uses CLI styling.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use crate::cli::styles::{ERROR, WARNING};
        use anstream::eprintln;

        let data = match self.source.data.data() {
            Ok(d) => d,
            Err(e) => {
                // This isn't terribly helpful as it doesn't have metadata attached; BUT attempting to get() a struct does.
                eprintln!("{ERROR}ERROR{ERROR:#} {e}");
                return Ok(());
            }
        };
        let Some(data) = data.get(&Profile::Default) else {
            return Ok(());
        };

        let mut output = Vec::<PrettyConfig>::new();
        for field in data.keys() {
            let meta = self.source.data.find_metadata(field);
            if self.fields.contains(field) {
                match self.source.data.find_value(field) {
                    Ok(value) => output.push(PrettyConfig::new(field, &value, meta)),
                    Err(e) => eprintln!("{WARNING}WARNING{WARNING:#}: error on {field}: {e}"),
                }
            } else if self.warn_on_unused {
                let source = PrettyConfig::render_source(meta);
                eprintln!("{WARNING}WARNING{WARNING:#}: unrecognised field `{field}` in {source}");
            }
        }
        write!(f, "{}", Table::new(output).with(Style::sharp()))
    }
}
