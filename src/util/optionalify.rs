//! Macro to derive a command-line friendly variant of a configuration structure
// (c) 2024 Ross Younger

#![allow(meta_variable_misuse)] // false positives in these macro definitions

use derive_deftly::define_derive_deftly;
use figment::value::{Dict, Value};

/// Helper function for `figment::Provider` implementation
///
/// If the given `arg` is not None, inserts it into `dict` with key `arg_name`.
pub fn insert_if_some<T>(
    dict: &mut Dict,
    arg_name: &str,
    arg: Option<T>,
) -> Result<(), figment::Error>
where
    T: serde::Serialize,
{
    if let Some(a) = arg {
        let _ = dict.insert(arg_name.to_string(), Value::serialize(a)?);
    }
    Ok(())
}

define_derive_deftly! {
    /// Derives an all-optional twin of a configuration struct, for use with
    /// [`clap`](https://docs.rs/clap/) and [`figment`](https://docs.rs/figment/).
    ///
    /// The twin:
    /// * is named `{OriginalName}_Optional`;
    /// * has every field of the original, with its attributes, wrapped in [`std::option::Option`]
    ///   (fields that were already `Option<T>` become `Option<Option<T>>`);
    /// * carries the original's struct attributes, plus `#[derive(Default)]`;
    /// * has the original's visibility, unless overridden with `#[deftly(visibility = "...")]`;
    /// * implements [`figment::Provider`](https://docs.rs/figment/latest/figment/trait.Provider.html),
    ///   yielding only the fields that are `Some`.
    ///
    /// Parsing a command line into the twin therefore records only what the user actually typed,
    /// and merging it over the defaults and configuration files gives the final configuration.
    /// Don't set clap `default_value` attributes on the original; register defaults with figment instead.
    ///
    /// If the original already derives `Default`, add `#[deftly(already_has_default)]`
    /// so the twin doesn't derive it twice.
    ///
    /// <div class="warning">
    /// Attributes to be copied to the twin must appear <i>after</i> <code>derive_deftly(Optionalify)</code>:
    /// </div>
    ///
    /// ```
    /// use derive_deftly::Deftly;
    /// use tmppki::derive_deftly_template_Optionalify;
    /// #[derive(Deftly)]
    /// #[derive_deftly(Optionalify)]
    /// #[derive(Debug, Clone, serde::Serialize)]
    /// struct Settings {
    ///     name: String,
    /// }
    /// let cli = Settings_Optional { name: None };
    /// assert!(cli.name.is_none());
    /// ```
    ///
    /// Use `#[derive_deftly(Optionalify[dbg])]` to see the expansion at compile time.
    export Optionalify for struct, expect items:
    ${define OPTIONAL_TYPE ${paste $tdeftype _Optional}}

    /// Auto-derived struct variant
    ///
    #[allow(non_camel_case_types)]
    ${tattrs}
    ${if not(tmeta(already_has_default)){
        #[derive(Default)]
    }}
    ${if tmeta(visibility) {
        ${tmeta(visibility) as token_stream}
    } else {
        ${tvis}
    }}
    struct $OPTIONAL_TYPE {
        $(
            ${fattrs}
            ${fvis} $fname: Option<$ftype>,
            // Yes, if $ftype is Option<T>, the derived struct ends up with Option<Option<T>>. That's OK.
        )
    }

    impl figment::Provider for $OPTIONAL_TYPE {
        fn metadata(&self) -> figment::Metadata {
            figment::Metadata::named("command-line").interpolater(|_profile, path| {
                use heck::ToKebabCase;
                let key = path.last().map_or("<unknown>".to_string(), |s| s.to_kebab_case());
                format!("--{key}")
            })
        }

        fn data(&self) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
            use $crate::util::insert_if_some;
            use figment::{Profile, value::{Dict, Map}};
            let mut dict = Dict::new();

            $(
                insert_if_some(&mut dict, stringify!($fname), self.${fname}.clone())?;
            )

            let mut profile_map = Map::new();
            let _ = profile_map.insert(Profile::Global, dict);

            Ok(profile_map)
        }
    }
}

#[allow(clippy::module_name_repetitions)]
pub use derive_deftly_template_Optionalify;
