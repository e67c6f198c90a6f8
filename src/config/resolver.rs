//! Merges command line options, the process environment and the settings files
//! into one [EffectiveConfig].
//!
//! Precedence, highest first:
//!
//! 1. Command line options
//! 2. Process environment
//! 3. `.env` in the working directory
//! 4. `.env` in the platform config directory
//! 5. Built-in defaults
//!
//! A key set to an empty string still counts as set and hides lower layers.

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{
    settings_file, ConfigSource, ConsultedFile, EffectiveConfig, LayoutRoots, Resolved, Setting,
    SourceLayer,
};

/// Everything the resolver reads, made explicit so resolution can be tested
/// without touching the real environment.
#[derive(Debug, Clone)]
pub struct ResolverInputs {
    pub cli: BTreeMap<Setting, String>,
    pub environment: BTreeMap<Setting, String>,
    pub cwd_settings_file: PathBuf,
    pub platform_settings_file: PathBuf,
    pub defaults: BTreeMap<Setting, String>,
}

impl ResolverInputs {
    /// Snapshot the process environment for the known settings
    pub fn from_process(cli: BTreeMap<Setting, String>, roots: &LayoutRoots) -> Self {
        let environment = Setting::ALL
            .iter()
            .filter_map(|setting| {
                std::env::var(setting.key())
                    .ok()
                    .map(|value| (*setting, value))
            })
            .collect();
        Self {
            cli,
            environment,
            cwd_settings_file: roots.cwd_settings_file(),
            platform_settings_file: roots.platform_settings_file(),
            defaults: implicit_defaults(roots),
        }
    }
}

/// The lowest layer. Running from a development checkout keeps all state inside the
/// checkout, an installed binary uses the platform directories.
pub fn implicit_defaults(roots: &LayoutRoots) -> BTreeMap<Setting, String> {
    let mode = if roots.development_checkout {
        "cwd"
    } else {
        "platform"
    };
    BTreeMap::from([(Setting::DirMode, mode.to_string())])
}

/// Read the settings files and merge all layers
pub fn resolve(inputs: &ResolverInputs) -> EffectiveConfig {
    let consulted_files = vec![
        ConsultedFile {
            source: ConfigSource::CwdFile,
            exists: inputs.cwd_settings_file.exists(),
            path: inputs.cwd_settings_file.clone(),
        },
        ConsultedFile {
            source: ConfigSource::PlatformFile,
            exists: inputs.platform_settings_file.exists(),
            path: inputs.platform_settings_file.clone(),
        },
    ];

    let mut warnings = vec![];
    let layers = [
        SourceLayer {
            source: ConfigSource::Defaults,
            values: inputs.defaults.clone(),
        },
        settings_file::read_layer(
            &inputs.platform_settings_file,
            ConfigSource::PlatformFile,
            &mut warnings,
        ),
        settings_file::read_layer(&inputs.cwd_settings_file, ConfigSource::CwdFile, &mut warnings),
        SourceLayer {
            source: ConfigSource::Environment,
            values: inputs.environment.clone(),
        },
        SourceLayer {
            source: ConfigSource::Cli,
            values: inputs.cli.clone(),
        },
    ];

    EffectiveConfig::new(merge(layers), consulted_files, warnings)
}

/// Merge layers without reading any files. Layers may be passed in any order.
pub fn merge_layers(layers: impl IntoIterator<Item = SourceLayer>) -> EffectiveConfig {
    EffectiveConfig::new(merge(layers), vec![], vec![])
}

fn merge(layers: impl IntoIterator<Item = SourceLayer>) -> BTreeMap<Setting, Resolved> {
    let mut layers: Vec<SourceLayer> = layers.into_iter().collect();
    // Walk from lowest to highest precedence, higher layers overwrite
    layers.sort_by_key(|layer| layer.source);

    let mut result = BTreeMap::new();
    for layer in layers {
        for (setting, value) in layer.values {
            result.insert(
                setting,
                Resolved {
                    value,
                    source: layer.source,
                },
            );
        }
    }
    result
}
