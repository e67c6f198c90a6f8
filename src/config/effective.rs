use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{ConfigError, ConfigSource, Setting};

/// A resolved value together with the source that supplied it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub value: String,
    pub source: ConfigSource,
}

/// A settings file the resolver looked at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsultedFile {
    pub source: ConfigSource,
    pub path: PathBuf,
    pub exists: bool,
}

/// The merged configuration for one invocation. Built once by [super::resolve] and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    values: BTreeMap<Setting, Resolved>,
    consulted_files: Vec<ConsultedFile>,
    warnings: Vec<String>,
}

impl EffectiveConfig {
    pub(super) fn new(
        values: BTreeMap<Setting, Resolved>,
        consulted_files: Vec<ConsultedFile>,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            values,
            consulted_files,
            warnings,
        }
    }

    /// The value as resolved, including empty strings
    pub fn get(&self, setting: Setting) -> Option<&str> {
        self.values.get(&setting).map(|resolved| resolved.value.as_str())
    }

    /// Like [Self::get], but treats an empty value as unset
    pub fn get_non_empty(&self, setting: Setting) -> Option<&str> {
        self.get(setting).filter(|value| !value.trim().is_empty())
    }

    pub fn resolved(&self, setting: Setting) -> Option<&Resolved> {
        self.values.get(&setting)
    }

    pub fn source(&self, setting: Setting) -> Option<ConfigSource> {
        self.values.get(&setting).map(|resolved| resolved.source)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Setting, &Resolved)> {
        self.values.iter().map(|(setting, resolved)| (*setting, resolved))
    }

    pub fn consulted_files(&self) -> &[ConsultedFile] {
        &self.consulted_files
    }

    /// Problems found while reading the settings files, to be logged once logging is up
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Returns the non-empty value or a [ConfigError::Missing] naming the sources checked
    pub fn require(&self, setting: Setting) -> Result<&str, ConfigError> {
        self.get_non_empty(setting)
            .ok_or_else(|| ConfigError::Missing {
                setting,
                checked: self.checked_sources(),
            })
    }

    /// Human readable list of the places a missing value could have come from
    pub fn checked_sources(&self) -> String {
        let mut checked = vec![
            ConfigSource::Cli.to_string(),
            ConfigSource::Environment.to_string(),
        ];
        checked.extend(
            self.consulted_files
                .iter()
                .map(|file| file.path.display().to_string()),
        );
        checked.join(", ")
    }
}
