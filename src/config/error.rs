use std::path::PathBuf;
use std::sync::Arc;

use super::Setting;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration value {setting} (checked: {checked})")]
    Missing { setting: Setting, checked: String },

    #[error("Missing configuration value, expected one of {} (checked: {checked})", join_settings(.settings))]
    MissingOneOf {
        settings: Vec<Setting>,
        checked: String,
    },

    #[error("Invalid value {value:?} for {setting}, expected {expected}")]
    InvalidValue {
        setting: Setting,
        value: String,
        expected: &'static str,
    },

    #[error("Unknown configuration key {key}")]
    UnknownKey { key: String },

    #[error("Failed to write settings file {path}: {source}")]
    SettingsFile {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },
}

fn join_settings(settings: &[Setting]) -> String {
    settings
        .iter()
        .map(|setting| setting.key())
        .collect::<Vec<_>>()
        .join(", ")
}
