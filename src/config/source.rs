use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use super::Setting;

/// Where a configuration value came from.
///
/// Variants are declared from lowest to highest precedence, so the derived `Ord`
/// is the precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigSource {
    /// Built-in defaults, including development checkout detection
    Defaults,
    /// `.env` in the platform config directory
    PlatformFile,
    /// `.env` in the working directory
    CwdFile,
    /// Process environment as it was when yapcli started
    Environment,
    /// Command line options
    Cli,
}

impl ConfigSource {
    /// Highest precedence first
    pub const BY_PRECEDENCE: &'static [ConfigSource] = &[
        ConfigSource::Cli,
        ConfigSource::Environment,
        ConfigSource::CwdFile,
        ConfigSource::PlatformFile,
        ConfigSource::Defaults,
    ];
}

impl Display for ConfigSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConfigSource::Defaults => "default",
            ConfigSource::PlatformFile => "platform settings file",
            ConfigSource::CwdFile => "working directory settings file",
            ConfigSource::Environment => "environment",
            ConfigSource::Cli => "command line",
        };
        f.write_str(label)
    }
}

/// The flat key/value mapping contributed by one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLayer {
    pub source: ConfigSource,
    pub values: BTreeMap<Setting, String>,
}

impl SourceLayer {
    pub fn new(source: ConfigSource) -> Self {
        Self {
            source,
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, setting: Setting, value: impl Into<String>) -> Self {
        self.values.insert(setting, value.into());
        self
    }
}
