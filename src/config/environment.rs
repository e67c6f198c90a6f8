use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use super::{ConfigError, EffectiveConfig, Setting};

/// Which Plaid environment yapcli talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Sandbox,
    Production,
}

impl Environment {
    /// An explicit `PLAID_ENV` wins. Without one, having a production secret means
    /// production, everything else means sandbox.
    pub fn from_config(config: &EffectiveConfig) -> Result<Environment, ConfigError> {
        if let Some(value) = config.get_non_empty(Setting::Environment) {
            return Environment::parse(value).ok_or_else(|| ConfigError::InvalidValue {
                setting: Setting::Environment,
                value: value.to_string(),
                expected: "one of: sandbox, production",
            });
        }
        if config.get_non_empty(Setting::ProductionSecret).is_some() {
            Ok(Environment::Production)
        } else {
            Ok(Environment::Sandbox)
        }
    }

    pub fn parse(value: &str) -> Option<Environment> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Some(Environment::Sandbox),
            "production" => Some(Environment::Production),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Sandbox => "sandbox",
            Environment::Production => "production",
        }
    }

    /// The environment specific secret setting
    pub fn secret_setting(self) -> Setting {
        match self {
            Environment::Sandbox => Setting::SandboxSecret,
            Environment::Production => Setting::ProductionSecret,
        }
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
