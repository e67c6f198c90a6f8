use std::fmt::{Display, Formatter};
use std::str::FromStr;

use super::ConfigError;

/// Every configuration key yapcli understands.
///
/// The declaration order is the canonical order used when writing settings files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Setting {
    ClientId,
    Environment,
    CountryCodes,
    Secret,
    SandboxSecret,
    ProductionSecret,
    Products,
    RedirectUri,
    SecretsDir,
    LogDir,
    OutputDir,
    DirMode,
    LogLevel,
    DaysRequested,
}

impl Setting {
    pub const ALL: &'static [Setting] = &[
        Setting::ClientId,
        Setting::Environment,
        Setting::CountryCodes,
        Setting::Secret,
        Setting::SandboxSecret,
        Setting::ProductionSecret,
        Setting::Products,
        Setting::RedirectUri,
        Setting::SecretsDir,
        Setting::LogDir,
        Setting::OutputDir,
        Setting::DirMode,
        Setting::LogLevel,
        Setting::DaysRequested,
    ];

    /// Name of the key in the process environment and in settings files
    pub fn key(self) -> &'static str {
        match self {
            Setting::ClientId => "PLAID_CLIENT_ID",
            Setting::Environment => "PLAID_ENV",
            Setting::CountryCodes => "PLAID_COUNTRY_CODES",
            Setting::Secret => "PLAID_SECRET",
            Setting::SandboxSecret => "PLAID_SANDBOX_SECRET",
            Setting::ProductionSecret => "PLAID_PRODUCTION_SECRET",
            Setting::Products => "PLAID_PRODUCTS",
            Setting::RedirectUri => "PLAID_REDIRECT_URI",
            Setting::SecretsDir => "PLAID_SECRETS_DIR",
            Setting::LogDir => "YAPCLI_LOG_DIR",
            Setting::OutputDir => "YAPCLI_OUTPUT_DIR",
            Setting::DirMode => "YAPCLI_DIR_MODE",
            Setting::LogLevel => "YAPCLI_LOG_LEVEL",
            Setting::DaysRequested => "YAPCLI_DAYS_REQUESTED",
        }
    }

    pub fn from_key(key: &str) -> Option<Setting> {
        Self::ALL.iter().copied().find(|setting| setting.key() == key)
    }

    /// Values of sensitive settings are masked whenever they are displayed
    pub fn is_sensitive(self) -> bool {
        matches!(
            self,
            Setting::Secret | Setting::SandboxSecret | Setting::ProductionSecret
        )
    }
}

impl Display for Setting {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Setting {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_uppercase();
        Setting::from_key(&key).ok_or_else(|| ConfigError::UnknownKey { key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_roundtrip() {
        for setting in Setting::ALL {
            assert_eq!(Some(*setting), Setting::from_key(setting.key()));
        }
    }

    #[test]
    fn all_is_in_canonical_order() {
        let mut sorted = Setting::ALL.to_vec();
        sorted.sort();
        assert_eq!(Setting::ALL, sorted.as_slice());
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Setting::ClientId, "plaid_client_id".parse().unwrap());
        assert_eq!(Setting::DirMode, " YAPCLI_DIR_MODE ".parse().unwrap());
    }

    #[test]
    fn parse_unknown_key() {
        let err = "NOT_A_KEY".parse::<Setting>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey { key } if key == "NOT_A_KEY"));
    }
}
