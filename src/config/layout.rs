use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use super::{ConfigError, EffectiveConfig, Environment, Setting};

pub const APP_NAME: &str = "yapcli";
const SETTINGS_FILE_NAME: &str = ".env";
const SANDBOX_SEGMENT: &str = "sandbox";

/// The filesystem facts directory resolution depends on. Captured once at startup
/// so that the layout itself can be computed without touching global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutRoots {
    pub working_dir: PathBuf,
    /// Per-user application config directory, e.g. `~/.config/yapcli`
    pub app_config_dir: PathBuf,
    /// Whether yapcli runs from inside its own source checkout
    pub development_checkout: bool,
}

impl LayoutRoots {
    pub fn detect() -> Result<Self> {
        let working_dir =
            std::env::current_dir().context("Failed to determine the working directory")?;
        let app_config_dir = dirs::config_dir()
            .map(|dir| dir.join(APP_NAME))
            .or_else(|| dirs::home_dir().map(|home| home.join(format!(".{APP_NAME}"))))
            .unwrap_or_else(|| working_dir.join(format!(".{APP_NAME}")));
        let development_checkout = working_dir == Path::new(env!("CARGO_MANIFEST_DIR"));
        Ok(Self {
            working_dir,
            app_config_dir,
            development_checkout,
        })
    }

    pub fn cwd_settings_file(&self) -> PathBuf {
        self.working_dir.join(SETTINGS_FILE_NAME)
    }

    pub fn platform_settings_file(&self) -> PathBuf {
        self.app_config_dir.join(SETTINGS_FILE_NAME)
    }

    /// Where settings and secrets live in the given mode
    pub fn config_root(&self, mode: DirectoryMode) -> PathBuf {
        match mode {
            DirectoryMode::Cwd => self.working_dir.clone(),
            DirectoryMode::PlatformDefault => self.app_config_dir.clone(),
        }
    }

    pub fn settings_file_for(&self, mode: DirectoryMode) -> PathBuf {
        self.config_root(mode).join(SETTINGS_FILE_NAME)
    }
}

/// Whether directories are relative to the working directory or to the
/// platform's per-user application directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryMode {
    Cwd,
    PlatformDefault,
}

impl DirectoryMode {
    pub fn from_config(config: &EffectiveConfig) -> Result<DirectoryMode, ConfigError> {
        let Some(value) = config.get_non_empty(Setting::DirMode) else {
            return Ok(DirectoryMode::PlatformDefault);
        };
        DirectoryMode::parse(value).ok_or_else(|| ConfigError::InvalidValue {
            setting: Setting::DirMode,
            value: value.to_string(),
            expected: "one of: cwd, platform",
        })
    }

    pub fn parse(value: &str) -> Option<DirectoryMode> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cwd" => Some(DirectoryMode::Cwd),
            "platform" | "platform_default" => Some(DirectoryMode::PlatformDefault),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DirectoryMode::Cwd => "cwd",
            DirectoryMode::PlatformDefault => "platform",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryLayout {
    pub mode: DirectoryMode,
    pub environment: Environment,
    pub config_root: PathBuf,
    pub secrets_dir: PathBuf,
    pub log_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl DirectoryLayout {
    pub fn resolve(
        config: &EffectiveConfig,
        roots: &LayoutRoots,
    ) -> Result<DirectoryLayout, ConfigError> {
        let mode = DirectoryMode::from_config(config)?;
        let environment = Environment::from_config(config)?;

        let config_root = roots.config_root(mode);
        // Exports always land where the user is standing
        let output_base = roots.working_dir.join("output");

        let dir = |setting: Setting, default_base: PathBuf| {
            let base = config
                .get_non_empty(setting)
                .map(|value| roots.working_dir.join(value))
                .unwrap_or(default_base);
            match environment {
                Environment::Sandbox => base.join(SANDBOX_SEGMENT),
                Environment::Production => base,
            }
        };

        Ok(DirectoryLayout {
            mode,
            environment,
            secrets_dir: dir(Setting::SecretsDir, config_root.join("secrets")),
            log_dir: dir(Setting::LogDir, config_root.join("logs")),
            output_dir: dir(Setting::OutputDir, output_base),
            config_root,
        })
    }

    /// The settings file that `config set` and `config init` write to
    pub fn settings_file(&self) -> PathBuf {
        self.config_root.join(SETTINGS_FILE_NAME)
    }
}
