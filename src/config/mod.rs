use std::path::PathBuf;

mod effective;
mod environment;
mod error;
mod layout;
mod resolver;
mod setting;
pub mod settings_file;
mod source;

pub use effective::{ConsultedFile, EffectiveConfig, Resolved};
pub use environment::Environment;
pub use error::ConfigError;
pub use layout::{DirectoryLayout, DirectoryMode, LayoutRoots, APP_NAME};
pub use resolver::{implicit_defaults, merge_layers, resolve, ResolverInputs};
pub use setting::Setting;
pub use source::{ConfigSource, SourceLayer};

/// The result of startup configuration: resolved once, then passed around read-only.
///
/// An invalid directory mode or environment doesn't fail resolution. Commands that
/// need directories get the error from [Context::layout], the `config` commands use
/// [Context::settings_file] and keep working so the value can be fixed.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: EffectiveConfig,
    layout: Result<DirectoryLayout, ConfigError>,
    pub roots: LayoutRoots,
}

impl Context {
    pub fn resolve(inputs: &ResolverInputs, roots: LayoutRoots) -> Self {
        let config = resolve(inputs);
        let layout = DirectoryLayout::resolve(&config, &roots);
        Self {
            config,
            layout,
            roots,
        }
    }

    pub fn layout(&self) -> Result<&DirectoryLayout, ConfigError> {
        self.layout.as_ref().map_err(Clone::clone)
    }

    /// The settings file `config set` and `config init` write to.
    ///
    /// Without a valid layout this is the file in the directory mode's root, or, if
    /// the mode itself is invalid, the settings file that set it.
    pub fn settings_file(&self) -> PathBuf {
        if let Ok(layout) = &self.layout {
            return layout.settings_file();
        }
        match DirectoryMode::from_config(&self.config) {
            Ok(mode) => self.roots.settings_file_for(mode),
            Err(_) if self.config.source(Setting::DirMode) == Some(ConfigSource::CwdFile) => {
                self.roots.cwd_settings_file()
            }
            Err(_) => self.roots.platform_settings_file(),
        }
    }
}
