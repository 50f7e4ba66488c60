use super::ui::Theme;
use clap::ValueEnum;
use planscope::ViewOptions;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Settings read from the CLI's TOML file. Command-line flags win over it.
#[derive(Debug, Default)]
pub struct CliConfig {
    path: Option<PathBuf>,
    theme: Option<Theme>,
    log_level: Option<String>,
    view: ViewOptions,
}

impl CliConfig {
    /// Loads `explicit`, or the per-user default when none was given.
    /// A missing file yields defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let data = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            _ => RawConfig::default(),
        };
        let theme = match data.theme.as_deref() {
            Some(value) => Some(Theme::from_str(value, true).map_err(|_| {
                ConfigError::InvalidTheme {
                    value: value.to_string(),
                }
            })?),
            None => None,
        };
        Ok(Self {
            path,
            theme,
            log_level: data.log_level,
            view: data.view,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn theme(&self) -> Option<Theme> {
        self.theme
    }

    pub fn log_level(&self) -> Option<&str> {
        self.log_level.as_deref()
    }

    pub fn view(&self) -> &ViewOptions {
        &self.view
    }
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    theme: Option<String>,
    log_level: Option<String>,
    view: ViewOptions,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read CLI config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse CLI config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("theme '{value}' is invalid; expected auto, light, dark, or plain")]
    InvalidTheme { value: String },
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("planscope").join("config.toml"))
}
