use std::{
    fs,
    path::{Path, PathBuf},
    sync::{LazyLock, RwLock},
    time::Duration,
};

use bolt_utils::path::{resolve_path, xdg_cache_home, xdg_config_home};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, Result};

const DEFAULT_FETCH_TIMEOUT: u64 = 30;

/// Application configuration, read from `config.toml`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory of the local source archive cache.
    /// Default: $XDG_CACHE_HOME/bolt/sources
    pub source_cache: Option<String>,

    /// Base URL missing source archives are downloaded from.
    pub source_mirror: Option<String>,

    /// Overrides the directories searched for build helper scripts.
    pub helper_dirs: Option<Vec<String>>,

    /// Connection timeout for downloads, in seconds.
    /// Default: 30
    pub fetch_timeout: Option<u64>,

    /// User agent sent with HTTP requests.
    pub user_agent: Option<String>,
}

pub static CONFIG: LazyLock<RwLock<Option<Config>>> = LazyLock::new(|| RwLock::new(None));

pub static CONFIG_PATH: LazyLock<RwLock<PathBuf>> = LazyLock::new(|| {
    RwLock::new(match std::env::var("BOLT_CONFIG") {
        Ok(path_str) => PathBuf::from(path_str),
        Err(_) => xdg_config_home().join("bolt").join("config.toml"),
    })
});

/// Loads the configuration from [`CONFIG_PATH`] into the global slot.
pub fn init() -> Result<()> {
    let path = CONFIG_PATH.read().unwrap().clone();
    let config = Config::load(&path)?;
    *CONFIG.write().unwrap() = Some(config);
    Ok(())
}

/// Returns the loaded configuration, or defaults when [`init`] was never called.
pub fn get_config() -> Config {
    CONFIG.read().unwrap().clone().unwrap_or_default()
}

impl Config {
    /// Reads and validates a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("config file {} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if let Some(mirror) = &self.source_mirror {
            if !(mirror.starts_with("http://") || mirror.starts_with("https://")) {
                return Err(ConfigError::InvalidMirror(mirror.clone()));
            }
        }

        if self.fetch_timeout == Some(0) {
            return Err(ConfigError::InvalidTimeout);
        }

        Ok(())
    }

    pub fn source_cache_path(&self) -> Result<PathBuf> {
        match &self.source_cache {
            Some(path) => Ok(resolve_path(path)?),
            None => Ok(xdg_cache_home().join("bolt").join("sources")),
        }
    }

    /// Helper directories from the config, `None` when the built-in list applies.
    pub fn helper_dirs(&self) -> Result<Option<Vec<PathBuf>>> {
        self.helper_dirs
            .as_ref()
            .map(|dirs| {
                dirs.iter()
                    .map(|dir| resolve_path(dir).map_err(ConfigError::from))
                    .collect()
            })
            .transpose()
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout.unwrap_or(DEFAULT_FETCH_TIMEOUT))
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
