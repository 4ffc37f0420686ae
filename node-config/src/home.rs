//! Node and application configuration read from a node home directory.
//!
//! Only the keys the sync session depends on are modelled. Missing files and
//! missing keys fall back to the node's own defaults.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

pub const NODE_CONFIG_FILE: &str = "config/config.toml";
pub const APP_CONFIG_FILE: &str = "config/app.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Subset of `config/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub db_backend: String,
    /// Data directory, relative to the home directory unless absolute.
    pub db_dir: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            db_backend: "goleveldb".to_string(),
            db_dir: PathBuf::from("data"),
        }
    }
}

/// Subset of `config/app.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AppConfig {
    pub pruning: String,
    pub min_retain_blocks: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pruning: "default".to_string(),
            min_retain_blocks: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomeConfig {
    pub home: PathBuf,
    pub node: NodeConfig,
    pub app: AppConfig,
}

impl HomeConfig {
    pub fn load(home: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let home = home.as_ref().to_path_buf();
        let node = load_or_default(&home.join(NODE_CONFIG_FILE))?;
        let app = load_or_default(&home.join(APP_CONFIG_FILE))?;

        Ok(Self { home, node, app })
    }

    /// Absolute location of the node's data directory.
    pub fn data_dir(&self) -> PathBuf {
        if self.node.db_dir.is_absolute() {
            self.node.db_dir.clone()
        } else {
            self.home.join(&self.node.db_dir)
        }
    }
}

fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Config file absent, using defaults");
            return Ok(T::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
