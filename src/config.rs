use std::{fs, io, path::Path, path::PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::{cache::DEFAULT_DELIMITER, eof_scanner::DEFAULT_CHUNK_SIZE};

/// Name of the cache file used when no explicit path is given
pub const DEFAULT_CACHE_FILENAME: &str = ".logcut";

/// Possible errors that could happen while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Tunables of the reader and its cache.
///
/// Every field has a default, so a config file only needs the values it changes:
///
/// ```toml
/// cache_delimiter = "%%"
/// chunk_size = 4096
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Separator of fields in cache records
    pub cache_delimiter: String,
    /// Bytes read at once while searching for the last line of a file
    pub chunk_size: usize,
    /// File name of the cache, looked up in working and home directories
    pub cache_filename: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_delimiter: DEFAULT_DELIMITER.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            cache_filename: DEFAULT_CACHE_FILENAME.to_string(),
        }
    }
}

impl Config {
    /// Read TOML config from `path` and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_delimiter.is_empty() {
            return Err(ConfigError::Invalid("cache delimiter is empty".into()));
        }
        if self.cache_delimiter.contains('\n') {
            return Err(ConfigError::Invalid(
                "cache delimiter contains a line break".into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk size must be positive".into()));
        }
        if self.cache_filename.is_empty() {
            return Err(ConfigError::Invalid("cache filename is empty".into()));
        }
        Ok(())
    }
}
