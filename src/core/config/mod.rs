//! core::config
//!
//! Configuration schema and loading.
//!
//! # Locations
//!
//! Searched in order; the first existing file wins:
//! 1. The path given with `--config`
//! 2. `$REFSYNC_CONFIG` if set
//! 3. `./refsync.toml`
//! 4. `$XDG_CONFIG_HOME/refsync/config.toml`
//! 5. `~/.refsync/config.toml`
//!
//! A missing file is not an error: defaults apply and the built-in
//! registry is used.
//!
//! # Example
//!
//! ```no_run
//! use refsync::core::config::Config;
//!
//! let config = Config::load(None).unwrap();
//! let registry = config.registry();
//! println!("{} relationship(s)", registry.relationships.len());
//! println!("Interactive: {}", config.interactive());
//! ```

pub mod schema;

pub use schema::{ConfigFile, PolicyConfig, StoreConfig};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::registry::Registry;
use crate::workflow::DecisionPolicy;

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_NAME: &str = "refsync.toml";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("config file '{0}' does not exist")]
    NotFound(PathBuf),

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Parsed file contents (defaults if no file was found)
    pub file: ConfigFile,
    /// Path the configuration was loaded from
    path: Option<PathBuf>,
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist. Otherwise the standard locations are
    /// searched and defaults apply when none exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read, parsed
    /// or validated.
    pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
        let path = match explicit {
            Some(path) if path.exists() => Some(path.to_path_buf()),
            Some(path) => return Err(ConfigError::NotFound(path.to_path_buf())),
            None => Self::search(),
        };

        let file = match &path {
            Some(path) => Self::read(path)?,
            None => ConfigFile::default(),
        };
        file.validate()?;

        Ok(Config { file, path })
    }

    /// Find the first existing config file in the standard locations.
    fn search() -> Option<PathBuf> {
        let mut candidates = Vec::new();
        if let Ok(path) = std::env::var("REFSYNC_CONFIG") {
            candidates.push(PathBuf::from(path));
        }
        candidates.push(PathBuf::from(LOCAL_CONFIG_NAME));
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            candidates.push(PathBuf::from(xdg_home).join("refsync/config.toml"));
        }
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".refsync/config.toml"));
        }
        candidates.into_iter().find(|p| p.exists())
    }

    /// Read and parse a config file.
    fn read(path: &Path) -> Result<ConfigFile, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Path the configuration was loaded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write a config file atomically.
    ///
    /// Creates parent directories if needed. Uses atomic write
    /// (write to temp file, then rename) to prevent corruption.
    pub fn write(path: &Path, file: &ConfigFile) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let contents =
            toml::to_string_pretty(file).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let temp_path = path.with_extension("toml.tmp");
        let mut temp = fs::File::create(&temp_path).map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;
        temp.write_all(contents.as_bytes())
            .map_err(|e| ConfigError::WriteError {
                path: temp_path.clone(),
                source: e,
            })?;
        temp.sync_all().map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        fs::rename(&temp_path, path).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    // =========================================================================
    // Accessor methods
    // =========================================================================

    /// The relationship registry in effect.
    pub fn registry(&self) -> Registry {
        self.file.registry()
    }

    /// Store settings; defaults to a file store at `dataset.json`.
    pub fn store(&self) -> StoreConfig {
        self.file.store.clone().unwrap_or_else(|| StoreConfig {
            kind: Some("file".into()),
            path: Some(PathBuf::from("dataset.json")),
            ..StoreConfig::default()
        })
    }

    /// Decision order for the publish workflow.
    pub fn policy(&self) -> DecisionPolicy {
        self.file
            .policy
            .as_ref()
            .and_then(|p| p.order.clone())
            .map(DecisionPolicy::new)
            .unwrap_or_default()
    }

    /// Check if interactive mode is enabled by default.
    ///
    /// Defaults to `true` if not configured.
    pub fn interactive(&self) -> bool {
        self.file.interactive.unwrap_or(true)
    }
}
