//! Configuration file loading for engine matches.
//!
//! Settings that rarely change between matches (search limits, engine
//! options, timeouts) live in a TOML file; the command line overrides them.

use crate::client::EngineSettings;
use crate::game_runner::RunnerConfig;
use crate::record::RecordFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use uci::SearchOptions;

/// Errors that can occur when loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse the configuration file as valid TOML.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    /// The `go` string is not valid search options.
    #[error("Invalid search options '{options}': {source}")]
    InvalidSearch {
        options: String,
        #[source]
        source: uci::UciError,
    },
    /// A value is out of range.
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Match configuration.
///
/// Uses `versus.toml` in the current directory by default.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct VersusConfig {
    /// Arguments of every `go` command, in protocol syntax.
    /// Defaults to "movetime 200".
    #[serde(default = "default_go")]
    pub go: String,
    /// Plies after which a game is abandoned. Defaults to 500.
    #[serde(default = "default_max_plies")]
    pub max_plies: usize,
    /// Number of concurrent games. Defaults to the available parallelism.
    #[serde(default)]
    pub workers: Option<usize>,
    /// Bound on `uciok`/`readyok` at startup, in milliseconds.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Bounded wait for an engine to exit after `quit`, in milliseconds.
    #[serde(default = "default_quit_timeout_ms")]
    pub quit_timeout_ms: u64,
    /// Format of the game log.
    #[serde(default)]
    pub format: RecordFormat,
    /// Sent to every engine as `setoption` after the handshake.
    #[serde(default = "default_engine_options")]
    pub engine_options: BTreeMap<String, String>,
}

fn default_go() -> String {
    "movetime 200".to_string()
}

fn default_max_plies() -> usize {
    500
}

fn default_handshake_timeout_ms() -> u64 {
    30_000
}

fn default_quit_timeout_ms() -> u64 {
    1_000
}

fn default_engine_options() -> BTreeMap<String, String> {
    BTreeMap::from([("Hash".to_string(), "64".to_string())])
}

impl Default for VersusConfig {
    fn default() -> Self {
        Self {
            go: default_go(),
            max_plies: default_max_plies(),
            workers: None,
            handshake_timeout_ms: default_handshake_timeout_ms(),
            quit_timeout_ms: default_quit_timeout_ms(),
            format: RecordFormat::default(),
            engine_options: default_engine_options(),
        }
    }
}

impl VersusConfig {
    /// Loads the configuration.
    ///
    /// An explicit `path` must exist. Without one, [`Self::config_path()`]
    /// is read if present and the defaults are used otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadError`] if the file cannot be read,
    /// [`ConfigError::ParseError`] for invalid TOML, and a validation error
    /// for out-of-range values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_toml(&std::fs::read_to_string(path)?)?,
            None => {
                let default_path = Self::config_path();
                if default_path.exists() {
                    Self::from_toml(&std::fs::read_to_string(&default_path)?)?
                } else {
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document without validating it.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Returns the path to the default configuration file.
    pub fn config_path() -> PathBuf {
        PathBuf::from("versus.toml")
    }

    /// Checks values that deserialize fine but cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.search_options()?;
        if self.workers == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.handshake_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "handshake_timeout_ms",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// The `go` string, decoded.
    pub fn search_options(&self) -> Result<SearchOptions, ConfigError> {
        self.go
            .parse()
            .map_err(|source| ConfigError::InvalidSearch {
                options: self.go.clone(),
                source,
            })
    }

    /// Worker count, falling back to the available parallelism.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            quit_timeout: Duration::from_millis(self.quit_timeout_ms),
            options: self.engine_options.clone(),
        }
    }

    pub fn runner_config(&self) -> Result<RunnerConfig, ConfigError> {
        Ok(RunnerConfig {
            search: self.search_options()?,
            max_plies: self.max_plies,
        })
    }
}
