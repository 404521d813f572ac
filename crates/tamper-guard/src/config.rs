//! # Guard Configuration
//!
//! Settings for a [`DigestingFactory`](crate::DigestingFactory), loadable
//! from YAML. Every field has a default, so an empty document yields the
//! default configuration: SHA-1 digests, buffered strategy, advisory lock
//! held while handles are open, buffer retained between handles.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tamper_core::DigestAlgorithm;
use thiserror::Error;

use crate::engine::DEFAULT_CHUNK_SIZE;

/// Which locator strategy the factory produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Full content buffered in memory behind the committed-read protocol.
    #[default]
    Buffered,
    /// Streams forwarded to the wrapped locator unchanged.
    Passthrough,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Buffered => "buffered",
            Self::Passthrough => "passthrough",
        })
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buffered" => Ok(Self::Buffered),
            "passthrough" => Ok(Self::Passthrough),
            other => Err(format!("unknown strategy: {other:?}")),
        }
    }
}

/// Factory configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuardConfig {
    /// Digest algorithm for snapshots.
    pub algorithm: DigestAlgorithm,
    /// Locator strategy.
    pub strategy: Strategy,
    /// Hold the wrapped resource's advisory lock while handles are open.
    pub lock_while_open: bool,
    /// Keep the buffer strongly cached after the last handle closes.
    pub retain_buffer: bool,
    /// Bytes read per chunk while digesting.
    pub read_chunk_size: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            algorithm: DigestAlgorithm::default(),
            strategy: Strategy::default(),
            lock_while_open: true,
            retain_buffer: true,
            read_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Errors while loading a [`GuardConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config {path}: {source}")]
    Read {
        /// Config file path.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The document is not a valid configuration.
    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A field holds an unusable value.
    #[error("invalid config value: {0}")]
    Invalid(String),
}

impl GuardConfig {
    /// Parse a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.read_chunk_size == 0 {
            return Err(ConfigError::Invalid("read_chunk_size must be positive".into()));
        }
        Ok(())
    }
}
