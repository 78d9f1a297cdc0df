//! World configuration

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid world config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Tunables for a [`World`](crate::World).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// First value handed out by the id counter.
    pub first_id: u64,
    /// Reuse an existing archetype when the same structural query is derived
    /// twice from the same bucket.
    pub share_archetypes: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            first_id: 0,
            share_archetypes: true,
        }
    }
}

impl WorldConfig {
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(source)?)
    }

    /// Read a JSON config file. Missing fields fall back to their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&source)
    }

    pub fn to_json_string(&self) -> String {
        // A struct of plain integers and booleans always serializes.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
