//! RON configuration.
//!
//! ```ron
//! (
//!     provider: "pack-deflate",
//!     compression_level: 9,
//!     password_env: Some("STRATAFS_PASSWORD"),
//!     index_file: "filesystem.index",
//! )
//! ```
//!
//! Every field is optional; missing ones take the [`Default`] values.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::provider::{FolderProvider, PackProvider};

/// Environment variable consulted for archive passwords by default.
pub const DEFAULT_PASSWORD_ENV: &str = "STRATAFS_PASSWORD";

/// Error type for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// File system defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    /// Provider used when none is named explicitly.
    pub provider: String,
    /// Deflate level, 0-9.
    pub compression_level: u32,
    /// Environment variable holding the archive password, if any.
    pub password_env: Option<String>,
    /// Index file name inside folder roots.
    pub index_file: String,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            provider: FolderProvider::NAME.to_string(),
            compression_level: PackProvider::DEFAULT_LEVEL,
            password_env: Some(DEFAULT_PASSWORD_ENV.to_string()),
            index_file: FolderProvider::INDEX_FILE.to_string(),
        }
    }
}

impl VfsConfig {
    /// Read and parse a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }

    /// Parse RON text.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// The password from the configured environment variable. Unset and
    /// empty variables both yield `None`.
    pub fn password(&self) -> Option<String> {
        let var = self.password_env.as_deref()?;
        std::env::var(var).ok().filter(|p| !p.is_empty())
    }
}
