//! Storage providers.
//!
//! A [`Provider`] knows how one physical format stores an index and its
//! payloads. The [`FileSystem`](crate::FileSystem) engine owns the tree and
//! drives the provider through this trait:
//!
//! - **Open**: [`Provider::read_index`] when a physical root is assigned.
//! - **Mount**: [`Provider::load`] for every entry materialized from the index.
//! - **Read/write**: [`Provider::decode`] / [`Provider::encode`].
//! - **Save**: `save_initialize` → `save_index` → `save_file_data`* →
//!   `save_finalize` (the last one runs even when an earlier hook failed).

mod folder;
mod memory;
mod pack;

use std::path::Path;

use crate::codec::Compression;
use crate::config::VfsConfig;
use crate::error::VfsResult;
use crate::index::IndexDocument;
use crate::types::FileEntry;

pub use folder::FolderProvider;
pub use memory::{MemoryProvider, MemoryStore};
pub use pack::PackProvider;

/// Settings handed to provider factories.
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    /// Compression for providers that support it; `None` keeps the
    /// provider's default.
    pub compression: Option<Compression>,
    /// Deflate level, 0-9.
    pub compression_level: u32,
    /// Password for encrypting providers.
    pub password: Option<String>,
    /// Index file name for folder roots; `None` keeps the default.
    pub index_file: Option<String>,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            compression: None,
            compression_level: PackProvider::DEFAULT_LEVEL,
            password: None,
            index_file: None,
        }
    }
}

impl ProviderOptions {
    /// Options from a loaded configuration. The password is read from the
    /// environment variable the config names.
    pub fn from_config(config: &VfsConfig) -> Self {
        Self {
            compression: None,
            compression_level: config.compression_level,
            password: config.password(),
            index_file: Some(config.index_file.clone()),
        }
    }

    /// Set the compression.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    /// Set the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

/// Physical storage strategy for one file system instance.
///
/// Methods that only inspect state take `&self` so reads can run under a
/// shared lock; the save hooks take `&mut self` because they hold an open
/// writer between calls.
pub trait Provider: Send + Sync {
    // ========================================================================
    // Identity
    // ========================================================================

    /// Registry name, e.g. `"folder"`.
    fn name(&self) -> &str;

    /// Index header tag this provider reads and writes.
    fn header(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str {
        self.name()
    }

    // ========================================================================
    // Opening and mounting
    // ========================================================================

    /// Open the physical root and parse its index.
    ///
    /// Remembers the root so later `load`/`decode` calls can reach payloads.
    fn read_index(&mut self, root: &Path) -> VfsResult<IndexDocument>;

    /// Re-point the provider at `root` without reading anything. Called
    /// after a successful save so lazy reads follow the new location.
    fn set_root(&mut self, root: &Path);

    /// Eagerly load an entry's stored bytes into `entry.data`.
    ///
    /// Returns `true` if bytes were transferred. Providers that read lazily
    /// return `false` and leave `data` empty.
    fn load(&self, full_path: &str, entry: &mut FileEntry) -> VfsResult<bool>;

    // ========================================================================
    // Reading and writing
    // ========================================================================

    /// Reject virtual paths that collide with the provider's own files.
    ///
    /// Checked before a file enters the tree and again before a save.
    fn validate_path(&self, full_path: &str) -> VfsResult<()> {
        let _ = full_path;
        Ok(())
    }

    /// Return the decoded bytes of an entry.
    ///
    /// Uses `entry.data` when present, otherwise re-reads the stored bytes
    /// from physical storage.
    fn decode(&self, full_path: &str, entry: &FileEntry) -> VfsResult<Vec<u8>>;

    /// Encode raw bytes into a detached entry with sizes, flags and stored
    /// bytes filled in. The offset is assigned on save.
    fn encode(&self, file_name: &str, data: &[u8]) -> VfsResult<FileEntry>;

    // ========================================================================
    // Saving
    // ========================================================================

    /// Prepare `root` for writing.
    fn save_initialize(&mut self, root: &Path) -> VfsResult<()> {
        let _ = root;
        Ok(())
    }

    /// Persist the index document.
    fn save_index(&mut self, root: &Path, index: &IndexDocument) -> VfsResult<()>;

    /// Persist one entry's stored bytes. Called in offset order.
    fn save_file_data(&mut self, root: &Path, full_path: &str, entry: &FileEntry)
        -> VfsResult<()>;

    /// Release whatever `save_initialize` acquired. Always called.
    fn save_finalize(&mut self) -> VfsResult<()> {
        Ok(())
    }
}

/// Stored bytes of an entry, or `MissingData`.
pub(crate) fn stored_bytes<'a>(full_path: &str, entry: &'a FileEntry) -> VfsResult<&'a [u8]> {
    entry
        .data
        .as_deref()
        .ok_or_else(|| crate::error::VfsError::MissingData(full_path.to_string()))
}
