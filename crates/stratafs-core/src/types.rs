//! Core VFS types.
//!
//! [`FileEntry`] is the record providers produce and consume. Callers of
//! [`FileSystem`](crate::FileSystem) never borrow entries out of the tree;
//! they get [`FileInfo`] snapshots and [`DirEntry`] listings instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::path;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// One logical file in the tree.
///
/// `data` holds the *stored* bytes (after the provider's encode step), so
/// its length matches `compressed_size` once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    /// File name without the extension.
    pub base_name: String,
    /// Extension including its leading dot, or empty.
    pub extension: String,
    /// Byte offset within the provider's payload region.
    pub offset: u64,
    /// Decoded size in bytes.
    pub size: u64,
    /// Stored size in bytes; equals `size` when stored raw.
    pub compressed_size: u64,
    /// Last modification time.
    pub timestamp: DateTime<Utc>,
    /// Whether the stored bytes are encrypted.
    pub is_encrypted: bool,
    /// Free-form comment.
    pub comment: String,
    /// Stored bytes, absent until loaded.
    pub data: Option<Vec<u8>>,
}

impl FileEntry {
    /// Create an unloaded entry for `file_name` with zero sizes.
    pub fn new(file_name: &str) -> Self {
        let (base_name, extension) = path::split_name(file_name);
        Self {
            base_name: base_name.to_string(),
            extension: extension.to_string(),
            offset: 0,
            size: 0,
            compressed_size: 0,
            timestamp: Utc::now(),
            is_encrypted: false,
            comment: String::new(),
            data: None,
        }
    }

    /// Create an entry whose stored bytes are the raw bytes.
    pub fn raw(file_name: &str, data: Vec<u8>) -> Self {
        let len = data.len() as u64;
        Self {
            size: len,
            compressed_size: len,
            data: Some(data),
            ..Self::new(file_name)
        }
    }

    /// Base name plus extension.
    pub fn file_name(&self) -> String {
        format!("{}{}", self.base_name, self.extension)
    }

    /// Returns true if the stored form differs in size from the decoded form.
    pub fn is_compressed(&self) -> bool {
        self.compressed_size != self.size
    }

    /// Number of bytes this entry occupies in a packed payload region.
    pub fn stored_size(&self) -> u64 {
        if self.is_compressed() {
            self.compressed_size
        } else {
            self.size
        }
    }

    /// Returns true if the stored bytes are in memory.
    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }
}

/// Owned snapshot of a file's metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileInfo {
    /// Normalized full path (`/dir/name.ext`).
    pub full_path: String,
    pub base_name: String,
    pub extension: String,
    pub offset: u64,
    pub size: u64,
    pub compressed_size: u64,
    pub timestamp: DateTime<Utc>,
    pub is_encrypted: bool,
    pub comment: String,
    /// Whether the payload is currently held in memory.
    pub is_loaded: bool,
}

impl FileInfo {
    pub(crate) fn from_entry(full_path: String, entry: &FileEntry) -> Self {
        Self {
            full_path,
            base_name: entry.base_name.clone(),
            extension: entry.extension.clone(),
            offset: entry.offset,
            size: entry.size,
            compressed_size: entry.compressed_size,
            timestamp: entry.timestamp,
            is_encrypted: entry.is_encrypted,
            comment: entry.comment.clone(),
            is_loaded: entry.is_loaded(),
        }
    }

    /// Base name plus extension.
    pub fn file_name(&self) -> String {
        format!("{}{}", self.base_name, self.extension)
    }

    /// The directory holding this file (`/dir/`).
    pub fn directory(&self) -> &str {
        path::split_file(&self.full_path).0
    }

    /// Returns true if the stored form differs in size from the decoded form.
    pub fn is_compressed(&self) -> bool {
        self.compressed_size != self.size
    }
}

/// Directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry type.
    pub kind: FileType,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn new(name: impl Into<String>, kind: FileType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Create a file entry.
    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, FileType::File)
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(name, FileType::Directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type() {
        assert!(FileType::File.is_file());
        assert!(!FileType::File.is_dir());
        assert!(FileType::Directory.is_dir());
    }

    #[test]
    fn test_raw_entry_is_not_compressed() {
        let entry = FileEntry::raw("hero.png", vec![0u8; 10]);
        assert_eq!(entry.base_name, "hero");
        assert_eq!(entry.extension, ".png");
        assert_eq!(entry.size, 10);
        assert!(!entry.is_compressed());
        assert_eq!(entry.stored_size(), 10);
        assert!(entry.is_loaded());
    }

    #[test]
    fn test_compressed_entry_stored_size() {
        let mut entry = FileEntry::new("level.dat");
        entry.size = 100;
        entry.compressed_size = 40;
        assert!(entry.is_compressed());
        assert_eq!(entry.stored_size(), 40);
        assert!(!entry.is_loaded());
    }

    #[test]
    fn test_file_info_directory() {
        let entry = FileEntry::raw("orc.png", vec![1, 2, 3]);
        let info = FileInfo::from_entry("/characters/enemies/orc.png".into(), &entry);
        assert_eq!(info.directory(), "/characters/enemies/");
        assert_eq!(info.file_name(), "orc.png");
        assert!(info.is_loaded);
    }

    #[test]
    fn test_dir_entry() {
        let file = DirEntry::file("test.txt");
        assert_eq!(file.name, "test.txt");
        assert!(file.kind.is_file());

        let dir = DirEntry::directory("subdir");
        assert!(dir.kind.is_dir());
    }
}
