//! Folder provider.
//!
//! A physical root is a host directory holding an index file plus one host
//! file per virtual file, at the same relative path. Payloads are stored
//! raw, so `compressed_size == size` for everything this provider encodes.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{stored_bytes, Provider};
use crate::error::{VfsError, VfsResult};
use crate::index::IndexDocument;
use crate::path;
use crate::types::FileEntry;

/// Directory-backed provider.
#[derive(Debug, Clone)]
pub struct FolderProvider {
    root: Option<PathBuf>,
    index_file: String,
}

impl Default for FolderProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FolderProvider {
    /// Registry name.
    pub const NAME: &'static str = "folder";
    /// Index header tag.
    pub const HEADER: &'static str = "GORFS1.0";
    /// Default index file name inside the root directory.
    pub const INDEX_FILE: &'static str = "filesystem.index";

    /// Create a provider using the default index file name.
    pub fn new() -> Self {
        Self {
            root: None,
            index_file: Self::INDEX_FILE.to_string(),
        }
    }

    /// Use a different index file name.
    pub fn with_index_file(mut self, name: impl Into<String>) -> Self {
        self.index_file = name.into();
        self
    }

    /// The root directory, once assigned.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Map a virtual file path onto the host directory.
    ///
    /// Virtual paths never contain `.`/`..` segments (normalization rejects
    /// them), so joining cannot leave the root.
    fn resolve(root: &Path, full_path: &str) -> PathBuf {
        full_path
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(root.to_path_buf(), |acc, segment| acc.join(segment))
    }

    fn attached_root(&self) -> VfsResult<&Path> {
        self.root
            .as_deref()
            .ok_or_else(|| VfsError::root_invalid("<unassigned>"))
    }

    fn read_payload(&self, full_path: &str, entry: &FileEntry) -> VfsResult<Vec<u8>> {
        let host = Self::resolve(self.attached_root()?, full_path);
        let data = fs::read(&host)?;
        if data.len() as u64 != entry.stored_size() {
            return Err(VfsError::corrupt(format!(
                "{} is {} bytes, index says {}",
                host.display(),
                data.len(),
                entry.stored_size()
            )));
        }
        Ok(data)
    }
}

impl Provider for FolderProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn header(&self) -> &str {
        Self::HEADER
    }

    fn description(&self) -> &str {
        "Host directory with one file per entry"
    }

    fn read_index(&mut self, root: &Path) -> VfsResult<IndexDocument> {
        if !root.is_dir() {
            return Err(VfsError::root_invalid(root.display().to_string()));
        }
        let bytes = fs::read(root.join(&self.index_file))?;
        let index = IndexDocument::from_slice(&bytes, Self::HEADER)?;
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        debug!(root = %root.display(), files = index.file_count(), "folder index read");
        self.root = Some(root);
        Ok(index)
    }

    fn set_root(&mut self, root: &Path) {
        self.root = Some(root.canonicalize().unwrap_or_else(|_| root.to_path_buf()));
    }

    fn load(&self, full_path: &str, entry: &mut FileEntry) -> VfsResult<bool> {
        entry.data = Some(self.read_payload(full_path, entry)?);
        Ok(true)
    }

    fn validate_path(&self, full_path: &str) -> VfsResult<()> {
        // The index file shares the root directory with top-level payloads.
        let index_path = format!("{}{}", path::ROOT, self.index_file);
        if path::same(full_path, &index_path) {
            return Err(VfsError::NameReserved(full_path.to_string()));
        }
        Ok(())
    }

    fn decode(&self, full_path: &str, entry: &FileEntry) -> VfsResult<Vec<u8>> {
        match &entry.data {
            Some(data) => Ok(data.clone()),
            None => self.read_payload(full_path, entry),
        }
    }

    fn encode(&self, file_name: &str, data: &[u8]) -> VfsResult<FileEntry> {
        Ok(FileEntry::raw(file_name, data.to_vec()))
    }

    fn save_initialize(&mut self, root: &Path) -> VfsResult<()> {
        fs::create_dir_all(root)?;
        Ok(())
    }

    fn save_index(&mut self, root: &Path, index: &IndexDocument) -> VfsResult<()> {
        fs::write(root.join(&self.index_file), index.to_vec()?)?;
        Ok(())
    }

    fn save_file_data(
        &mut self,
        root: &Path,
        full_path: &str,
        entry: &FileEntry,
    ) -> VfsResult<()> {
        let host = Self::resolve(root, full_path);
        if let Some(parent) = host.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&host, stored_bytes(full_path, entry)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Tree;

    #[test]
    fn test_resolve_stays_under_root() {
        let root = Path::new("/srv/data");
        assert_eq!(
            FolderProvider::resolve(root, "/characters/hero.png"),
            PathBuf::from("/srv/data/characters/hero.png")
        );
    }

    #[test]
    fn test_encode_is_raw() {
        let provider = FolderProvider::new();
        let entry = provider.encode("a.txt", b"hello").unwrap();
        assert_eq!(entry.size, 5);
        assert_eq!(entry.compressed_size, 5);
        assert!(!entry.is_encrypted);
        assert_eq!(provider.decode("/a.txt", &entry).unwrap(), b"hello");
    }

    #[test]
    fn test_save_hooks_then_read_back() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("fs");

        let mut tree = Tree::new();
        let node = tree.create_path("/docs/");
        let mut provider = FolderProvider::new();
        let entry = provider.encode("readme.txt", b"read me").unwrap();
        tree.insert_file(node, entry.clone());
        let index = IndexDocument::from_tree(&tree, FolderProvider::HEADER);

        provider.save_initialize(&root).unwrap();
        provider.save_index(&root, &index).unwrap();
        provider.save_file_data(&root, "/docs/readme.txt", &entry).unwrap();
        provider.save_finalize().unwrap();

        assert_eq!(fs::read(root.join("docs/readme.txt")).unwrap(), b"read me");

        let mut reader = FolderProvider::new();
        let read = reader.read_index(&root).unwrap();
        assert_eq!(read, index);

        let mut loaded = read.root.paths[0].files[0].to_entry().unwrap();
        assert!(reader.load("/docs/readme.txt", &mut loaded).unwrap());
        assert_eq!(loaded.data.as_deref(), Some(&b"read me"[..]));
    }

    #[test]
    fn test_index_file_name_is_reserved() {
        let provider = FolderProvider::new().with_index_file("tree.idx");
        assert!(matches!(
            provider.validate_path("/TREE.idx"),
            Err(VfsError::NameReserved(_))
        ));
        provider.validate_path("/nested/tree.idx").unwrap();
        provider.validate_path("/filesystem.index").unwrap();
    }

    #[test]
    fn test_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        let mut provider = FolderProvider::new();
        let err = provider.read_index(&tmp.path().join("nope")).unwrap_err();
        assert!(matches!(err, VfsError::RootInvalid { .. }));
    }

    #[test]
    fn test_size_mismatch_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.txt"), b"abc").unwrap();
        let mut provider = FolderProvider::new();
        provider.set_root(tmp.path());

        let mut entry = FileEntry::new("a.txt");
        entry.size = 10;
        entry.compressed_size = 10;
        assert!(matches!(
            provider.load("/a.txt", &mut entry),
            Err(VfsError::Corrupt(_))
        ));
    }
}
