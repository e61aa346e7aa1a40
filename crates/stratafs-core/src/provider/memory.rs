//! In-memory provider.
//!
//! Physical roots are keys into a shared [`MemoryStore`], each holding a
//! serialized index and a contiguous payload region addressed by offset.
//! Used for tests and scratch file systems. All data is ephemeral.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{stored_bytes, Provider};
use crate::error::{VfsError, VfsResult};
use crate::index::IndexDocument;
use crate::types::FileEntry;

/// One saved image.
#[derive(Debug, Clone, Default)]
struct Image {
    index: Vec<u8>,
    payload: Vec<u8>,
}

/// Shared backing store for [`MemoryProvider`] instances.
///
/// Cloning shares the same storage, so a provider that saves and another
/// that mounts see the same images.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    images: Arc<RwLock<HashMap<PathBuf, Image>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if an image was saved under `root`.
    pub fn contains(&self, root: &Path) -> bool {
        self.images.read().contains_key(root)
    }

    /// Length of the payload region saved under `root`.
    pub fn payload_len(&self, root: &Path) -> Option<usize> {
        self.images.read().get(root).map(|image| image.payload.len())
    }

    /// Drop the image saved under `root`.
    pub fn remove(&self, root: &Path) -> bool {
        self.images.write().remove(root).is_some()
    }
}

/// Provider over a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryProvider {
    store: MemoryStore,
    root: Option<PathBuf>,
    eager: bool,
}

impl MemoryProvider {
    /// Registry name.
    pub const NAME: &'static str = "memory";
    /// Index header tag.
    pub const HEADER: &'static str = "MEMFS1.0";

    /// Provider that loads payloads into the tree on mount.
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            root: None,
            eager: true,
        }
    }

    /// Provider that leaves payloads in the store until read.
    pub fn lazy(store: MemoryStore) -> Self {
        Self {
            eager: false,
            ..Self::new(store)
        }
    }

    /// The backing store.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    fn read_payload(&self, full_path: &str, entry: &FileEntry) -> VfsResult<Vec<u8>> {
        let root = self
            .root
            .as_deref()
            .ok_or_else(|| VfsError::root_invalid("<unassigned>"))?;
        let images = self.store.images.read();
        let image = images
            .get(root)
            .ok_or_else(|| VfsError::root_invalid(root.display().to_string()))?;
        let start = usize::try_from(entry.offset).ok();
        let end = start.and_then(|s| s.checked_add(usize::try_from(entry.stored_size()).ok()?));
        start
            .zip(end)
            .and_then(|(start, end)| image.payload.get(start..end))
            .map(<[u8]>::to_vec)
            .ok_or_else(|| VfsError::corrupt(format!("{full_path} lies past end of payload")))
    }
}

impl Provider for MemoryProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn header(&self) -> &str {
        Self::HEADER
    }

    fn description(&self) -> &str {
        "Ephemeral in-memory images"
    }

    fn read_index(&mut self, root: &Path) -> VfsResult<IndexDocument> {
        let index = {
            let images = self.store.images.read();
            let image = images
                .get(root)
                .ok_or_else(|| VfsError::root_invalid(root.display().to_string()))?;
            IndexDocument::from_slice(&image.index, Self::HEADER)?
        };
        self.root = Some(root.to_path_buf());
        Ok(index)
    }

    fn set_root(&mut self, root: &Path) {
        self.root = Some(root.to_path_buf());
    }

    fn load(&self, full_path: &str, entry: &mut FileEntry) -> VfsResult<bool> {
        if !self.eager {
            return Ok(false);
        }
        entry.data = Some(self.read_payload(full_path, entry)?);
        Ok(true)
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
        self.store
            .images
            .write()
            .insert(root.to_path_buf(), Image::default());
        Ok(())
    }

    fn save_index(&mut self, root: &Path, index: &IndexDocument) -> VfsResult<()> {
        let bytes = index.to_vec()?;
        let mut images = self.store.images.write();
        images.entry(root.to_path_buf()).or_default().index = bytes;
        Ok(())
    }

    fn save_file_data(
        &mut self,
        root: &Path,
        full_path: &str,
        entry: &FileEntry,
    ) -> VfsResult<()> {
        let bytes = stored_bytes(full_path, entry)?;
        let mut images = self.store.images.write();
        let image = images.entry(root.to_path_buf()).or_default();
        if image.payload.len() as u64 != entry.offset {
            return Err(VfsError::corrupt(format!(
                "{full_path} expected at offset {}, payload is {} bytes",
                entry.offset,
                image.payload.len()
            )));
        }
        image.payload.extend_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Tree;

    fn save_sample(provider: &mut MemoryProvider, root: &Path) -> IndexDocument {
        let mut tree = Tree::new();
        let node = tree.create_path("/");
        let mut a = provider.encode("a.bin", &[1; 10]).unwrap();
        let mut b = provider.encode("b.bin", &[2; 20]).unwrap();
        b.offset = 10;
        a.offset = 0;
        tree.insert_file(node, a.clone());
        tree.insert_file(node, b.clone());
        let index = IndexDocument::from_tree(&tree, MemoryProvider::HEADER);

        provider.save_initialize(root).unwrap();
        provider.save_index(root, &index).unwrap();
        provider.save_file_data(root, "/a.bin", &a).unwrap();
        provider.save_file_data(root, "/b.bin", &b).unwrap();
        provider.save_finalize().unwrap();
        index
    }

    #[test]
    fn test_saved_image_is_packed() {
        let store = MemoryStore::new();
        let mut provider = MemoryProvider::new(store.clone());
        save_sample(&mut provider, Path::new("img"));
        assert!(store.contains(Path::new("img")));
        assert_eq!(store.payload_len(Path::new("img")), Some(30));
    }

    #[test]
    fn test_extent_past_payload_is_corrupt() {
        let store = MemoryStore::new();
        let mut writer = MemoryProvider::new(store.clone());
        let index = save_sample(&mut writer, Path::new("img"));

        let mut reader = MemoryProvider::lazy(store);
        reader.read_index(Path::new("img")).unwrap();
        let mut entry = index.root.files[1].to_entry().unwrap();
        entry.offset = u64::MAX;
        assert!(matches!(reader.decode("/b.bin", &entry), Err(VfsError::Corrupt(_))));
    }

    #[test]
    fn test_out_of_order_offset_rejected() {
        let mut provider = MemoryProvider::new(MemoryStore::new());
        let root = Path::new("img");
        provider.save_initialize(root).unwrap();
        let mut entry = provider.encode("a.bin", &[1; 4]).unwrap();
        entry.offset = 7;
        assert!(matches!(
            provider.save_file_data(root, "/a.bin", &entry),
            Err(VfsError::Corrupt(_))
        ));
    }

    #[test]
    fn test_lazy_provider_decodes_from_store() {
        let store = MemoryStore::new();
        let mut writer = MemoryProvider::new(store.clone());
        save_sample(&mut writer, Path::new("img"));

        let mut reader = MemoryProvider::lazy(store);
        let index = reader.read_index(Path::new("img")).unwrap();
        let mut b = index.root.files[1].to_entry().unwrap();
        assert!(!reader.load("/b.bin", &mut b).unwrap());
        assert!(b.data.is_none());
        assert_eq!(reader.decode("/b.bin", &b).unwrap(), vec![2; 20]);
    }

    #[test]
    fn test_unknown_root() {
        let mut provider = MemoryProvider::new(MemoryStore::new());
        assert!(matches!(
            provider.read_index(Path::new("missing")),
            Err(VfsError::RootInvalid { .. })
        ));
    }
}
