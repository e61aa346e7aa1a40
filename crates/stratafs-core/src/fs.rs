//! The file system engine.
//!
//! A [`FileSystem`] owns one directory tree and is bound to one provider for
//! its lifetime. Lock order is always state first, then provider. Events are
//! buffered while locks are held and delivered after they are released.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{VfsError, VfsResult};
use crate::events::{EventBus, FsEvent};
use crate::index::IndexDocument;
use crate::path;
use crate::provider::Provider;
use crate::stream::FileStream;
use crate::tree::{FileId, NodeId, Tree};
use crate::types::{DirEntry, FileInfo};

#[derive(Debug, Default)]
struct State {
    tree: Tree,
    index: Option<IndexDocument>,
    root: Option<PathBuf>,
}

/// A virtual file system instance.
pub struct FileSystem {
    name: String,
    state: RwLock<State>,
    provider: RwLock<Box<dyn Provider>>,
    events: EventBus,
}

impl std::fmt::Debug for FileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystem")
            .field("name", &self.name)
            .field("provider", &self.provider_name())
            .field("state", &"<locked>")
            .finish()
    }
}

impl FileSystem {
    /// Create an empty file system bound to `provider`.
    pub fn new(name: impl Into<String>, provider: Box<dyn Provider>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(State::default()),
            provider: RwLock::new(provider),
            events: EventBus::new(),
        }
    }

    /// Instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry name of the bound provider.
    pub fn provider_name(&self) -> String {
        self.provider.read().name().to_string()
    }

    /// Event listeners for this instance.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // ========================================================================
    // Physical root
    // ========================================================================

    /// The physical root last opened or saved to.
    pub fn root(&self) -> Option<PathBuf> {
        self.state.read().root.clone()
    }

    /// Open a physical root and read its index.
    ///
    /// The tree is cleared first; nothing is mounted until [`mount`](Self::mount).
    pub fn set_root(&self, physical: impl AsRef<Path>) -> VfsResult<()> {
        let physical = physical.as_ref();
        if physical.as_os_str().is_empty() {
            return Err(VfsError::root_invalid(""));
        }

        let mut state = self.state.write();
        state.tree.clear();
        state.index = None;
        state.root = None;

        let index = self
            .provider
            .write()
            .read_index(physical)
            .map_err(|e| VfsError::RootInvalid {
                root: physical.display().to_string(),
                source: Some(Box::new(e)),
            })?;

        info!(
            fs = %self.name,
            root = %physical.display(),
            files = index.file_count(),
            "root assigned"
        );
        state.index = Some(index);
        state.root = Some(physical.to_path_buf());
        Ok(())
    }

    // ========================================================================
    // Mounting
    // ========================================================================

    /// Materialize index records under `path` into the tree.
    ///
    /// Non-recursive mounts take only the record for `path` itself. Mounting
    /// is not atomic: if a later record fails, directories and files from
    /// earlier records stay in the tree.
    pub fn mount(&self, path: &str, recurse: bool) -> VfsResult<()> {
        let dir = path::normalize_dir(path)?;
        let mut events = Vec::new();
        let result = {
            let mut state = self.state.write();
            let provider = self.provider.read();
            Self::mount_records(&mut state, &**provider, &dir, recurse, &mut events)
        };
        let loaded = events.len();
        self.events.emit_all(events);

        match result {
            Ok(files) => {
                info!(fs = %self.name, path = %dir, recurse, files, loaded, "mounted");
                Ok(())
            }
            Err(e) => {
                warn!(fs = %self.name, path = %dir, error = %e, "mount failed");
                Err(VfsError::mount_failed(dir, e))
            }
        }
    }

    /// Mount everything under the root.
    pub fn mount_all(&self) -> VfsResult<()> {
        self.mount(path::ROOT, true)
    }

    fn mount_records(
        state: &mut State,
        provider: &dyn Provider,
        dir: &str,
        recurse: bool,
        events: &mut Vec<FsEvent>,
    ) -> VfsResult<usize> {
        let tree = &mut state.tree;
        let index = state
            .index
            .as_ref()
            .ok_or_else(|| VfsError::root_invalid("<unassigned>"))?;
        let records = index.select(dir, recurse);
        if records.is_empty() {
            return Err(VfsError::path_not_found(dir));
        }

        let mut count = 0;
        for record in records {
            let record_dir = path::normalize_dir(&record.full_path).map_err(|_| {
                VfsError::corrupt(format!("invalid path {:?} in index", record.full_path))
            })?;
            let node = tree.create_path(&record_dir);
            for file in &record.files {
                let mut entry = file.to_entry()?;
                let full_path = format!("{}{}", tree.node(node).full_path, entry.file_name());
                let loaded = provider.load(&full_path, &mut entry)?;
                tree.insert_file(node, entry);
                debug!(path = %full_path, loaded, "file mounted");
                if loaded {
                    events.push(FsEvent::DataLoad { path: full_path });
                }
                count += 1;
            }
        }
        Ok(count)
    }

    /// Drop in-memory payloads under `path`, keeping metadata.
    pub fn unmount(&self, path: &str, recurse: bool) -> VfsResult<()> {
        let dir = path::normalize_dir(path)?;
        let mut state = self.state.write();
        let node = state.tree.get_path(&dir)?;
        let files: Vec<FileId> = if recurse {
            state.tree.files_under(node)
        } else {
            state.tree.files_in(node).collect()
        };
        for &id in &files {
            state.tree.file_mut(id).data = None;
        }
        info!(fs = %self.name, path = %dir, recurse, files = files.len(), "unmounted");
        Ok(())
    }

    /// Drop every in-memory payload.
    pub fn unmount_all(&self) -> VfsResult<()> {
        self.unmount(path::ROOT, true)
    }

    // ========================================================================
    // Directories
    // ========================================================================

    /// Create every missing directory along `path`. Returns the normalized path.
    pub fn create_path(&self, path: &str) -> VfsResult<String> {
        let dir = path::normalize_dir(path)?;
        let mut state = self.state.write();
        let node = state.tree.create_path(&dir);
        Ok(state.tree.node(node).full_path.clone())
    }

    /// Remove a directory with its subtree. Deleting `/` clears the tree.
    pub fn delete_path(&self, path: &str) -> VfsResult<()> {
        let dir = path::normalize_dir(path)?;
        self.state.write().tree.delete_path(&dir)?;
        debug!(fs = %self.name, path = %dir, "path deleted");
        Ok(())
    }

    /// Returns true if the directory exists. Invalid paths do not exist.
    pub fn path_exists(&self, path: &str) -> bool {
        path::normalize_dir(path)
            .map(|dir| self.state.read().tree.find_path(&dir).is_some())
            .unwrap_or(false)
    }

    /// Remove every directory and file.
    pub fn clear(&self) {
        self.state.write().tree.clear();
    }

    /// Direct children of a directory: subdirectories first, then files.
    pub fn list_dir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let dir = path::normalize_dir(path)?;
        let state = self.state.read();
        let node = state.tree.get_path(&dir)?;
        Ok(state.tree.list(node))
    }

    /// Files directly inside a directory.
    pub fn list_files(&self, path: &str) -> VfsResult<Vec<FileInfo>> {
        let dir = path::normalize_dir(path)?;
        let state = self.state.read();
        let node = state.tree.get_path(&dir)?;
        Ok(state
            .tree
            .files_in(node)
            .map(|id| Self::info(&state.tree, id))
            .collect())
    }

    // ========================================================================
    // Files
    // ========================================================================

    fn info(tree: &Tree, id: FileId) -> FileInfo {
        FileInfo::from_entry(tree.file_path(id), tree.file(id))
    }

    /// Encode `data` and store it at `path`, replacing any existing file.
    ///
    /// A replaced file is removed first, so the new one is listed (and
    /// saved) after its siblings.
    pub fn write_file(&self, path: &str, data: &[u8]) -> VfsResult<FileInfo> {
        let full = path::normalize_file(path)?;
        let (dir, name) = path::split_file(&full);

        let result = {
            let mut state = self.state.write();
            let provider = self.provider.read();
            provider
                .validate_path(&full)
                .and_then(|()| provider.encode(name, data))
                .map(|entry| {
                    let tree = &mut state.tree;
                    if let Some(old) = tree.find_file(&full) {
                        tree.remove_file(old);
                    }
                    let node = tree.create_path(dir);
                    let id = tree.insert_file(node, entry);
                    Self::info(tree, id)
                })
        };

        let info = result.map_err(|e| VfsError::write_failed(&full, e))?;
        debug!(
            fs = %self.name,
            path = %info.full_path,
            size = info.size,
            stored = info.compressed_size,
            "file written"
        );
        self.events.emit(&FsEvent::FileWrite {
            path: info.full_path.clone(),
        });
        Ok(info)
    }

    /// Decode the bytes stored at `path`.
    pub fn read_file(&self, path: &str) -> VfsResult<Vec<u8>> {
        let (full_path, data) = self.decode(path)?;
        self.events.emit(&FsEvent::FileRead { path: full_path });
        Ok(data)
    }

    fn decode(&self, path: &str) -> VfsResult<(String, Vec<u8>)> {
        let full = path::normalize_file(path)?;
        let state = self.state.read();
        let id = state
            .tree
            .find_file(&full)
            .ok_or_else(|| VfsError::file_not_found(&full))?;
        let full_path = state.tree.file_path(id);
        let data = self
            .provider
            .read()
            .decode(&full_path, state.tree.file(id))
            .map_err(|e| VfsError::read_failed(&full_path, e))?;
        debug!(fs = %self.name, path = %full_path, size = data.len(), "file read");
        Ok((full_path, data))
    }

    /// Decode a file into a seekable in-memory stream.
    ///
    /// Fires `FileRead` like [`read_file`](Self::read_file). Writes go to the
    /// stream's buffer until [`FileStream::commit`] stores them.
    pub fn open_stream(&self, path: &str, read_only: bool) -> VfsResult<FileStream<'_>> {
        let (full_path, data) = self.decode(path)?;
        self.events.emit(&FsEvent::FileRead {
            path: full_path.clone(),
        });
        Ok(FileStream::new(self, full_path, data, read_only))
    }

    /// Delete a file, or the direct files of a directory.
    ///
    /// A path ending in a separator, or naming an existing directory rather
    /// than a file, clears that directory's files and leaves its
    /// subdirectories alone. Returns the number of files removed.
    pub fn delete(&self, path: &str) -> VfsResult<usize> {
        let unified = path.replace('\\', "/");
        let as_dir = unified.is_empty() || unified.ends_with(path::SEPARATOR);
        let target = if as_dir {
            path::normalize_dir(&unified)?
        } else {
            path::normalize_file(&unified)?
        };

        let result = {
            let mut state = self.state.write();
            let tree = &mut state.tree;
            if as_dir {
                tree.get_path(&target).map(|node| tree.clear_files(node))
            } else if let Some(id) = tree.find_file(&target) {
                tree.remove_file(id);
                Ok(1)
            } else {
                match path::normalize_dir(&target).ok().and_then(|d| tree.find_path(&d)) {
                    Some(node) => Ok(tree.clear_files(node)),
                    None => Err(VfsError::file_not_found(&target)),
                }
            }
        };

        let removed = result.map_err(|e| VfsError::delete_failed(&target, e))?;
        debug!(fs = %self.name, path = %target, removed, "deleted");
        Ok(removed)
    }

    /// Delete every file in the tree, keeping directories.
    pub fn delete_all(&self) -> usize {
        let removed = self.state.write().tree.clear_all_files();
        debug!(fs = %self.name, removed, "deleted all files");
        removed
    }

    /// Returns true if a file exists at `path`. Invalid paths do not exist.
    pub fn file_exists(&self, path: &str) -> bool {
        path::normalize_file(path)
            .map(|full| self.state.read().tree.find_file(&full).is_some())
            .unwrap_or(false)
    }

    /// Find a file by name, case-insensitively.
    ///
    /// `name` may carry a directory part (`/characters/hero.png`), which
    /// limits the search to that subtree; a bare name searches everything.
    /// Returns the first match in traversal order.
    pub fn find_file(&self, name: &str) -> VfsResult<Option<FileInfo>> {
        let unified = name.replace('\\', "/");
        let (dir, file_name) = match unified.rfind(path::SEPARATOR) {
            Some(idx) => (path::normalize_dir(&unified[..idx])?, &unified[idx + 1..]),
            None => (path::ROOT.to_string(), unified.as_str()),
        };
        if !path::valid_segment(file_name) {
            return Err(VfsError::filename_invalid(name));
        }

        let key = path::key(file_name);
        let state = self.state.read();
        let Some(node) = state.tree.find_path(&dir) else {
            return Ok(None);
        };
        Ok(state
            .tree
            .files_under(node)
            .into_iter()
            .find(|&id| path::key(&state.tree.file(id).file_name()) == key)
            .map(|id| Self::info(&state.tree, id)))
    }

    /// Metadata for the file at `path`.
    pub fn file(&self, path: &str) -> VfsResult<FileInfo> {
        let full = path::normalize_file(path)?;
        let state = self.state.read();
        state
            .tree
            .find_file(&full)
            .map(|id| Self::info(&state.tree, id))
            .ok_or_else(|| VfsError::file_not_found(full))
    }

    /// Every file, depth-first with subdirectories before a directory's files.
    pub fn files(&self) -> Vec<FileInfo> {
        let state = self.state.read();
        state
            .tree
            .files_under(Tree::ROOT)
            .into_iter()
            .map(|id| Self::info(&state.tree, id))
            .collect()
    }

    /// Number of files in the tree.
    pub fn file_count(&self) -> usize {
        self.state.read().tree.file_count()
    }

    /// Sum of decoded sizes, or of stored sizes when `compressed`.
    pub fn total_size(&self, compressed: bool) -> u64 {
        let state = self.state.read();
        state
            .tree
            .files_under(Tree::ROOT)
            .into_iter()
            .map(|id| {
                let entry = state.tree.file(id);
                if compressed {
                    entry.stored_size()
                } else {
                    entry.size
                }
            })
            .sum()
    }

    /// Replace a file's comment.
    pub fn set_comment(&self, path: &str, comment: impl Into<String>) -> VfsResult<()> {
        let full = path::normalize_file(path)?;
        let mut state = self.state.write();
        let id = state
            .tree
            .find_file(&full)
            .ok_or_else(|| VfsError::file_not_found(&full))?;
        state.tree.file_mut(id).comment = comment.into();
        Ok(())
    }

    /// Rename a file within its directory.
    pub fn rename_file(&self, path: &str, new_name: &str) -> VfsResult<FileInfo> {
        let full = path::normalize_file(path)?;
        if !path::valid_segment(new_name) {
            return Err(VfsError::filename_invalid(new_name));
        }
        let mut state = self.state.write();
        let id = state
            .tree
            .find_file(&full)
            .ok_or_else(|| VfsError::file_not_found(&full))?;
        let target = format!("{}{new_name}", path::split_file(&full).0);
        self.provider.read().validate_path(&target)?;
        state.tree.rename_file(id, new_name)?;
        let info = Self::info(&state.tree, id);
        debug!(fs = %self.name, from = %full, to = %info.full_path, "file renamed");
        Ok(info)
    }

    /// Move a file into another directory, keeping its stored bytes.
    ///
    /// A file of the same name in the target directory is replaced.
    pub fn move_file(&self, path: &str, new_dir: &str) -> VfsResult<FileInfo> {
        let full = path::normalize_file(path)?;
        let dir = path::normalize_dir(new_dir)?;
        let mut state = self.state.write();
        let tree = &mut state.tree;
        let id = tree
            .find_file(&full)
            .ok_or_else(|| VfsError::file_not_found(&full))?;
        if path::same(&tree.node(tree.owner(id)).full_path, &dir) {
            return Err(VfsError::AlreadyExists(full));
        }
        let target = format!("{dir}{}", path::split_file(&full).1);
        self.provider.read().validate_path(&target)?;
        let entry = tree
            .remove_file(id)
            .ok_or_else(|| VfsError::file_not_found(&full))?;
        let node = tree.create_path(&dir);
        let moved = tree.insert_file(node, entry);
        let info = Self::info(tree, moved);
        debug!(fs = %self.name, from = %full, to = %info.full_path, "file moved");
        Ok(info)
    }

    /// Move a directory's whole subtree under `new_path`, keeping stored bytes.
    ///
    /// `/a/` moved to `/b/` turns `/a/x/y.txt` into `/b/x/y.txt`; files
    /// already at a target path are replaced and `/a/` is removed. Returns
    /// the number of files moved.
    pub fn move_path(&self, old_path: &str, new_path: &str) -> VfsResult<usize> {
        let from = path::normalize_dir(old_path)?;
        let to = path::normalize_dir(new_path)?;
        if path::same(&from, &to) {
            return Err(VfsError::AlreadyExists(to));
        }
        if path::starts_with(&to, &from) {
            return Err(VfsError::path_invalid(format!("{to} lies inside {from}")));
        }

        let mut state = self.state.write();
        let provider = self.provider.read();
        let tree = &mut state.tree;
        let source = tree.get_path(&from)?;
        let prefix = tree.node(source).full_path.len();
        let retarget = |dir: &str| format!("{to}{}", &dir[prefix..]);

        let mut dirs = Vec::new();
        let mut pending = vec![source];
        while let Some(node) = pending.pop() {
            dirs.push(retarget(&tree.node(node).full_path));
            let children: Vec<NodeId> = tree.children(node).collect();
            pending.extend(children.into_iter().rev());
        }
        let files: Vec<(FileId, String)> = tree
            .files_under(source)
            .into_iter()
            .map(|id| (id, retarget(&tree.file_path(id))))
            .collect();
        for (_, target) in &files {
            provider.validate_path(target)?;
        }

        // Detach first: the target may sit inside the source (moving up).
        let mut entries = Vec::with_capacity(files.len());
        for (id, target) in files {
            let entry = tree
                .remove_file(id)
                .ok_or_else(|| VfsError::file_not_found(&target))?;
            entries.push((target, entry));
        }
        tree.delete_path(&from)?;

        for dir in &dirs {
            tree.create_path(dir);
        }
        let moved = entries.len();
        for (target, entry) in entries {
            let (dir, _) = path::split_file(&target);
            let node = tree.create_path(dir);
            if let Some(old) = tree.find_file(&target) {
                tree.remove_file(old);
            }
            tree.insert_file(node, entry);
        }
        info!(fs = %self.name, from = %from, to = %to, files = moved, "path moved");
        Ok(moved)
    }

    /// Replace this tree with decoded copies of every file in `source`.
    ///
    /// Files are re-encoded by this instance's provider.
    pub fn copy_from(&self, source: &FileSystem) -> VfsResult<usize> {
        let files: Vec<(String, Vec<u8>)> = {
            let state = source.state.read();
            let provider = source.provider.read();
            state
                .tree
                .files_under(Tree::ROOT)
                .into_iter()
                .map(|id| {
                    let full_path = state.tree.file_path(id);
                    provider
                        .decode(&full_path, state.tree.file(id))
                        .map(|data| (full_path.clone(), data))
                        .map_err(|e| VfsError::read_failed(full_path, e))
                })
                .collect::<VfsResult<_>>()?
        };

        {
            let mut state = self.state.write();
            state.tree.clear();
            state.root = None;
        }
        for (full_path, data) in &files {
            self.write_file(full_path, data)?;
        }
        info!(fs = %self.name, from = %source.name, files = files.len(), "copied");
        Ok(files.len())
    }

    // ========================================================================
    // Saving
    // ========================================================================

    /// Persist the tree to `physical` through the provider.
    ///
    /// Offsets are reassigned contiguously from zero in traversal order.
    /// Every file must have its payload in memory; an unmounted file fails
    /// with `MissingData`. On success `physical` becomes the recorded root.
    pub fn save(&self, physical: impl AsRef<Path>) -> VfsResult<()> {
        let physical = physical.as_ref();
        let mut events = Vec::new();
        let result = if physical.as_os_str().is_empty() {
            Err(VfsError::root_invalid(""))
        } else {
            let mut state = self.state.write();
            let mut provider = self.provider.write();
            let result = Self::save_locked(&mut state.tree, &mut **provider, physical, &mut events);
            if let Ok(index) = &result {
                provider.set_root(physical);
                state.index = Some(index.clone());
                state.root = Some(physical.to_path_buf());
            }
            result.map(|_| ())
        };
        let saved = events.len();
        self.events.emit_all(events);

        match result {
            Ok(()) => {
                info!(fs = %self.name, root = %physical.display(), files = saved, "saved");
                Ok(())
            }
            Err(e) => {
                warn!(fs = %self.name, root = %physical.display(), error = %e, "save failed");
                Err(VfsError::save_failed(physical.display().to_string(), e))
            }
        }
    }

    fn save_locked(
        tree: &mut Tree,
        provider: &mut dyn Provider,
        root: &Path,
        events: &mut Vec<FsEvent>,
    ) -> VfsResult<IndexDocument> {
        let files = tree.files_under(Tree::ROOT);
        if let Some(&missing) = files.iter().find(|&&id| !tree.file(id).is_loaded()) {
            return Err(VfsError::MissingData(tree.file_path(missing)));
        }
        for &id in &files {
            provider.validate_path(&tree.file_path(id))?;
        }

        let mut offset = 0;
        for &id in &files {
            let entry = tree.file_mut(id);
            entry.offset = offset;
            offset += entry.stored_size();
        }
        let index = IndexDocument::from_tree(tree, provider.header());

        let written = Self::write_payloads(tree, provider, root, &index, &files, events);
        let finalized = provider.save_finalize();
        written.and(finalized)?;
        Ok(index)
    }

    fn write_payloads(
        tree: &Tree,
        provider: &mut dyn Provider,
        root: &Path,
        index: &IndexDocument,
        files: &[FileId],
        events: &mut Vec<FsEvent>,
    ) -> VfsResult<()> {
        provider.save_initialize(root)?;
        provider.save_index(root, index)?;
        for &id in files {
            let full_path = tree.file_path(id);
            provider.save_file_data(root, &full_path, tree.file(id))?;
            events.push(FsEvent::DataSave { path: full_path });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::FsEventKind;
    use crate::provider::{MemoryProvider, MemoryStore};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn memory_fs(store: &MemoryStore) -> FileSystem {
        FileSystem::new("test", Box::new(MemoryProvider::new(store.clone())))
    }

    fn record_events(fs: &FileSystem) -> Arc<Mutex<Vec<FsEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        fs.events().subscribe(move |e| sink.lock().push(e.clone()));
        seen
    }

    #[test]
    fn test_create_path_is_idempotent() {
        let fs = memory_fs(&MemoryStore::new());
        assert_eq!(fs.create_path("characters\\enemies").unwrap(), "/characters/enemies/");
        assert_eq!(fs.create_path("/characters/enemies/").unwrap(), "/characters/enemies/");
        assert_eq!(fs.list_dir("/").unwrap(), vec![DirEntry::directory("characters")]);
        assert!(fs.path_exists("/CHARACTERS/Enemies"));
    }

    #[test]
    fn test_invalid_paths_fail_before_mutation() {
        let fs = memory_fs(&MemoryStore::new());
        assert!(matches!(fs.create_path("/a/b?/"), Err(VfsError::PathInvalid(_))));
        assert!(matches!(fs.write_file("/dir/", b"x"), Err(VfsError::FilenameInvalid(_))));
        assert!(matches!(fs.write_file("", b"x"), Err(VfsError::FilenameInvalid(_))));
        assert!(!fs.path_exists("/a/"));
        assert_eq!(fs.file_count(), 0);
    }

    #[test]
    fn test_write_then_read_is_case_insensitive() {
        let fs = memory_fs(&MemoryStore::new());
        fs.write_file("/Foo/Bar.txt", b"hello").unwrap();
        assert!(fs.file_exists("/foo/bar.TXT"));
        assert_eq!(fs.read_file("FOO\\BAR.TXT").unwrap(), b"hello");
        assert_eq!(fs.file("/foo/bar.txt").unwrap().full_path, "/Foo/Bar.txt");
    }

    #[test]
    fn test_repeated_writes_keep_one_entry() {
        let fs = memory_fs(&MemoryStore::new());
        fs.write_file("/a/b.txt", b"one").unwrap();
        fs.write_file("/A/B.TXT", b"second").unwrap();
        assert_eq!(fs.file_count(), 1);
        assert_eq!(fs.read_file("/a/b.txt").unwrap(), b"second");
    }

    #[test]
    fn test_read_missing_file() {
        let fs = memory_fs(&MemoryStore::new());
        assert!(matches!(fs.read_file("/nope.txt"), Err(VfsError::FileNotFound(_))));
    }

    #[test]
    fn test_delete_file_and_directory_files() {
        let fs = memory_fs(&MemoryStore::new());
        fs.write_file("/a/b.txt", b"1").unwrap();
        fs.write_file("/a/c.txt", b"2").unwrap();
        fs.write_file("/a/sub/d.txt", b"3").unwrap();

        assert_eq!(fs.delete("/a/b.txt").unwrap(), 1);
        assert!(!fs.file_exists("/a/b.txt"));

        // Directory form clears direct files only.
        assert_eq!(fs.delete("/a/").unwrap(), 1);
        assert!(fs.file_exists("/a/sub/d.txt"));
        assert!(fs.path_exists("/a/"));

        let err = fs.delete("/a/missing.txt").unwrap_err();
        assert!(matches!(err, VfsError::DeleteFailed { .. }));
        assert!(matches!(err.root_cause(), VfsError::FileNotFound(_)));
    }

    #[test]
    fn test_delete_names_directory_without_separator() {
        let fs = memory_fs(&MemoryStore::new());
        fs.write_file("/a/sub/d.txt", b"3").unwrap();
        assert_eq!(fs.delete("/a/sub").unwrap(), 1);
        assert!(fs.path_exists("/a/sub/"));
    }

    #[test]
    fn test_delete_all_keeps_directories() {
        let fs = memory_fs(&MemoryStore::new());
        fs.write_file("/a/b.txt", b"1").unwrap();
        fs.write_file("/c.txt", b"2").unwrap();
        assert_eq!(fs.delete_all(), 2);
        assert_eq!(fs.file_count(), 0);
        assert!(fs.path_exists("/a/"));
    }

    #[test]
    fn test_delete_path_removes_subtree() {
        let fs = memory_fs(&MemoryStore::new());
        fs.write_file("/a/b.txt", b"1").unwrap();
        fs.delete_path("/a").unwrap();
        assert!(!fs.path_exists("/a"));
        assert!(!fs.file_exists("/a/b.txt"));
        assert!(matches!(fs.delete_path("/a"), Err(VfsError::PathNotFound(_))));
    }

    #[test]
    fn test_find_file() {
        let fs = memory_fs(&MemoryStore::new());
        fs.write_file("/characters/hero.png", b"h").unwrap();
        fs.write_file("/characters/enemies/orc.png", b"o").unwrap();

        let found = fs.find_file("ORC.PNG").unwrap().unwrap();
        assert_eq!(found.full_path, "/characters/enemies/orc.png");
        assert!(fs.find_file("/characters/enemies/hero.png").unwrap().is_none());
        assert!(fs.find_file("/characters/hero.png").unwrap().is_some());
        assert!(fs.find_file("/missing/hero.png").unwrap().is_none());
        assert!(matches!(fs.find_file("bad|name"), Err(VfsError::FilenameInvalid(_))));
    }

    #[test]
    fn test_rename_and_comment() {
        let fs = memory_fs(&MemoryStore::new());
        fs.write_file("/a/b.txt", b"1").unwrap();
        fs.write_file("/a/c.txt", b"2").unwrap();

        assert!(matches!(fs.rename_file("/a/b.txt", "C.TXT"), Err(VfsError::AlreadyExists(_))));
        let renamed = fs.rename_file("/a/b.txt", "z.md").unwrap();
        assert_eq!(renamed.full_path, "/a/z.md");
        assert_eq!(renamed.extension, ".md");
        assert_eq!(fs.read_file("/a/z.md").unwrap(), b"1");

        fs.set_comment("/a/z.md", "renamed").unwrap();
        assert_eq!(fs.file("/a/z.md").unwrap().comment, "renamed");
    }

    #[test]
    fn test_move_file() {
        let fs = memory_fs(&MemoryStore::new());
        fs.write_file("/a/b.txt", b"payload").unwrap();
        let moved = fs.move_file("/a/b.txt", "/archive/old").unwrap();
        assert_eq!(moved.full_path, "/archive/old/b.txt");
        assert!(!fs.file_exists("/a/b.txt"));
        assert_eq!(fs.read_file("/archive/old/b.txt").unwrap(), b"payload");
        assert!(matches!(
            fs.move_file("/archive/old/b.txt", "/Archive/Old/"),
            Err(VfsError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_size_scenario() {
        let store = MemoryStore::new();
        let writer = memory_fs(&store);
        writer.write_file("/a/b.txt", &[1; 10]).unwrap();
        writer.write_file("/a/c.txt", &[2; 20]).unwrap();
        writer.save("img").unwrap();

        let fs = memory_fs(&store);
        fs.set_root("img").unwrap();
        fs.mount_all().unwrap();
        fs.save("img2").unwrap();

        assert_eq!(fs.file("/a/b.txt").unwrap().offset, 0);
        assert_eq!(fs.file("/a/c.txt").unwrap().offset, 10);
        assert_eq!(fs.total_size(false), 30);
        assert_eq!(fs.total_size(true), 30);
        assert_eq!(fs.root(), Some(PathBuf::from("img2")));
    }

    #[test]
    fn test_non_recursive_mount() {
        let store = MemoryStore::new();
        let writer = memory_fs(&store);
        writer.write_file("/characters/hero.png", b"hero").unwrap();
        writer.write_file("/characters/enemies/orc.png", b"orc").unwrap();
        writer.save("game").unwrap();

        let fs = memory_fs(&store);
        fs.set_root("game").unwrap();
        fs.mount("/characters", false).unwrap();
        assert!(fs.file_exists("/characters/hero.png"));
        assert!(!fs.file_exists("/characters/enemies/orc.png"));

        fs.mount("/characters", true).unwrap();
        assert!(fs.file_exists("/characters/enemies/orc.png"));
    }

    #[test]
    fn test_mount_unknown_path() {
        let store = MemoryStore::new();
        let writer = memory_fs(&store);
        writer.write_file("/a.txt", b"a").unwrap();
        writer.save("img").unwrap();

        let fs = memory_fs(&store);
        fs.set_root("img").unwrap();
        let err = fs.mount("/nowhere", true).unwrap_err();
        assert!(matches!(err, VfsError::MountFailed { .. }));
        assert!(matches!(err.root_cause(), VfsError::PathNotFound(_)));
    }

    #[test]
    fn test_mount_without_root() {
        let fs = memory_fs(&MemoryStore::new());
        assert!(matches!(fs.mount_all(), Err(VfsError::MountFailed { .. })));
    }

    #[test]
    fn test_set_root_errors() {
        let fs = memory_fs(&MemoryStore::new());
        assert!(matches!(fs.set_root(""), Err(VfsError::RootInvalid { source: None, .. })));
        let err = fs.set_root("missing").unwrap_err();
        assert!(matches!(err, VfsError::RootInvalid { source: Some(_), .. }));
        assert_eq!(fs.root(), None);
    }

    #[test]
    fn test_unmount_keeps_metadata_and_blocks_save() {
        let store = MemoryStore::new();
        let writer = memory_fs(&store);
        writer.write_file("/a/b.txt", b"bytes").unwrap();
        writer.save("img").unwrap();

        let fs = memory_fs(&store);
        fs.set_root("img").unwrap();
        fs.mount_all().unwrap();
        fs.unmount("/a", false).unwrap();

        assert!(fs.file_exists("/a/b.txt"));
        assert!(!fs.file("/a/b.txt").unwrap().is_loaded);
        // Physical storage still answers reads.
        assert_eq!(fs.read_file("/a/b.txt").unwrap(), b"bytes");

        let err = fs.save("img-copy").unwrap_err();
        assert!(matches!(err, VfsError::SaveFailed { .. }));
        assert!(matches!(err.root_cause(), VfsError::MissingData(_)));
        assert_eq!(fs.root(), Some(PathBuf::from("img")));

        assert!(matches!(fs.unmount("/zzz", true), Err(VfsError::PathNotFound(_))));
    }

    #[test]
    fn test_events_fire_after_success() {
        let store = MemoryStore::new();
        let fs = memory_fs(&store);
        let seen = record_events(&fs);

        fs.write_file("/a.txt", b"a").unwrap();
        fs.read_file("/a.txt").unwrap();
        assert!(fs.read_file("/missing.txt").is_err());
        fs.save("img").unwrap();

        let other = memory_fs(&store);
        let other_seen = record_events(&other);
        other.set_root("img").unwrap();
        other.mount_all().unwrap();

        let kinds: Vec<_> = seen.lock().iter().map(FsEvent::kind).collect();
        assert_eq!(
            kinds,
            vec![FsEventKind::FileWrite, FsEventKind::FileRead, FsEventKind::DataSave]
        );
        assert_eq!(
            *other_seen.lock(),
            vec![FsEvent::DataLoad { path: "/a.txt".into() }]
        );
    }

    #[test]
    fn test_listener_can_reenter() {
        let fs = Arc::new(memory_fs(&MemoryStore::new()));
        let inner = Arc::clone(&fs);
        let sizes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sizes);
        fs.events().subscribe_kind(FsEventKind::FileWrite, move |e| {
            sink.lock().push(inner.file(e.path()).map(|i| i.size).unwrap_or(0));
        });
        fs.write_file("/x.bin", &[0; 7]).unwrap();
        assert_eq!(*sizes.lock(), vec![7]);
    }

    #[test]
    fn test_lazy_provider_reads_through() {
        let store = MemoryStore::new();
        let writer = memory_fs(&store);
        writer.write_file("/a.txt", b"lazy").unwrap();
        writer.save("img").unwrap();

        let fs = FileSystem::new("lazy", Box::new(MemoryProvider::lazy(store)));
        let seen = record_events(&fs);
        fs.set_root("img").unwrap();
        fs.mount_all().unwrap();
        assert!(seen.lock().is_empty());
        assert_eq!(fs.read_file("/a.txt").unwrap(), b"lazy");
        assert!(fs.save("img2").is_err());
    }

    #[test]
    fn test_copy_from() {
        let store = MemoryStore::new();
        let source = memory_fs(&store);
        source.write_file("/a/b.txt", b"b").unwrap();
        source.write_file("/c.txt", b"c").unwrap();

        let target = memory_fs(&store);
        target.write_file("/stale.txt", b"old").unwrap();
        assert_eq!(target.copy_from(&source).unwrap(), 2);
        assert!(!target.file_exists("/stale.txt"));
        assert_eq!(target.read_file("/a/b.txt").unwrap(), b"b");
    }

    #[test]
    fn test_files_order() {
        let fs = memory_fs(&MemoryStore::new());
        fs.write_file("/top.txt", b"1").unwrap();
        fs.write_file("/a/inner.txt", b"2").unwrap();
        let paths: Vec<_> = fs.files().into_iter().map(|f| f.full_path).collect();
        assert_eq!(paths, vec!["/a/inner.txt", "/top.txt"]);
        assert_eq!(fs.list_files("/a").unwrap()[0].file_name(), "inner.txt");
    }

    #[test]
    fn test_rewrite_moves_file_to_end() {
        let fs = memory_fs(&MemoryStore::new());
        fs.write_file("/a.txt", b"a").unwrap();
        fs.write_file("/b.txt", b"b").unwrap();
        fs.write_file("/A.TXT", b"aa").unwrap();
        let paths: Vec<_> = fs.files().into_iter().map(|f| f.full_path).collect();
        assert_eq!(paths, vec!["/b.txt", "/A.TXT"]);

        fs.save("img").unwrap();
        assert_eq!(fs.file("/b.txt").unwrap().offset, 0);
        assert_eq!(fs.file("/a.txt").unwrap().offset, 1);
    }

    #[test]
    fn test_move_path() {
        let fs = memory_fs(&MemoryStore::new());
        fs.write_file("/a/x.txt", b"x").unwrap();
        fs.write_file("/a/deep/y.txt", b"y").unwrap();
        fs.create_path("/a/empty").unwrap();
        fs.write_file("/b/x.txt", b"old").unwrap();

        assert_eq!(fs.move_path("/A", "/b").unwrap(), 2);
        assert!(!fs.path_exists("/a/"));
        assert!(fs.path_exists("/b/empty/"));
        assert_eq!(fs.read_file("/b/x.txt").unwrap(), b"x");
        assert_eq!(fs.read_file("/b/deep/y.txt").unwrap(), b"y");
        assert_eq!(fs.file_count(), 2);

        assert!(matches!(fs.move_path("/b", "/B/"), Err(VfsError::AlreadyExists(_))));
        assert!(matches!(fs.move_path("/b", "/b/deep"), Err(VfsError::PathInvalid(_))));
        assert!(matches!(fs.move_path("/", "/c"), Err(VfsError::PathInvalid(_))));
        assert!(matches!(fs.move_path("/nope", "/c"), Err(VfsError::PathNotFound(_))));
        assert_eq!(fs.file_count(), 2);
    }

    #[test]
    fn test_move_path_up_into_parent() {
        let fs = memory_fs(&MemoryStore::new());
        fs.write_file("/a/b/c.txt", b"c").unwrap();
        fs.write_file("/a/b/d/e.txt", b"e").unwrap();
        assert_eq!(fs.move_path("/a/b", "/a").unwrap(), 2);
        assert!(!fs.path_exists("/a/b/"));
        assert_eq!(fs.read_file("/a/c.txt").unwrap(), b"c");
        assert_eq!(fs.read_file("/a/d/e.txt").unwrap(), b"e");
    }

    #[test]
    fn test_move_path_keeps_stored_bytes() {
        let store = MemoryStore::new();
        let fs = memory_fs(&store);
        fs.write_file("/a/x.txt", b"payload").unwrap();
        let before = fs.file("/a/x.txt").unwrap();
        fs.move_path("/a", "/z").unwrap();
        let after = fs.file("/z/x.txt").unwrap();
        assert_eq!(after.compressed_size, before.compressed_size);
        fs.save("img").unwrap();

        let reopened = memory_fs(&store);
        reopened.set_root("img").unwrap();
        reopened.mount_all().unwrap();
        assert_eq!(reopened.read_file("/z/x.txt").unwrap(), b"payload");
    }
}
