//! Arena-indexed path/file tree.
//!
//! Directory nodes and file entries live in flat arenas and refer to each
//! other through [`NodeId`] / [`FileId`] handles. Parent and owner links are
//! plain handles, so there is no shared ownership to untangle when a subtree
//! is dropped. Freed slots are reused.
//!
//! All `&str` paths accepted here are already normalized (see [`crate::path`]).

use indexmap::IndexMap;

use crate::error::{VfsError, VfsResult};
use crate::path::{self, SEPARATOR};
use crate::types::{DirEntry, FileEntry};

/// Handle to a directory node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Handle to a file entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(usize);

/// A directory in the virtual tree.
#[derive(Debug)]
pub struct PathNode {
    /// Leaf name; empty for the root.
    pub name: String,
    /// Normalized path, always `/`-terminated.
    pub full_path: String,
    parent: Option<NodeId>,
    children: IndexMap<String, NodeId>,
    files: IndexMap<String, FileId>,
}

impl PathNode {
    fn new(name: &str, full_path: String, parent: Option<NodeId>) -> Self {
        Self {
            name: name.to_string(),
            full_path,
            parent,
            children: IndexMap::new(),
            files: IndexMap::new(),
        }
    }

    /// The owning directory, `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

#[derive(Debug)]
struct FileSlot {
    owner: NodeId,
    entry: FileEntry,
}

/// Generic slot arena with a free list.
#[derive(Debug)]
struct Arena<T> {
    slots: Vec<Option<T>>,
    free: Vec<usize>,
}

impl<T> Arena<T> {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    fn insert(&mut self, value: T) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(value);
                idx
            }
            None => {
                self.slots.push(Some(value));
                self.slots.len() - 1
            }
        }
    }

    fn remove(&mut self, idx: usize) -> Option<T> {
        let value = self.slots.get_mut(idx)?.take();
        if value.is_some() {
            self.free.push(idx);
        }
        value
    }

    fn get(&self, idx: usize) -> Option<&T> {
        self.slots.get(idx)?.as_ref()
    }

    fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        self.slots.get_mut(idx)?.as_mut()
    }

    fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

/// The directory/file tree of one file system instance.
#[derive(Debug)]
pub struct Tree {
    nodes: Arena<PathNode>,
    files: Arena<FileSlot>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// The root node handle.
    pub const ROOT: NodeId = NodeId(0);

    /// Create a tree holding only the root directory.
    pub fn new() -> Self {
        let mut nodes = Arena::new();
        nodes.insert(PathNode::new("", path::ROOT.to_string(), None));
        Self {
            nodes,
            files: Arena::new(),
        }
    }

    /// Borrow a directory node. Handles come from this tree, so a stale
    /// handle is a logic error.
    pub fn node(&self, id: NodeId) -> &PathNode {
        self.nodes.get(id.0).expect("stale node handle")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut PathNode {
        self.nodes.get_mut(id.0).expect("stale node handle")
    }

    /// Borrow a file entry.
    pub fn file(&self, id: FileId) -> &FileEntry {
        &self.files.get(id.0).expect("stale file handle").entry
    }

    /// Mutably borrow a file entry.
    pub fn file_mut(&mut self, id: FileId) -> &mut FileEntry {
        &mut self.files.get_mut(id.0).expect("stale file handle").entry
    }

    /// The directory that owns a file.
    pub fn owner(&self, id: FileId) -> NodeId {
        self.files.get(id.0).expect("stale file handle").owner
    }

    /// Full path of a file: owner path plus file name.
    pub fn file_path(&self, id: FileId) -> String {
        let entry = self.file(id);
        format!(
            "{}{}{}",
            self.node(self.owner(id)).full_path,
            entry.base_name,
            entry.extension
        )
    }

    /// Number of directories, including the root.
    pub fn dir_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of files in the whole tree.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    // ========================================================================
    // Directories
    // ========================================================================

    /// Create every missing directory along `dir`. Idempotent.
    pub fn create_path(&mut self, dir: &str) -> NodeId {
        let mut current = Self::ROOT;
        for segment in path::dir_segments(dir) {
            let key = path::key(segment);
            let existing = self.node(current).children.get(&key).copied();
            current = match existing {
                Some(child) => child,
                None => {
                    let full_path =
                        format!("{}{}{}", self.node(current).full_path, segment, SEPARATOR);
                    let child = NodeId(
                        self.nodes
                            .insert(PathNode::new(segment, full_path, Some(current))),
                    );
                    self.node_mut(current).children.insert(key, child);
                    child
                }
            };
        }
        current
    }

    /// Resolve `dir` without creating anything.
    pub fn find_path(&self, dir: &str) -> Option<NodeId> {
        let mut current = Self::ROOT;
        for segment in path::dir_segments(dir) {
            current = *self.node(current).children.get(&path::key(segment))?;
        }
        Some(current)
    }

    /// Resolve `dir`, failing with `PathNotFound`.
    pub fn get_path(&self, dir: &str) -> VfsResult<NodeId> {
        self.find_path(dir)
            .ok_or_else(|| VfsError::path_not_found(dir))
    }

    /// Detach and free a directory with its whole subtree.
    ///
    /// Deleting the root empties the tree but keeps the root node.
    pub fn delete_path(&mut self, dir: &str) -> VfsResult<()> {
        let id = self.get_path(dir)?;
        match self.node(id).parent {
            None => self.clear(),
            Some(parent) => {
                let key = path::key(&self.node(id).name);
                self.node_mut(parent).children.shift_remove(&key);
                self.free_subtree(id);
            }
        }
        Ok(())
    }

    /// Remove every directory and file below the root.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    fn free_subtree(&mut self, id: NodeId) {
        let Some(node) = self.nodes.remove(id.0) else {
            return;
        };
        for file in node.files.values() {
            self.files.remove(file.0);
        }
        for child in node.children.values() {
            self.free_subtree(*child);
        }
    }

    /// Child directories of a node, in insertion order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.node(id).children.values().copied()
    }

    /// Files directly inside a node, in insertion order.
    pub fn files_in(&self, id: NodeId) -> impl Iterator<Item = FileId> + '_ {
        self.node(id).files.values().copied()
    }

    /// Directory listing: subdirectories first, then files.
    pub fn list(&self, id: NodeId) -> Vec<DirEntry> {
        let node = self.node(id);
        node.children
            .values()
            .map(|c| DirEntry::directory(self.node(*c).name.clone()))
            .chain(
                node.files
                    .values()
                    .map(|f| DirEntry::file(self.file(*f).file_name())),
            )
            .collect()
    }

    /// Every file at or below `id`, depth-first, children before files.
    pub fn files_under(&self, id: NodeId) -> Vec<FileId> {
        let mut out = Vec::new();
        self.collect_files(id, &mut out);
        out
    }

    fn collect_files(&self, id: NodeId, out: &mut Vec<FileId>) {
        let node = self.node(id);
        for child in node.children.values() {
            self.collect_files(*child, out);
        }
        out.extend(node.files.values().copied());
    }

    // ========================================================================
    // Files
    // ========================================================================

    /// Resolve a normalized file path.
    pub fn find_file(&self, full_file: &str) -> Option<FileId> {
        let (dir, name) = path::split_file(full_file);
        let node = self.find_path(dir)?;
        self.node(node).files.get(&path::key(name)).copied()
    }

    /// Insert `entry` under `owner`, replacing any file with the same name.
    pub fn insert_file(&mut self, owner: NodeId, entry: FileEntry) -> FileId {
        let key = path::key(&entry.file_name());
        if let Some(old) = self.node(owner).files.get(&key).copied() {
            self.files.remove(old.0);
        }
        let id = FileId(self.files.insert(FileSlot { owner, entry }));
        // Overwriting keeps the old slot's position in the listing.
        self.node_mut(owner).files.insert(key, id);
        id
    }

    /// Remove one file.
    pub fn remove_file(&mut self, id: FileId) -> Option<FileEntry> {
        let slot = self.files.remove(id.0)?;
        let key = path::key(&slot.entry.file_name());
        self.node_mut(slot.owner).files.shift_remove(&key);
        Some(slot.entry)
    }

    /// Remove the files directly inside a directory.
    pub fn clear_files(&mut self, id: NodeId) -> usize {
        let files: Vec<FileId> = self.node_mut(id).files.drain(..).map(|(_, f)| f).collect();
        for file in &files {
            self.files.remove(file.0);
        }
        files.len()
    }

    /// Remove every file in the tree, keeping directories.
    pub fn clear_all_files(&mut self) -> usize {
        let files = self.files_under(Self::ROOT);
        for file in &files {
            self.remove_file(*file);
        }
        files.len()
    }

    /// Rename a file within its directory.
    pub fn rename_file(&mut self, id: FileId, new_name: &str) -> VfsResult<()> {
        let owner = self.owner(id);
        let old_key = path::key(&self.file(id).file_name());
        let new_key = path::key(new_name);

        if new_key != old_key && self.node(owner).files.contains_key(&new_key) {
            return Err(VfsError::AlreadyExists(format!(
                "{}{}",
                self.node(owner).full_path,
                new_name
            )));
        }

        let (base, ext) = path::split_name(new_name);
        let entry = self.file_mut(id);
        entry.base_name = base.to_string();
        entry.extension = ext.to_string();

        let files = &mut self.node_mut(owner).files;
        if let Some(idx) = files.get_index_of(&old_key) {
            files.shift_remove_index(idx);
            files.shift_insert(idx, new_key, id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with(paths: &[&str]) -> Tree {
        let mut tree = Tree::new();
        for p in paths {
            let (dir, name) = path::split_file(p);
            let node = tree.create_path(dir);
            tree.insert_file(node, FileEntry::raw(name, p.as_bytes().to_vec()));
        }
        tree
    }

    #[test]
    fn test_create_path_is_idempotent() {
        let mut tree = Tree::new();
        let a = tree.create_path("/characters/hero/");
        let count = tree.dir_count();
        let b = tree.create_path("/characters/hero/");
        assert_eq!(a, b);
        assert_eq!(tree.dir_count(), count);
        assert_eq!(tree.dir_count(), 3);
    }

    #[test]
    fn test_full_path_follows_parent() {
        let mut tree = Tree::new();
        let id = tree.create_path("/characters/hero/");
        let node = tree.node(id);
        assert_eq!(node.full_path, "/characters/hero/");
        let parent = tree.node(node.parent().unwrap());
        assert_eq!(
            node.full_path,
            format!("{}{}/", parent.full_path, node.name)
        );
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let tree = tree_with(&["/Foo/Bar.txt"]);
        assert!(tree.find_path("/foo/").is_some());
        assert!(tree.find_file("/foo/bar.TXT").is_some());
    }

    #[test]
    fn test_root_resolves_without_lookup() {
        let tree = Tree::new();
        assert_eq!(tree.get_path("/").unwrap(), Tree::ROOT);
    }

    #[test]
    fn test_get_missing_path() {
        let tree = tree_with(&["/a/b.txt"]);
        assert!(matches!(tree.get_path("/a/c/"), Err(VfsError::PathNotFound(_))));
    }

    #[test]
    fn test_delete_path_frees_subtree() {
        let mut tree = tree_with(&["/a/b.txt", "/a/x/y.txt", "/keep.txt"]);
        tree.delete_path("/a/").unwrap();
        assert!(tree.find_path("/a/").is_none());
        assert!(tree.find_file("/a/b.txt").is_none());
        assert_eq!(tree.file_count(), 1);
        assert_eq!(tree.dir_count(), 1);
    }

    #[test]
    fn test_delete_root_clears() {
        let mut tree = tree_with(&["/a/b.txt", "/c.txt"]);
        tree.delete_path("/").unwrap();
        assert_eq!(tree.file_count(), 0);
        assert_eq!(tree.dir_count(), 1);
    }

    #[test]
    fn test_insert_overwrites_same_name() {
        let mut tree = tree_with(&["/a/b.txt"]);
        let node = tree.get_path("/a/").unwrap();
        tree.insert_file(node, FileEntry::raw("B.TXT", vec![1]));
        assert_eq!(tree.file_count(), 1);
        let id = tree.find_file("/a/b.txt").unwrap();
        assert_eq!(tree.file(id).data.as_deref(), Some(&[1u8][..]));
    }

    #[test]
    fn test_files_under_children_first() {
        let tree = tree_with(&["/top.txt", "/a/one.txt", "/a/b/two.txt", "/c/three.txt"]);
        let order: Vec<String> = tree
            .files_under(Tree::ROOT)
            .into_iter()
            .map(|f| tree.file_path(f))
            .collect();
        assert_eq!(
            order,
            vec!["/a/b/two.txt", "/a/one.txt", "/c/three.txt", "/top.txt"]
        );
    }

    #[test]
    fn test_slots_are_reused() {
        let mut tree = tree_with(&["/a/b.txt"]);
        let id = tree.find_file("/a/b.txt").unwrap();
        tree.remove_file(id);
        let node = tree.get_path("/a/").unwrap();
        let again = tree.insert_file(node, FileEntry::raw("c.txt", vec![]));
        assert_eq!(again, id);
        assert_eq!(tree.file_path(again), "/a/c.txt");
    }

    #[test]
    fn test_rename_file() {
        let mut tree = tree_with(&["/a/b.txt", "/a/c.txt"]);
        let id = tree.find_file("/a/b.txt").unwrap();
        assert!(matches!(tree.rename_file(id, "C.txt"), Err(VfsError::AlreadyExists(_))));
        tree.rename_file(id, "renamed.dat").unwrap();
        assert_eq!(tree.file_path(id), "/a/renamed.dat");
        assert!(tree.find_file("/a/b.txt").is_none());
        assert_eq!(tree.find_file("/a/RENAMED.dat"), Some(id));
    }

    #[test]
    fn test_list() {
        let tree = tree_with(&["/a/x.txt", "/a/sub/y.txt"]);
        let id = tree.get_path("/a/").unwrap();
        assert_eq!(
            tree.list(id),
            vec![DirEntry::directory("sub"), DirEntry::file("x.txt")]
        );
    }
}
