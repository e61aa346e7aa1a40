//! Index document: the serialized tree minus payload bytes.
//!
//! The document is JSON with PascalCase keys:
//!
//! ```text
//! { "Header": "GORFS1.0",
//!   "Root": { "Name": "", "FullPath": "/",
//!             "Paths": [ { "Name": "a", "FullPath": "/a/", "Paths": [], "Files": [...] } ],
//!             "Files": [ { "Filename": "b", "Extension": ".txt", "Offset": 0,
//!                          "Size": 10, "CompressedSize": 10,
//!                          "FileDate": "2024-01-01T00:00:00Z",
//!                          "Encrypted": false, "Comment": "" } ] } }
//! ```
//!
//! Providers decide where the document lives physically; the header tag
//! identifies the provider format and must match exactly on load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{VfsError, VfsResult};
use crate::path;
use crate::tree::{NodeId, Tree};
use crate::types::FileEntry;

/// A whole index document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IndexDocument {
    /// Provider format tag.
    pub header: String,
    /// The root directory record.
    pub root: PathRecord,
}

/// One directory record, nested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PathRecord {
    pub name: String,
    pub full_path: String,
    #[serde(default)]
    pub paths: Vec<PathRecord>,
    #[serde(default)]
    pub files: Vec<FileRecord>,
}

/// Per-file metadata needed to locate and decode a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileRecord {
    pub filename: String,
    #[serde(default)]
    pub extension: String,
    #[serde(default)]
    pub offset: u64,
    pub size: u64,
    pub compressed_size: u64,
    pub file_date: DateTime<Utc>,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub comment: String,
}

impl FileRecord {
    fn from_entry(entry: &FileEntry) -> Self {
        Self {
            filename: entry.base_name.clone(),
            extension: entry.extension.clone(),
            offset: entry.offset,
            size: entry.size,
            compressed_size: entry.compressed_size,
            file_date: entry.timestamp,
            encrypted: entry.is_encrypted,
            comment: entry.comment.clone(),
        }
    }

    /// Build an unloaded [`FileEntry`] from this record.
    pub fn to_entry(&self) -> VfsResult<FileEntry> {
        let file_name = format!("{}{}", self.filename, self.extension);
        if self.filename.is_empty() || !path::valid_segment(&file_name) {
            return Err(VfsError::corrupt(format!(
                "invalid filename {file_name:?} in index"
            )));
        }
        Ok(FileEntry {
            base_name: self.filename.clone(),
            extension: self.extension.clone(),
            offset: self.offset,
            size: self.size,
            compressed_size: self.compressed_size,
            timestamp: self.file_date,
            is_encrypted: self.encrypted,
            comment: self.comment.clone(),
            data: None,
        })
    }

    /// Base name plus extension.
    pub fn file_name(&self) -> String {
        format!("{}{}", self.filename, self.extension)
    }
}

impl PathRecord {
    fn empty_root() -> Self {
        Self {
            name: String::new(),
            full_path: path::ROOT.to_string(),
            paths: Vec::new(),
            files: Vec::new(),
        }
    }

    fn from_node(tree: &Tree, id: NodeId) -> Self {
        let node = tree.node(id);
        Self {
            name: node.name.clone(),
            full_path: node.full_path.clone(),
            paths: tree
                .children(id)
                .map(|child| Self::from_node(tree, child))
                .collect(),
            files: tree
                .files_in(id)
                .map(|f| FileRecord::from_entry(tree.file(f)))
                .collect(),
        }
    }
}

impl IndexDocument {
    /// An index holding only an empty root.
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            root: PathRecord::empty_root(),
        }
    }

    /// Serialize a tree's structure and metadata.
    pub fn from_tree(tree: &Tree, header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            root: PathRecord::from_node(tree, Tree::ROOT),
        }
    }

    /// Parse a document and check its header tag.
    pub fn from_slice(bytes: &[u8], expected_header: &str) -> VfsResult<Self> {
        let doc: IndexDocument = serde_json::from_slice(bytes)?;
        doc.validate_header(expected_header)?;
        Ok(doc)
    }

    /// Serialize to pretty JSON bytes.
    pub fn to_vec(&self) -> VfsResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Fail with `HeaderInvalid` unless the tag matches exactly.
    pub fn validate_header(&self, expected: &str) -> VfsResult<()> {
        if self.header != expected {
            return Err(VfsError::HeaderInvalid {
                expected: expected.to_string(),
                found: self.header.clone(),
            });
        }
        Ok(())
    }

    /// Every directory record in document pre-order.
    pub fn records(&self) -> Vec<&PathRecord> {
        fn walk<'a>(record: &'a PathRecord, out: &mut Vec<&'a PathRecord>) {
            out.push(record);
            for child in &record.paths {
                walk(child, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.root, &mut out);
        out
    }

    /// Records whose path equals `dir`, or starts with it when `recurse`.
    pub fn select(&self, dir: &str, recurse: bool) -> Vec<&PathRecord> {
        self.records()
            .into_iter()
            .filter(|r| {
                if recurse {
                    path::starts_with(&r.full_path, dir)
                } else {
                    path::same(&r.full_path, dir)
                }
            })
            .collect()
    }

    /// Total number of file records.
    pub fn file_count(&self) -> usize {
        self.records().iter().map(|r| r.files.len()).sum()
    }
}
