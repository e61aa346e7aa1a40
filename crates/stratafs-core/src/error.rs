//! VFS error types.

use std::io;
use thiserror::Error;

/// VFS error type.
///
/// Validation errors (`PathInvalid`, `FilenameInvalid`) are returned before
/// any mutation happens. Operation errors (`MountFailed`, `SaveFailed`, ...)
/// wrap the originating cause together with the operation's target path.
#[derive(Debug, Error)]
pub enum VfsError {
    /// A directory path contains an illegal segment or character.
    #[error("invalid path: {0}")]
    PathInvalid(String),

    /// A directory path does not exist in the tree.
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// A file path is empty, ends with a separator, or has illegal characters.
    #[error("invalid filename: {0}")]
    FilenameInvalid(String),

    /// A file path does not exist in the tree.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// The index header tag does not match the provider's format tag.
    #[error("invalid index header: expected {expected:?}, found {found:?}")]
    HeaderInvalid { expected: String, found: String },

    /// The physical root is empty or could not be opened.
    #[error("invalid root: {root}")]
    RootInvalid {
        root: String,
        #[source]
        source: Option<Box<VfsError>>,
    },

    /// A file has no in-memory payload to persist.
    #[error("file has no data: {0}")]
    MissingData(String),

    /// Mounting a path failed.
    #[error("cannot mount {path}")]
    MountFailed {
        path: String,
        #[source]
        source: Box<VfsError>,
    },

    /// Saving to a physical root failed.
    #[error("cannot save the file system to {path}")]
    SaveFailed {
        path: String,
        #[source]
        source: Box<VfsError>,
    },

    /// Writing a file failed.
    #[error("cannot write {path}")]
    WriteFailed {
        path: String,
        #[source]
        source: Box<VfsError>,
    },

    /// Reading a file failed.
    #[error("cannot read {path}")]
    ReadFailed {
        path: String,
        #[source]
        source: Box<VfsError>,
    },

    /// Deleting a file failed.
    #[error("cannot delete {path}")]
    DeleteFailed {
        path: String,
        #[source]
        source: Box<VfsError>,
    },

    /// No provider registered under this name.
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    /// An instance or provider name is empty.
    #[error("invalid name: {0:?}")]
    NameInvalid(String),

    /// The path is claimed by the provider's own storage layout.
    #[error("reserved by provider: {0}")]
    NameReserved(String),

    /// Target of a rename already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The archive could not be unlocked with the supplied password.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Physical storage is inconsistent with its index.
    #[error("corrupt file system: {0}")]
    Corrupt(String),

    /// A payload could not be compressed, decompressed, encrypted or decrypted.
    #[error("codec error: {0}")]
    Codec(String),

    /// The stream was opened read-only.
    #[error("stream is read-only")]
    ReadOnly,

    /// Index document (de)serialization error.
    #[error("index error: {0}")]
    Index(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl VfsError {
    /// Create a PathInvalid error.
    pub fn path_invalid(path: impl Into<String>) -> Self {
        Self::PathInvalid(path.into())
    }

    /// Create a PathNotFound error.
    pub fn path_not_found(path: impl Into<String>) -> Self {
        Self::PathNotFound(path.into())
    }

    /// Create a FilenameInvalid error.
    pub fn filename_invalid(path: impl Into<String>) -> Self {
        Self::FilenameInvalid(path.into())
    }

    /// Create a FileNotFound error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound(path.into())
    }

    /// Create a RootInvalid error without a cause.
    pub fn root_invalid(root: impl Into<String>) -> Self {
        Self::RootInvalid {
            root: root.into(),
            source: None,
        }
    }

    /// Create a Corrupt error.
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    /// Create a Codec error.
    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    pub(crate) fn mount_failed(path: impl Into<String>, source: VfsError) -> Self {
        Self::MountFailed {
            path: path.into(),
            source: Box::new(source),
        }
    }

    pub(crate) fn save_failed(path: impl Into<String>, source: VfsError) -> Self {
        Self::SaveFailed {
            path: path.into(),
            source: Box::new(source),
        }
    }

    pub(crate) fn write_failed(path: impl Into<String>, source: VfsError) -> Self {
        Self::WriteFailed {
            path: path.into(),
            source: Box::new(source),
        }
    }

    pub(crate) fn read_failed(path: impl Into<String>, source: VfsError) -> Self {
        Self::ReadFailed {
            path: path.into(),
            source: Box::new(source),
        }
    }

    pub(crate) fn delete_failed(path: impl Into<String>, source: VfsError) -> Self {
        Self::DeleteFailed {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Walk through operation wrappers to the error that started it all.
    pub fn root_cause(&self) -> &VfsError {
        match self {
            VfsError::MountFailed { source, .. }
            | VfsError::SaveFailed { source, .. }
            | VfsError::WriteFailed { source, .. }
            | VfsError::ReadFailed { source, .. }
            | VfsError::DeleteFailed { source, .. } => source.root_cause(),
            VfsError::RootInvalid {
                source: Some(source),
                ..
            } => source.root_cause(),
            other => other,
        }
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::PathNotFound(msg) | VfsError::FileNotFound(msg) => {
                io::Error::new(io::ErrorKind::NotFound, msg)
            }
            VfsError::PathInvalid(msg) | VfsError::FilenameInvalid(msg) => {
                io::Error::new(io::ErrorKind::InvalidInput, msg)
            }
            VfsError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            VfsError::AccessDenied(msg) => io::Error::new(io::ErrorKind::PermissionDenied, msg),
            VfsError::ReadOnly => {
                io::Error::new(io::ErrorKind::PermissionDenied, "stream is read-only")
            }
            VfsError::Corrupt(msg) | VfsError::Codec(msg) => {
                io::Error::new(io::ErrorKind::InvalidData, msg)
            }
            VfsError::Io(e) => e,
            other => io::Error::other(other.to_string()),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_nested_wrappers() {
        let err = VfsError::save_failed(
            "/tmp/out",
            VfsError::write_failed("/a.txt", VfsError::MissingData("/a.txt".into())),
        );
        assert!(matches!(err.root_cause(), VfsError::MissingData(p) if p == "/a.txt"));
    }

    #[test]
    fn test_root_cause_of_plain_error_is_itself() {
        let err = VfsError::file_not_found("/nope.txt");
        assert!(matches!(err.root_cause(), VfsError::FileNotFound(_)));
    }

    #[test]
    fn test_io_conversion() {
        let io_err: io::Error = VfsError::file_not_found("/x").into();
        assert_eq!(io_err.kind(), io::ErrorKind::NotFound);

        let io_err: io::Error = VfsError::ReadOnly.into();
        assert_eq!(io_err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_display_carries_path() {
        let err = VfsError::mount_failed("/characters/", VfsError::path_not_found("/characters/"));
        assert_eq!(err.to_string(), "cannot mount /characters/");
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("path not found: /characters/"));
    }
}
