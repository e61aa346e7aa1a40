//! Seekable in-memory view of one file.

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use crate::error::{VfsError, VfsResult};
use crate::fs::FileSystem;
use crate::types::FileInfo;

/// A decoded file opened with [`FileSystem::open_stream`].
///
/// Reads and writes hit a private buffer. Nothing reaches the tree until
/// [`commit`](Self::commit).
#[derive(Debug)]
pub struct FileStream<'a> {
    fs: &'a FileSystem,
    path: String,
    cursor: Cursor<Vec<u8>>,
    read_only: bool,
    dirty: bool,
}

impl<'a> FileStream<'a> {
    pub(crate) fn new(fs: &'a FileSystem, path: String, data: Vec<u8>, read_only: bool) -> Self {
        Self {
            fs,
            path,
            cursor: Cursor::new(data),
            read_only,
            dirty: false,
        }
    }

    /// Full path of the file.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns true if writes are rejected.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Returns true if the buffer was written to since opening.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Buffer length in bytes.
    pub fn len(&self) -> u64 {
        self.cursor.get_ref().len() as u64
    }

    /// Returns true if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.cursor.get_ref().is_empty()
    }

    /// Shrink or zero-extend the buffer.
    pub fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.check_writable()?;
        self.cursor.get_mut().resize(len as usize, 0);
        self.dirty = true;
        Ok(())
    }

    /// The buffer contents.
    pub fn into_inner(self) -> Vec<u8> {
        self.cursor.into_inner()
    }

    /// Store the buffer back at the stream's path through `write_file`.
    pub fn commit(self) -> VfsResult<FileInfo> {
        if self.read_only {
            return Err(VfsError::ReadOnly);
        }
        let fs = self.fs;
        let path = self.path.clone();
        fs.write_file(&path, &self.into_inner())
    }

    fn check_writable(&self) -> io::Result<()> {
        if self.read_only {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                VfsError::ReadOnly,
            ));
        }
        Ok(())
    }
}

impl Read for FileStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Write for FileStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_writable()?;
        let n = self.cursor.write(buf)?;
        self.dirty |= n > 0;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for FileStream<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MemoryProvider, MemoryStore};

    fn fs_with(path: &str, data: &[u8]) -> FileSystem {
        let fs = FileSystem::new("stream", Box::new(MemoryProvider::new(MemoryStore::new())));
        fs.write_file(path, data).unwrap();
        fs
    }

    #[test]
    fn test_read_and_seek() {
        let fs = fs_with("/a.txt", b"hello world");
        let mut stream = fs.open_stream("/a.txt", true).unwrap();
        stream.seek(SeekFrom::Start(6)).unwrap();
        let mut rest = String::new();
        stream.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "world");
        assert_eq!(stream.len(), 11);
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let fs = fs_with("/a.txt", b"hello");
        let mut stream = fs.open_stream("/a.txt", true).unwrap();
        let err = stream.write(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert!(matches!(stream.commit(), Err(VfsError::ReadOnly)));
    }

    #[test]
    fn test_commit_writes_back() {
        let fs = fs_with("/a.txt", b"hello");
        let mut stream = fs.open_stream("/A.TXT", false).unwrap();
        stream.seek(SeekFrom::End(0)).unwrap();
        stream.write_all(b", there").unwrap();
        assert!(stream.is_dirty());
        let info = stream.commit().unwrap();
        assert_eq!(info.size, 12);
        assert_eq!(fs.read_file("/a.txt").unwrap(), b"hello, there");
    }

    #[test]
    fn test_uncommitted_changes_are_dropped() {
        let fs = fs_with("/a.txt", b"hello");
        {
            let mut stream = fs.open_stream("/a.txt", false).unwrap();
            stream.set_len(2).unwrap();
        }
        assert_eq!(fs.read_file("/a.txt").unwrap(), b"hello");
    }
}
