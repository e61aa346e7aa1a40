//! Packed archive provider.
//!
//! A physical root is a single host file:
//!
//! ```text
//! magic        "SFPK"
//! version      u16 LE
//! compression  u8      (see Compression::to_byte)
//! flags        u8      bit 0: encrypted
//! salt         [u8;16] only when encrypted
//! index_len    u32 LE
//! index        JSON index document, encrypted when flags bit 0 is set
//! payloads     contiguous stored bytes; index offsets are relative to here
//! ```
//!
//! An archive's compression and salt win over the provider's configured
//! ones once it is opened, so entries already in the tree and entries
//! written afterwards share one codec.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, warn};

use super::{stored_bytes, Provider, ProviderOptions};
use crate::codec::{Cipher, Compression, SALT_LEN};
use crate::error::{VfsError, VfsResult};
use crate::index::IndexDocument;
use crate::types::FileEntry;

const MAGIC: &[u8; 4] = b"SFPK";
const VERSION: u16 = 1;
const FLAG_ENCRYPTED: u8 = 0x01;
/// Upper bound on the index block, to reject garbage lengths early.
const MAX_INDEX_LEN: u32 = 256 * 1024 * 1024;

/// Archive currently being written.
#[derive(Debug)]
struct PendingWrite {
    out: BufWriter<File>,
    written: u64,
    payload_start: u64,
}

impl PendingWrite {
    fn write(&mut self, bytes: &[u8]) -> VfsResult<()> {
        self.out.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }
}

/// Single-file archive provider with optional compression and encryption.
#[derive(Debug)]
pub struct PackProvider {
    compression: Compression,
    level: u32,
    password: Option<String>,
    salt: [u8; SALT_LEN],
    cipher: Option<Cipher>,
    archive: Option<PathBuf>,
    payload_start: u64,
    pending: Option<PendingWrite>,
    saved_payload_start: u64,
}

impl Default for PackProvider {
    fn default() -> Self {
        Self::new(Compression::None)
    }
}

impl PackProvider {
    /// Registry name of the uncompressed variant.
    pub const NAME: &'static str = "pack";
    /// Index header tag.
    pub const HEADER: &'static str = "GORPACK1.0";
    /// Default deflate level.
    pub const DEFAULT_LEVEL: u32 = 6;

    /// Create an unencrypted provider using `compression` for new archives.
    pub fn new(compression: Compression) -> Self {
        Self {
            compression,
            level: Self::DEFAULT_LEVEL,
            password: None,
            salt: [0; SALT_LEN],
            cipher: None,
            archive: None,
            payload_start: 0,
            pending: None,
            saved_payload_start: 0,
        }
    }

    /// Build from factory options, falling back to `default_compression`.
    pub fn from_options(options: &ProviderOptions, default_compression: Compression) -> Self {
        let provider = Self::new(options.compression.unwrap_or(default_compression))
            .with_level(options.compression_level);
        match &options.password {
            Some(password) => provider.with_password(password),
            None => provider,
        }
    }

    /// Set the deflate level (clamped to 9).
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level.min(9);
        self
    }

    /// Encrypt new archives with `password`, using a fresh salt.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        let password = password.into();
        self.salt = Cipher::random_salt();
        self.cipher = Some(Cipher::from_password(&password, &self.salt));
        self.password = Some(password);
        self
    }

    /// Compression currently applied to new payloads.
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Returns true if new payloads are encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    fn cipher(&self) -> VfsResult<&Cipher> {
        self.cipher
            .as_ref()
            .ok_or_else(|| VfsError::AccessDenied("no password supplied".into()))
    }

    fn read_payload(&self, full_path: &str, entry: &FileEntry) -> VfsResult<Vec<u8>> {
        let archive = self
            .archive
            .as_deref()
            .ok_or_else(|| VfsError::root_invalid("<unassigned>"))?;
        let mut file = File::open(archive)?;
        let start = self.payload_start.checked_add(entry.offset);
        let end = start.and_then(|s| s.checked_add(entry.stored_size()));
        let (Some(start), Some(end)) = (start, end) else {
            return Err(VfsError::corrupt(format!("{full_path} has an impossible extent")));
        };
        if end > file.metadata()?.len() {
            return Err(VfsError::corrupt(format!("{full_path} lies past end of archive")));
        }
        file.seek(SeekFrom::Start(start))?;
        let mut buf = vec![0u8; (end - start) as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn unlock_index(&mut self, encrypted: bool, salt: [u8; SALT_LEN], block: Vec<u8>) -> VfsResult<Vec<u8>> {
        if !encrypted {
            return Ok(block);
        }
        let password = self
            .password
            .as_deref()
            .ok_or_else(|| VfsError::AccessDenied("archive is encrypted".into()))?;
        let cipher = Cipher::from_password(password, &salt);
        let plain = cipher
            .decrypt(&block)
            .map_err(|_| VfsError::AccessDenied("wrong password".into()))?;
        self.salt = salt;
        self.cipher = Some(cipher);
        Ok(plain)
    }
}

impl Provider for PackProvider {
    fn name(&self) -> &str {
        match self.compression {
            Compression::None => Self::NAME,
            Compression::Deflate => "pack-deflate",
            Compression::Lz4 => "pack-lz4",
        }
    }

    fn header(&self) -> &str {
        Self::HEADER
    }

    fn description(&self) -> &str {
        "Single-file archive with optional compression and encryption"
    }

    fn read_index(&mut self, root: &Path) -> VfsResult<IndexDocument> {
        if !root.is_file() {
            return Err(VfsError::root_invalid(root.display().to_string()));
        }
        let mut reader = BufReader::new(File::open(root)?);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(VfsError::HeaderInvalid {
                expected: String::from_utf8_lossy(MAGIC).into_owned(),
                found: String::from_utf8_lossy(&magic).into_owned(),
            });
        }
        let version = reader.read_u16::<LittleEndian>()?;
        if version > VERSION {
            return Err(VfsError::corrupt(format!("unsupported archive version {version}")));
        }
        let compression = Compression::from_byte(reader.read_u8()?)?;
        let encrypted = reader.read_u8()? & FLAG_ENCRYPTED != 0;
        let mut salt = [0u8; SALT_LEN];
        if encrypted {
            reader.read_exact(&mut salt)?;
        }
        let index_len = reader.read_u32::<LittleEndian>()?;
        if index_len > MAX_INDEX_LEN {
            return Err(VfsError::corrupt(format!("index length {index_len} out of range")));
        }
        let mut block = vec![0u8; index_len as usize];
        reader.read_exact(&mut block)?;

        let plain = self.unlock_index(encrypted, salt, block)?;
        let index = IndexDocument::from_slice(&plain, Self::HEADER).map_err(|e| match e {
            VfsError::Index(_) if encrypted => VfsError::AccessDenied("wrong password".into()),
            other => other,
        })?;

        if compression != self.compression {
            debug!(configured = %self.compression, archive = %compression, "adopting archive compression");
        }
        if !encrypted && self.cipher.is_some() {
            warn!(root = %root.display(), "archive is not encrypted; new payloads will be");
        }
        self.compression = compression;
        self.payload_start = reader.stream_position()?;
        self.archive = Some(root.to_path_buf());
        debug!(
            root = %root.display(),
            files = index.file_count(),
            payload_start = self.payload_start,
            "pack index read"
        );
        Ok(index)
    }

    fn set_root(&mut self, root: &Path) {
        self.archive = Some(root.to_path_buf());
        self.payload_start = self.saved_payload_start;
    }

    fn load(&self, full_path: &str, entry: &mut FileEntry) -> VfsResult<bool> {
        entry.data = Some(self.read_payload(full_path, entry)?);
        Ok(true)
    }

    fn decode(&self, full_path: &str, entry: &FileEntry) -> VfsResult<Vec<u8>> {
        let stored = match &entry.data {
            Some(data) => data.clone(),
            None => self.read_payload(full_path, entry)?,
        };
        let plain = if entry.is_encrypted {
            self.cipher()?.decrypt(&stored)?
        } else {
            stored
        };
        if plain.len() as u64 == entry.size {
            Ok(plain)
        } else {
            self.compression.decompress(&plain, entry.size as usize)
        }
    }

    fn encode(&self, file_name: &str, data: &[u8]) -> VfsResult<FileEntry> {
        let packed = self.compression.compress(data, self.level)?;
        let stored = if packed.len() < data.len() {
            packed
        } else {
            data.to_vec()
        };
        let (stored, is_encrypted) = match &self.cipher {
            Some(cipher) => (cipher.encrypt(&stored), true),
            None => (stored, false),
        };
        let mut entry = FileEntry::raw(file_name, stored);
        entry.size = data.len() as u64;
        entry.is_encrypted = is_encrypted;
        Ok(entry)
    }

    fn save_initialize(&mut self, root: &Path) -> VfsResult<()> {
        if let Some(parent) = root.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        self.pending = Some(PendingWrite {
            out: BufWriter::new(File::create(root)?),
            written: 0,
            payload_start: 0,
        });
        Ok(())
    }

    fn save_index(&mut self, _root: &Path, index: &IndexDocument) -> VfsResult<()> {
        let json = index.to_vec()?;
        let block = match &self.cipher {
            Some(cipher) => cipher.encrypt(&json),
            None => json,
        };
        let index_len = u32::try_from(block.len())
            .ok()
            .filter(|len| *len <= MAX_INDEX_LEN)
            .ok_or_else(|| VfsError::corrupt("index too large"))?;

        let mut head = Vec::with_capacity(8 + SALT_LEN + 4);
        head.extend_from_slice(MAGIC);
        head.write_u16::<LittleEndian>(VERSION)?;
        head.write_u8(self.compression.to_byte())?;
        if self.cipher.is_some() {
            head.write_u8(FLAG_ENCRYPTED)?;
            head.extend_from_slice(&self.salt);
        } else {
            head.write_u8(0)?;
        }
        head.write_u32::<LittleEndian>(index_len)?;

        let pending = self
            .pending
            .as_mut()
            .ok_or_else(|| VfsError::corrupt("save_index before save_initialize"))?;
        pending.write(&head)?;
        pending.write(&block)?;
        pending.payload_start = pending.written;
        self.saved_payload_start = pending.payload_start;
        Ok(())
    }

    fn save_file_data(
        &mut self,
        _root: &Path,
        full_path: &str,
        entry: &FileEntry,
    ) -> VfsResult<()> {
        let bytes = stored_bytes(full_path, entry)?;
        let pending = self
            .pending
            .as_mut()
            .ok_or_else(|| VfsError::corrupt("save_file_data before save_initialize"))?;
        let at = pending.written - pending.payload_start;
        if at != entry.offset || bytes.len() as u64 != entry.stored_size() {
            return Err(VfsError::corrupt(format!(
                "{full_path}: {} bytes at {at}, index says {} at {}",
                bytes.len(),
                entry.stored_size(),
                entry.offset
            )));
        }
        pending.write(bytes)
    }

    fn save_finalize(&mut self) -> VfsResult<()> {
        if let Some(mut pending) = self.pending.take() {
            pending.out.flush()?;
        }
        Ok(())
    }
}
