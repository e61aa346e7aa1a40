//! # stratafs-core
//!
//! A virtual file system that overlays a directory tree on physical
//! storage. Key components:
//!
//! - [`FileSystem`] - Owns the tree; mount, read, write, delete, save
//! - [`Provider`] - How one physical format stores an index and payloads
//! - [`FolderProvider`] / [`PackProvider`] / [`MemoryProvider`] - Shipped formats
//! - [`VfsContext`] - Provider registry plus named instances
//! - [`EventBus`] - `FileRead`/`FileWrite`/`DataLoad`/`DataSave` notifications
//!
//! ## Design Decisions
//!
//! - **Arena tree**: directories and files live in flat arenas addressed by
//!   handles; callers get owned [`FileInfo`] snapshots, never references.
//! - **Case-insensitive paths**: `/Foo/Bar.txt` and `/foo/bar.TXT` are the
//!   same file. Normalized paths use `/` and directories end with `/`.
//! - **Stored bytes in memory**: a mounted file holds its encoded payload;
//!   decoding happens on read. Unmounting drops payloads but keeps metadata.
//! - **Contiguous offsets**: save reassigns offsets from zero so payloads
//!   pack back to back in traversal order.
//!
//! ```no_run
//! use stratafs_core::{ProviderOptions, VfsContext};
//!
//! let context = VfsContext::new();
//! let fs = context.create_file_system("game", "pack-deflate", &ProviderOptions::default())?;
//! fs.write_file("/characters/hero.txt", b"brave")?;
//! fs.save("game.pak")?;
//!
//! let copy = context.create_file_system("copy", "pack", &ProviderOptions::default())?;
//! copy.set_root("game.pak")?;
//! copy.mount_all()?;
//! assert_eq!(copy.read_file("/CHARACTERS/hero.txt")?, b"brave");
//! # Ok::<(), stratafs_core::VfsError>(())
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod fs;
pub mod index;
pub mod path;
pub mod provider;
pub mod registry;
pub mod stream;
pub mod tree;
pub mod types;

pub use codec::{Cipher, Compression};
pub use config::{ConfigError, VfsConfig};
pub use error::{VfsError, VfsResult};
pub use events::{EventBus, FsEvent, FsEventKind, SubscriptionId};
pub use fs::FileSystem;
pub use index::{FileRecord, IndexDocument, PathRecord};
pub use provider::{
    FolderProvider, MemoryProvider, MemoryStore, PackProvider, Provider, ProviderOptions,
};
pub use registry::{ProviderFactory, ProviderInfo, ProviderRegistry, VfsContext};
pub use stream::FileStream;
pub use types::{DirEntry, FileEntry, FileInfo, FileType};
