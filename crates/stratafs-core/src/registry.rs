//! Provider registry and the context that owns named instances.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec::Compression;
use crate::config::VfsConfig;
use crate::error::{VfsError, VfsResult};
use crate::fs::FileSystem;
use crate::path;
use crate::provider::{
    FolderProvider, MemoryProvider, MemoryStore, PackProvider, Provider, ProviderOptions,
};

/// Builds a provider from options.
pub type ProviderFactory = Arc<dyn Fn(&ProviderOptions) -> Box<dyn Provider> + Send + Sync>;

/// Name and description of a registered provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub description: String,
}

struct Registered {
    info: ProviderInfo,
    factory: ProviderFactory,
}

/// Provider factories keyed by case-insensitive name.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: IndexMap<String, Registered>,
    default_provider: Option<String>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.factories.keys().collect::<Vec<_>>())
            .field("default_provider", &self.default_provider)
            .finish()
    }
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `folder`, `pack`, `pack-deflate`, `pack-lz4` and
    /// `memory` (backed by `memory`). The default is `folder`.
    pub fn with_builtins(memory: MemoryStore) -> Self {
        let mut registry = Self::new();
        registry.register(
            FolderProvider::NAME,
            "Host directory with one file per entry",
            |options: &ProviderOptions| {
                let provider = match &options.index_file {
                    Some(index_file) => FolderProvider::new().with_index_file(index_file.clone()),
                    None => FolderProvider::new(),
                };
                Box::new(provider) as Box<dyn Provider>
            },
        );
        for (name, compression, description) in [
            (PackProvider::NAME, Compression::None, "Single-file archive"),
            ("pack-deflate", Compression::Deflate, "Single-file archive, deflate payloads"),
            ("pack-lz4", Compression::Lz4, "Single-file archive, LZ4 payloads"),
        ] {
            registry.register(name, description, move |options: &ProviderOptions| {
                Box::new(PackProvider::from_options(options, compression)) as Box<dyn Provider>
            });
        }
        registry.register(
            MemoryProvider::NAME,
            "Ephemeral in-memory images",
            move |_: &ProviderOptions| {
                Box::new(MemoryProvider::new(memory.clone())) as Box<dyn Provider>
            },
        );
        registry.default_provider = Some(FolderProvider::NAME.to_string());
        registry
    }

    /// Register a factory. Returns true if it replaced an existing one.
    pub fn register<F>(&mut self, name: &str, description: &str, factory: F) -> bool
    where
        F: Fn(&ProviderOptions) -> Box<dyn Provider> + Send + Sync + 'static,
    {
        let registered = Registered {
            info: ProviderInfo {
                name: name.to_string(),
                description: description.to_string(),
            },
            factory: Arc::new(factory),
        };
        self.factories
            .insert(path::key(name), registered)
            .is_some()
    }

    /// Remove a factory.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.factories.shift_remove(&path::key(name)).is_some()
    }

    /// Returns true if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&path::key(name))
    }

    /// Build a provider by name.
    pub fn create(&self, name: &str, options: &ProviderOptions) -> VfsResult<Box<dyn Provider>> {
        let registered = self
            .factories
            .get(&path::key(name))
            .ok_or_else(|| VfsError::ProviderNotFound(name.to_string()))?;
        Ok((registered.factory)(options))
    }

    /// Set the provider used when none is named.
    pub fn set_default(&mut self, name: &str) -> bool {
        if self.contains(name) {
            self.default_provider = Some(name.to_string());
            true
        } else {
            false
        }
    }

    /// Name of the default provider.
    pub fn default_provider(&self) -> Option<&str> {
        self.default_provider.as_deref()
    }

    /// All registered providers, in registration order.
    pub fn list(&self) -> Vec<ProviderInfo> {
        self.factories.values().map(|r| r.info.clone()).collect()
    }
}

/// Owns the provider registry and the table of named file systems.
///
/// Create one at startup and drop it (or call [`shutdown`](Self::shutdown))
/// at exit. The two tables have their own locks, separate from any
/// instance's tree lock; when both are needed the instance table is locked
/// first.
#[derive(Debug)]
pub struct VfsContext {
    providers: RwLock<ProviderRegistry>,
    instances: RwLock<IndexMap<String, Arc<FileSystem>>>,
    memory: MemoryStore,
}

impl Default for VfsContext {
    fn default() -> Self {
        Self::new()
    }
}

impl VfsContext {
    /// Context with the built-in providers.
    pub fn new() -> Self {
        let memory = MemoryStore::new();
        Self {
            providers: RwLock::new(ProviderRegistry::with_builtins(memory.clone())),
            instances: RwLock::new(IndexMap::new()),
            memory,
        }
    }

    /// Context with the built-in providers and the configured default.
    pub fn from_config(config: &VfsConfig) -> VfsResult<Self> {
        let context = Self::new();
        if !context.providers.write().set_default(&config.provider) {
            return Err(VfsError::ProviderNotFound(config.provider.clone()));
        }
        Ok(context)
    }

    /// Context around a caller-built registry.
    pub fn with_registry(registry: ProviderRegistry) -> Self {
        Self {
            providers: RwLock::new(registry),
            instances: RwLock::new(IndexMap::new()),
            memory: MemoryStore::new(),
        }
    }

    /// Storage behind the built-in `memory` provider.
    pub fn memory_store(&self) -> &MemoryStore {
        &self.memory
    }

    /// Register a provider factory.
    pub fn register_provider<F>(&self, name: &str, description: &str, factory: F) -> bool
    where
        F: Fn(&ProviderOptions) -> Box<dyn Provider> + Send + Sync + 'static,
    {
        self.providers.write().register(name, description, factory)
    }

    /// Registered providers.
    pub fn providers(&self) -> Vec<ProviderInfo> {
        self.providers.read().list()
    }

    /// Name of the default provider.
    pub fn default_provider(&self) -> Option<String> {
        self.providers.read().default_provider().map(str::to_string)
    }

    /// Build a detached provider.
    pub fn create_provider(
        &self,
        name: &str,
        options: &ProviderOptions,
    ) -> VfsResult<Box<dyn Provider>> {
        self.providers.read().create(name, options)
    }

    /// Get the file system called `name`, creating it with `provider` if
    /// it does not exist yet.
    ///
    /// An existing instance is returned as-is even if it was created with a
    /// different provider.
    pub fn create_file_system(
        &self,
        name: &str,
        provider: &str,
        options: &ProviderOptions,
    ) -> VfsResult<Arc<FileSystem>> {
        if name.trim().is_empty() {
            return Err(VfsError::NameInvalid(name.to_string()));
        }

        let mut instances = self.instances.write();
        if let Some(existing) = instances.get(name) {
            if !existing.provider_name().eq_ignore_ascii_case(provider) {
                warn!(
                    name,
                    requested = provider,
                    bound = %existing.provider_name(),
                    "file system exists with another provider"
                );
            }
            return Ok(Arc::clone(existing));
        }

        let provider = self.providers.read().create(provider, options)?;
        let fs = Arc::new(FileSystem::new(name, provider));
        instances.insert(name.to_string(), Arc::clone(&fs));
        info!(name, provider = %fs.provider_name(), "file system created");
        Ok(fs)
    }

    /// Like [`create_file_system`](Self::create_file_system) with the
    /// default provider.
    pub fn create_default(&self, name: &str, options: &ProviderOptions) -> VfsResult<Arc<FileSystem>> {
        let provider = self
            .default_provider()
            .ok_or_else(|| VfsError::ProviderNotFound("<default>".into()))?;
        self.create_file_system(name, &provider, options)
    }

    /// Look up an instance.
    pub fn get(&self, name: &str) -> Option<Arc<FileSystem>> {
        self.instances.read().get(name).cloned()
    }

    /// Remove an instance from the table. Outstanding handles stay usable.
    pub fn remove(&self, name: &str) -> Option<Arc<FileSystem>> {
        let removed = self.instances.write().shift_remove(name);
        if removed.is_some() {
            debug!(name, "file system removed");
        }
        removed
    }

    /// Instance names in creation order.
    pub fn names(&self) -> Vec<String> {
        self.instances.read().keys().cloned().collect()
    }

    /// Drop every instance.
    pub fn shutdown(&self) {
        let mut instances = self.instances.write();
        let count = instances.len();
        instances.clear();
        info!(count, "context shut down");
    }
}
