//! File system notifications.
//!
//! Listeners are plain closures registered on an [`EventBus`]. Delivery is
//! synchronous on the thread that performed the operation, after the file
//! system has released its locks, so a listener may call back into the same
//! instance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use strum::Display;

/// What happened to a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FsEvent {
    /// Bytes were decoded for a caller (`read_file`, `open_stream`).
    FileRead { path: String },
    /// A file was created or replaced by `write_file`.
    FileWrite { path: String },
    /// A provider loaded stored bytes during mount.
    DataLoad { path: String },
    /// Stored bytes were persisted during save.
    DataSave { path: String },
}

/// Discriminant of an [`FsEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
pub enum FsEventKind {
    FileRead,
    FileWrite,
    DataLoad,
    DataSave,
}

impl FsEvent {
    /// The event kind.
    pub fn kind(&self) -> FsEventKind {
        match self {
            FsEvent::FileRead { .. } => FsEventKind::FileRead,
            FsEvent::FileWrite { .. } => FsEventKind::FileWrite,
            FsEvent::DataLoad { .. } => FsEventKind::DataLoad,
            FsEvent::DataSave { .. } => FsEventKind::DataSave,
        }
    }

    /// Full path of the file the event concerns.
    pub fn path(&self) -> &str {
        match self {
            FsEvent::FileRead { path }
            | FsEvent::FileWrite { path }
            | FsEvent::DataLoad { path }
            | FsEvent::DataSave { path } => path,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&FsEvent) + Send + Sync>;

/// Ordered list of listeners.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventBus {
    /// Create a bus with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for every event.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&FsEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Register a listener for one kind of event.
    pub fn subscribe_kind<F>(&self, kind: FsEventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&FsEvent) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if event.kind() == kind {
                listener(event);
            }
        })
    }

    /// Remove a listener. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver `event` to every listener in subscription order.
    ///
    /// The listener list is snapshotted first, so listeners may subscribe or
    /// unsubscribe while being called.
    pub fn emit(&self, event: &FsEvent) {
        let snapshot: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    /// Deliver a batch in order.
    pub(crate) fn emit_all(&self, events: Vec<FsEvent>) {
        for event in &events {
            self.emit(event);
        }
    }
}
