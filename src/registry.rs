//! Drawer registry with atomic snapshot publication.
//!
//! Writers serialize on a mutex, copy the published list, apply their change
//! and publish the new list with a single pointer swap. Readers load the
//! current list without locking and keep it alive for as long as they hold
//! the [`DrawerSnapshot`], so a frame in flight is never affected by
//! registrations made while it runs.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

/// Handle returned by [`DrawerRegistry::register`].
pub type DrawerId = u32;

/// Per-frame draw callback.
pub type DrawFn = dyn Fn(&egui::Context) + Send + Sync + 'static;

/// A registered draw callback. Immutable once created.
pub struct DrawEntry {
    id: DrawerId,
    key: String,
    callback: Box<DrawFn>,
}

impl DrawEntry {
    pub fn id(&self) -> DrawerId {
        self.id
    }

    /// Human-readable label; empty for unnamed entries.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Run the callback against the current widget frame.
    pub fn invoke(&self, ctx: &egui::Context) {
        (self.callback)(ctx);
    }
}

impl fmt::Debug for DrawEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawEntry")
            .field("id", &self.id)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

type EntryList = Vec<Arc<DrawEntry>>;

/// Immutable view of the registry at one point in time.
#[derive(Clone, Default)]
pub struct DrawerSnapshot {
    entries: Arc<EntryList>,
}

impl DrawerSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in draw order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<DrawEntry>> {
        self.entries.iter()
    }

    pub fn ids(&self) -> Vec<DrawerId> {
        self.entries.iter().map(|e| e.id).collect()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.key.as_str()).collect()
    }

    /// Whether both snapshots share the same published list.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

impl fmt::Debug for DrawerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}

/// Copy-on-write registry of draw callbacks.
pub struct DrawerRegistry {
    /// Last id handed out; also serializes all writers.
    last_id: Mutex<DrawerId>,
    published: ArcSwap<EntryList>,
}

impl DrawerRegistry {
    pub fn new() -> Self {
        Self {
            last_id: Mutex::new(0),
            published: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Append a callback and return its id.
    ///
    /// Ids start at 1 and increase by one per registration. They are never
    /// reused; wrapping after `u32::MAX` registrations is not handled.
    pub fn register<F>(&self, key: impl Into<String>, callback: F) -> DrawerId
    where
        F: Fn(&egui::Context) + Send + Sync + 'static,
    {
        let mut last_id = self.last_id.lock();
        *last_id = last_id.wrapping_add(1);
        let entry = Arc::new(DrawEntry {
            id: *last_id,
            key: key.into(),
            callback: Box::new(callback),
        });

        let current = self.published.load();
        let mut next = EntryList::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(entry);
        self.published.store(Arc::new(next));

        log::debug!("Registered drawer {}", *last_id);
        *last_id
    }

    /// Remove the entry with `id`. Returns whether anything was removed.
    pub fn unregister(&self, id: DrawerId) -> bool {
        let _writer = self.last_id.lock();
        let current = self.published.load();
        let Some(pos) = current.iter().position(|e| e.id == id) else {
            return false;
        };

        let mut next: EntryList = (**current).clone();
        next.remove(pos);
        self.published.store(Arc::new(next));

        log::debug!("Unregistered drawer {}", id);
        true
    }

    /// Remove every entry whose key equals `key`. Returns how many were removed.
    pub fn unregister_key(&self, key: &str) -> usize {
        let _writer = self.last_id.lock();
        let current = self.published.load();
        let next: EntryList = current.iter().filter(|e| e.key != key).cloned().collect();
        let removed = current.len() - next.len();
        if removed > 0 {
            self.published.store(Arc::new(next));
            log::debug!("Unregistered {} drawer(s) with key {:?}", removed, key);
        }
        removed
    }

    /// Publish an empty list.
    pub fn clear(&self) {
        let _writer = self.last_id.lock();
        self.published.store(Arc::new(Vec::new()));
    }

    /// Lock-free read of the currently published list.
    pub fn snapshot(&self) -> DrawerSnapshot {
        DrawerSnapshot {
            entries: self.published.load_full(),
        }
    }
}

impl Default for DrawerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DrawerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawerRegistry")
            .field("drawers", &self.snapshot())
            .finish()
    }
}
