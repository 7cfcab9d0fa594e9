//! Per-session registry of file change watchers
//!
//! Callbacks are keyed by file name. Subscribing returns a [`Subscription`]
//! guard; dropping the guard removes the callback. The registry is owned by the
//! session that created it, so tearing down a session drops every watcher.
//!
//! # Usage
//!
//! ```ignore
//! use vue_virtual_docs::bridge::WatcherRegistry;
//!
//! let watchers = WatcherRegistry::new();
//! let subscription = watchers.subscribe("/src/Foo.vue", Arc::new(|changes, version| {
//!     println!("{} change(s) at version {}", changes.len(), version);
//! }));
//!
//! watchers.notify("/src/Foo.vue", &changes, 2);
//! drop(subscription); // no more callbacks
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use lsp_types::TextDocumentContentChangeEvent;
use tracing::trace;

/// Called with the changes and the new version of a watched file.
pub type ChangeCallback = Arc<dyn Fn(&[TextDocumentContentChangeEvent], i32) + Send + Sync>;

/// Callbacks registered per file name
#[derive(Default)]
pub struct WatcherRegistry {
    watchers: DashMap<String, Vec<(u64, ChangeCallback)>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for WatcherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherRegistry")
            .field("files", &self.watchers.len())
            .finish()
    }
}

impl WatcherRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `callback` for changes to `file_name`.
    pub fn subscribe(self: &Arc<Self>, file_name: &str, callback: ChangeCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.watchers
            .entry(file_name.to_string())
            .or_default()
            .push((id, callback));
        trace!("Watch {} (#{})", file_name, id);
        Subscription {
            registry: Arc::downgrade(self),
            file_name: file_name.to_string(),
            id,
        }
    }

    /// Invokes every callback registered for `file_name`; returns how many ran.
    pub fn notify(
        &self,
        file_name: &str,
        changes: &[TextDocumentContentChangeEvent],
        version: i32,
    ) -> usize {
        // Callbacks run without the map lock held, so they may subscribe or notify.
        let callbacks: Vec<ChangeCallback> = match self.watchers.get(file_name) {
            Some(entry) => entry.iter().map(|(_, callback)| Arc::clone(callback)).collect(),
            None => return 0,
        };
        trace!("Notify {} watcher(s) of {} at version {}", callbacks.len(), file_name, version);
        for callback in &callbacks {
            callback(changes, version);
        }
        callbacks.len()
    }

    pub fn is_watched(&self, file_name: &str) -> bool {
        self.watchers.contains_key(file_name)
    }

    pub fn watcher_count(&self, file_name: &str) -> usize {
        self.watchers.get(file_name).map(|entry| entry.len()).unwrap_or(0)
    }

    /// Watched file names, sorted.
    pub fn watched_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self.watchers.iter().map(|entry| entry.key().clone()).collect();
        files.sort();
        files
    }

    /// Drops every callback.
    pub fn clear(&self) {
        self.watchers.clear();
    }

    fn unsubscribe(&self, file_name: &str, id: u64) {
        let now_empty = match self.watchers.get_mut(file_name) {
            Some(mut entry) => {
                entry.retain(|(existing, _)| *existing != id);
                entry.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.watchers.remove_if(file_name, |_, callbacks| callbacks.is_empty());
        }
        trace!("Unwatch {} (#{})", file_name, id);
    }
}

/// Keeps a callback registered until dropped
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    registry: Weak<WatcherRegistry>,
    file_name: String,
    id: u64,
}

impl Subscription {
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Same as dropping the guard.
    pub fn unsubscribe(self) {}
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("file_name", &self.file_name)
            .field("id", &self.id)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(&self.file_name, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, ChangeCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let callback: ChangeCallback = Arc::new(move |_: &[TextDocumentContentChangeEvent], _: i32| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (count, callback)
    }

    #[test]
    fn test_notify_reaches_subscribers() {
        let registry = WatcherRegistry::new();
        let (count, callback) = counter();
        let _first = registry.subscribe("a.vue", Arc::clone(&callback));
        let _second = registry.subscribe("a.vue", callback);

        assert_eq!(registry.notify("a.vue", &[], 2), 2);
        assert_eq!(registry.notify("b.vue", &[], 2), 0);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let registry = WatcherRegistry::new();
        let (count, callback) = counter();
        let subscription = registry.subscribe("a.vue", callback);
        assert!(registry.is_watched("a.vue"));

        subscription.unsubscribe();
        assert!(!registry.is_watched("a.vue"));
        registry.notify("a.vue", &[], 2);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_subscription_outliving_registry_is_harmless() {
        let registry = WatcherRegistry::new();
        let (_, callback) = counter();
        let subscription = registry.subscribe("a.vue", callback);
        drop(registry);
        drop(subscription);
    }
}
