//! Filesystem view that serves virtual files next to real ones
//!
//! The analysis host asks a single filesystem for every name it sees. Plain
//! names go to the host filesystem; block identifiers and main module names are
//! answered from the open composite documents. Virtual content carries a
//! trailing version marker so hosts that cache by content notice edits, and
//! transformed blocks also carry an inline source map.

pub mod watchers;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use dashmap::DashMap;
use lsp_types::TextDocumentContentChangeEvent;
use tracing::{debug, info, warn};

use crate::documents::{CompositeDocument, DocumentStore, FileKind};
use crate::transform::{OffsetMapping, SourceMap};

pub use watchers::{ChangeCallback, Subscription, WatcherRegistry};

/// Appends the `//# version` marker to generated text.
pub fn with_version_marker(text: &str, version: i32) -> String {
    format!("{}\n//# version {}", text, version)
}

/// Inline `sourceMappingURL` comment carrying `map` as base64 JSON.
pub fn source_map_comment(map: &SourceMap) -> serde_json::Result<String> {
    let json = serde_json::to_vec(map)?;
    Ok(format!(
        "\n//# sourceMappingURL=data:application/json;base64,{}",
        STANDARD.encode(json)
    ))
}

/// Renders a generation failure as virtual file content.
pub fn error_comment(error: &dyn std::fmt::Display) -> String {
    format!("/*\nError: {}\n*/", error)
}

/// Access to real files on the host
pub trait HostFilesystem: Send + Sync {
    fn exists(&self, file_name: &str) -> bool;

    fn read(&self, file_name: &str) -> Result<String>;
}

/// [`HostFilesystem`] over the local disk
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskFilesystem;

impl HostFilesystem for DiskFilesystem {
    fn exists(&self, file_name: &str) -> bool {
        Path::new(file_name).is_file()
    }

    fn read(&self, file_name: &str) -> Result<String> {
        std::fs::read_to_string(file_name).with_context(|| format!("Failed to read {}", file_name))
    }
}

/// Filesystem facade over the host and the open composite documents
pub struct FilesystemBridge {
    host: Arc<dyn HostFilesystem>,
    store: Arc<DocumentStore>,
    watchers: Arc<WatcherRegistry>,
    /// Subscriptions that forward host edits into composite documents
    forwarding: DashMap<String, Subscription>,
}

impl std::fmt::Debug for FilesystemBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilesystemBridge")
            .field("open", &self.store.len())
            .field("watchers", &self.watchers)
            .finish()
    }
}

impl FilesystemBridge {
    pub fn new(
        host: Arc<dyn HostFilesystem>,
        store: Arc<DocumentStore>,
        watchers: Arc<WatcherRegistry>,
    ) -> Self {
        Self {
            host,
            store,
            watchers,
            forwarding: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    pub fn watchers(&self) -> &Arc<WatcherRegistry> {
        &self.watchers
    }

    /// True when [`Self::read`] has content for `file_name`.
    ///
    /// Blocks without a transformer (styles, most custom blocks) have no
    /// generated text and so do not exist as virtual files.
    pub fn exists(&self, file_name: &str) -> bool {
        match FileKind::classify(file_name) {
            FileKind::Block { composite, .. } => self
                .store
                .get(&composite)
                .and_then(|document| document.doc_by_id(file_name).ok().flatten())
                .is_some_and(|block| block.has_transformer()),
            FileKind::Main { composite } => self.store.contains(&composite),
            FileKind::Composite => self.store.contains(file_name) || self.host.exists(file_name),
            FileKind::Plain => self.host.exists(file_name),
        }
    }

    /// Content of a real or virtual file, or `None` if there is no such file.
    pub fn read(&self, file_name: &str) -> Option<String> {
        match FileKind::classify(file_name) {
            FileKind::Block { composite, .. } => {
                let document = self.store.get(&composite)?;
                Self::render_block(&document, file_name)
            }
            FileKind::Main { composite } => {
                let document = self.store.get(&composite)?;
                Some(with_version_marker(&document.main_text().text, document.version()))
            }
            FileKind::Composite if self.store.contains(file_name) => {
                self.store.get(file_name).map(|document| document.text())
            }
            FileKind::Composite | FileKind::Plain => match self.host.read(file_name) {
                Ok(text) => Some(text),
                Err(e) => {
                    debug!("{:#}", e);
                    None
                }
            },
        }
    }

    fn render_block(document: &CompositeDocument, file_name: &str) -> Option<String> {
        match document.doc_by_id(file_name) {
            Ok(Some(block)) => match block.output() {
                Ok(Some(output)) => {
                    let mut text = with_version_marker(&output.code, document.version());
                    if let OffsetMapping::SourceMap(map) = &output.mapping {
                        match source_map_comment(map) {
                            Ok(comment) => text.push_str(&comment),
                            Err(e) => warn!("No source map for {}: {}", file_name, e),
                        }
                    }
                    Some(text)
                }
                Ok(None) => None,
                Err(e) => Some(error_comment(&e)),
            },
            Ok(None) => None,
            Err(e) => Some(error_comment(&e)),
        }
    }

    /// Registers `callback` for changes to `file_name`, real or virtual.
    pub fn watch(&self, file_name: &str, callback: ChangeCallback) -> Subscription {
        self.watchers.subscribe(file_name, callback)
    }

    /// Opens a composite file from the host, or returns it if already open.
    ///
    /// Edits reported for the file through [`Self::host_edit`] are applied to
    /// the document.
    pub fn open_composite(&self, file_name: &str) -> Result<Arc<CompositeDocument>> {
        if let Some(document) = self.store.get(file_name) {
            return Ok(document);
        }
        let text = self
            .host
            .read(file_name)
            .with_context(|| format!("Failed to open composite file {}", file_name))?;
        let document = self.store.open(file_name, &text, 0);
        self.forward_edits(&document);
        info!("Opened composite file {}", file_name);
        Ok(document)
    }

    /// Opens a composite file from text supplied by the caller.
    pub fn open_composite_with_text(&self, file_name: &str, text: &str, version: i32) -> Arc<CompositeDocument> {
        let document = self.store.open(file_name, text, version);
        if !self.forwarding.contains_key(file_name) {
            self.forward_edits(&document);
        }
        document
    }

    fn forward_edits(&self, document: &Arc<CompositeDocument>) {
        let target = Arc::downgrade(document);
        let subscription = self.watchers.subscribe(
            document.file_name(),
            Arc::new(move |changes: &[TextDocumentContentChangeEvent], version: i32| {
                if let Some(document) = target.upgrade() {
                    if let Err(e) = document.update(changes, version) {
                        warn!("Dropped edit to {}: {}", document.file_name(), e);
                    }
                }
            }),
        );
        self.forwarding.insert(document.file_name().to_string(), subscription);
    }

    pub fn close_composite(&self, file_name: &str) -> Option<Arc<CompositeDocument>> {
        self.forwarding.remove(file_name);
        self.store.close(file_name)
    }

    /// Reports an edit made by the host.
    ///
    /// Watchers of the file are notified first. For an open composite file the
    /// watchers of its main module, and of every block identifier whose block
    /// document was evicted by the edit or was never created, then receive the
    /// regenerated text as a full-content change. Blocks that kept their
    /// document are not re-sent.
    /// Returns the number of callbacks invoked.
    pub fn host_edit(
        &self,
        file_name: &str,
        changes: &[TextDocumentContentChangeEvent],
        version: i32,
    ) -> usize {
        let mut notified = self.watchers.notify(file_name, changes, version);
        let Some(document) = self.store.get(file_name) else {
            return notified;
        };

        let evicted = document.drain_evicted();
        debug!("{} block(s) of {} went stale", evicted.len(), file_name);

        for derived in self.watchers.watched_files() {
            let stale = match FileKind::classify(&derived) {
                FileKind::Main { composite } => composite == file_name,
                FileKind::Block { composite, .. } => {
                    composite == file_name
                        && (evicted.contains(&derived) || !document.has_block_document(&derived))
                }
                _ => false,
            };
            if !stale {
                continue;
            }
            match self.read(&derived) {
                Some(text) => {
                    let change = TextDocumentContentChangeEvent {
                        range: None,
                        range_length: None,
                        text,
                    };
                    notified += self.watchers.notify(&derived, &[change], version);
                }
                None => debug!("{} no longer exists", derived),
            }
        }
        notified
    }

    /// Drops every watcher and closes every document.
    pub fn shutdown(&self) {
        self.forwarding.clear();
        self.watchers.clear();
        self.store.clear();
        info!("Filesystem bridge shut down");
    }
}
