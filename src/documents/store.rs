//! Open composite documents keyed by file name

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::config::{composite_of_main_module, is_composite_file, DocumentOptions};
use crate::sfc::VirtualId;
use crate::text_source::SharedTextSource;

use super::block::BlockDocument;
use super::composite::CompositeDocument;

/// What a file name refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileKind {
    /// A file the store knows nothing about
    Plain,
    /// A composite source file
    Composite,
    /// The synthesized main module of `composite`
    Main { composite: String },
    /// A block of `composite`
    Block { composite: String, id: VirtualId },
}

impl FileKind {
    pub fn classify(file_name: &str) -> FileKind {
        if VirtualId::is_virtual(file_name) {
            return match file_name.parse::<VirtualId>() {
                Ok(id) => FileKind::Block {
                    composite: id.file_name.clone(),
                    id,
                },
                Err(_) => FileKind::Plain,
            };
        }
        if let Some(composite) = composite_of_main_module(file_name) {
            return FileKind::Main {
                composite: composite.to_string(),
            };
        }
        if is_composite_file(file_name) {
            FileKind::Composite
        } else {
            FileKind::Plain
        }
    }

    /// Name of the file on disk this name is derived from.
    pub fn real_file_name<'a>(&'a self, file_name: &'a str) -> &'a str {
        match self {
            FileKind::Main { composite } | FileKind::Block { composite, .. } => composite,
            FileKind::Plain | FileKind::Composite => file_name,
        }
    }
}

/// Registry of open composite documents
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: DashMap<String, Arc<CompositeDocument>>,
    options: Arc<DocumentOptions>,
}

impl DocumentStore {
    pub fn new(options: DocumentOptions) -> Self {
        Self {
            documents: DashMap::new(),
            options: Arc::new(options),
        }
    }

    pub fn options(&self) -> &Arc<DocumentOptions> {
        &self.options
    }

    /// Opens `file_name` with `text`, or returns the document already open.
    pub fn open(&self, file_name: &str, text: &str, version: i32) -> Arc<CompositeDocument> {
        self.documents
            .entry(file_name.to_string())
            .or_insert_with(|| {
                info!("Open {} (version {})", file_name, version);
                CompositeDocument::from_text(file_name, text, version, Arc::clone(&self.options))
            })
            .clone()
    }

    /// Opens `file_name` over an existing text source.
    pub fn open_with_source(&self, file_name: &str, source: SharedTextSource) -> Arc<CompositeDocument> {
        self.documents
            .entry(file_name.to_string())
            .or_insert_with(|| {
                info!("Open {} (version {})", file_name, source.version());
                CompositeDocument::new(file_name, source, Arc::clone(&self.options))
            })
            .clone()
    }

    pub fn close(&self, file_name: &str) -> Option<Arc<CompositeDocument>> {
        let removed = self.documents.remove(file_name).map(|(_, document)| document);
        if removed.is_some() {
            debug!("Close {}", file_name);
        }
        removed
    }

    pub fn get(&self, file_name: &str) -> Option<Arc<CompositeDocument>> {
        self.documents.get(file_name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.documents.contains_key(file_name)
    }

    /// The composite document behind any composite, main or block name.
    pub fn composite_for(&self, file_name: &str) -> Option<Arc<CompositeDocument>> {
        let kind = FileKind::classify(file_name);
        match kind {
            FileKind::Plain => None,
            _ => self.get(kind.real_file_name(file_name)),
        }
    }

    /// The block document named by a virtual identifier, with its owner.
    pub fn block_document(&self, file_name: &str) -> Option<(Arc<CompositeDocument>, Arc<BlockDocument>)> {
        let FileKind::Block { composite, .. } = FileKind::classify(file_name) else {
            return None;
        };
        let document = self.get(&composite)?;
        let block = document.doc_by_id(file_name).ok()??;
        Some((document, block))
    }

    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.documents.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn clear(&self) {
        self.documents.clear();
    }
}
