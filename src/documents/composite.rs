//! Composite document: one multi-block source file and its block documents
//!
//! Parsing is lazy. Edits only mark the document dirty; the next read re-parses,
//! compares the new descriptors with the previous ones and evicts the block
//! documents whose blocks went stale. Unchanged blocks keep their descriptor
//! `Arc`, which is what keeps a block document's cached output valid. When a
//! parse reports errors, blocks it failed to produce keep their last good
//! descriptor instead of being evicted.

use std::collections::BTreeSet;
use std::sync::Arc;

use lsp_types::TextDocumentContentChangeEvent;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::config::{main_module_name, DocumentOptions};
use crate::error::{DocumentError, IdentifierError};
use crate::sfc::{
    has_block_changed, Attributes, BlockDescriptor, BlockKind, BlockSlot, ParseError,
    SfcDescriptor, VirtualId,
};
use crate::text_source::{RopeTextSource, SharedTextSource};

use super::block::{BlockDocument, DescriptorCell};
use super::main_module::{self, MainModule};

/// Content of the script synthesized for files without one.
pub const FALLBACK_SCRIPT: &str =
    "import { defineComponent } from 'vue'\nexport default defineComponent({})\n";

static FALLBACK_SCRIPT_BLOCK: Lazy<Arc<BlockDescriptor>> = Lazy::new(|| {
    let mut attrs = Attributes::new();
    attrs.insert("fallback", "true");
    Arc::new(BlockDescriptor {
        kind: BlockKind::Script,
        lang: Some("ts".to_string()),
        attrs,
        range: 0..0,
        content: FALLBACK_SCRIPT.to_string(),
    })
});

/// Mutable state guarded by the document lock
#[derive(Debug, Default)]
struct CompositeState {
    dirty: bool,
    /// Hash of the text that produced the current descriptor
    parsed_hash: Option<blake3::Hash>,
    errors: Vec<ParseError>,
    main: Arc<MainModule>,
    /// Live block documents keyed by virtual identifier
    blocks: FxHashMap<String, Arc<BlockDocument>>,
    /// Identifiers evicted since the last drain
    evicted: Vec<String>,
}

/// A composite source file and the virtual documents derived from it
pub struct CompositeDocument {
    file_name: String,
    main_file_name: String,
    source: SharedTextSource,
    options: Arc<DocumentOptions>,
    descriptor: Arc<DescriptorCell>,
    state: RwLock<CompositeState>,
}

impl std::fmt::Debug for CompositeDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeDocument")
            .field("file_name", &self.file_name)
            .field("version", &self.source.version())
            .finish()
    }
}

impl CompositeDocument {
    pub fn new(
        file_name: impl Into<String>,
        source: SharedTextSource,
        options: Arc<DocumentOptions>,
    ) -> Arc<Self> {
        let file_name = file_name.into();
        Arc::new(Self {
            main_file_name: main_module_name(&file_name),
            file_name,
            source,
            options,
            descriptor: Arc::new(RwLock::new(Arc::new(SfcDescriptor::default()))),
            state: RwLock::new(CompositeState {
                dirty: true,
                ..Default::default()
            }),
        })
    }

    /// Creates a document over a fresh rope-backed text source.
    pub fn from_text(
        file_name: impl Into<String>,
        text: &str,
        version: i32,
        options: Arc<DocumentOptions>,
    ) -> Arc<Self> {
        Self::new(file_name, RopeTextSource::shared(text, version), options)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Name of the synthesized main module, `{file_name}.ts`.
    pub fn main_file_name(&self) -> &str {
        &self.main_file_name
    }

    pub fn version(&self) -> i32 {
        self.source.version()
    }

    pub fn text(&self) -> String {
        self.source.text()
    }

    pub fn options(&self) -> &Arc<DocumentOptions> {
        &self.options
    }

    /// Applies edits to the underlying text and marks the document dirty.
    pub fn update(
        &self,
        changes: &[TextDocumentContentChangeEvent],
        version: i32,
    ) -> Result<(), DocumentError> {
        self.source.apply(changes, version)?;
        self.mark_dirty();
        trace!("Update {} to version {}", self.file_name, version);
        Ok(())
    }

    /// Forces a re-parse on next read, for sources edited behind this document's back.
    pub fn mark_dirty(&self) {
        self.state.write().dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.state.read().dirty
    }

    /// Current descriptor, re-parsing first if needed.
    pub fn descriptor(&self) -> Arc<SfcDescriptor> {
        self.ensure_parsed();
        self.descriptor.read().clone()
    }

    /// Problems reported by the last parse.
    pub fn errors(&self) -> Vec<ParseError> {
        self.ensure_parsed();
        self.state.read().errors.clone()
    }

    /// Every block in document order, including the fallback script if any.
    pub fn blocks(&self) -> Vec<Arc<BlockDescriptor>> {
        let descriptor = self.descriptor();
        let mut blocks: Vec<Arc<BlockDescriptor>> = descriptor
            .in_document_order()
            .into_iter()
            .map(|(_, block)| Arc::clone(block))
            .collect();
        // Keep the fallback script last; its empty range would sort it first.
        if let Some(index) = blocks.iter().position(|block| block.is_fallback()) {
            let fallback = blocks.remove(index);
            blocks.push(fallback);
        }
        blocks
    }

    fn slot_at(descriptor: &SfcDescriptor, offset: usize) -> Option<(BlockSlot, Arc<BlockDescriptor>)> {
        descriptor
            .in_document_order()
            .into_iter()
            .find(|(_, block)| !block.is_fallback() && block.contains(offset))
            .map(|(slot, block)| (slot, Arc::clone(block)))
    }

    /// The block whose content contains `offset`, end inclusive.
    pub fn block_at(&self, offset: usize) -> Option<Arc<BlockDescriptor>> {
        Self::slot_at(&self.descriptor(), offset).map(|(_, block)| block)
    }

    /// The block document for the block containing `offset`.
    pub fn doc_at(&self, offset: usize) -> Option<Arc<BlockDocument>> {
        let (slot, _) = Self::slot_at(&self.descriptor(), offset)?;
        self.doc(&slot)
    }

    /// The block document for the block in `slot`, created on first request.
    pub fn doc(&self, slot: &BlockSlot) -> Option<Arc<BlockDocument>> {
        self.ensure_parsed();
        let descriptor = self.descriptor.read().clone();
        let block = Arc::clone(descriptor.get(slot)?);
        let id = self.id_in(&descriptor, slot)?;
        let key = id.to_string();

        let mut state = self.state.write();
        if let Some(document) = state.blocks.get(&key) {
            return Some(Arc::clone(document));
        }

        let transformer = self.options.transformers.get(&block.kind).cloned();
        let script_import = match slot {
            BlockSlot::Template => self.script_import(&descriptor),
            _ => None,
        };
        let document = Arc::new(BlockDocument::new(
            id,
            slot.clone(),
            Arc::downgrade(&self.descriptor),
            block,
            transformer,
            script_import,
        ));
        state.blocks.insert(key, Arc::clone(&document));
        Some(document)
    }

    /// The block document named by a virtual identifier.
    ///
    /// Fails when the identifier is malformed or names another composite file.
    /// The language segment is not compared, so an identifier minted before a
    /// `lang` change still finds the block.
    pub fn doc_by_id(&self, id: &str) -> Result<Option<Arc<BlockDocument>>, DocumentError> {
        match VirtualId::composite_file_name(id) {
            Some(file_name) if file_name != self.file_name => {
                return Err(IdentifierError::ForeignFile {
                    id: id.to_string(),
                    file_name: self.file_name.clone(),
                }
                .into());
            }
            _ => {}
        }
        let parsed: VirtualId = id.parse()?;
        Ok(parsed.slot().and_then(|slot| self.doc(&slot)))
    }

    /// Virtual identifier of the block in `slot`, if the slot is occupied.
    pub fn block_id(&self, slot: &BlockSlot) -> Option<String> {
        let descriptor = self.descriptor();
        self.id_in(&descriptor, slot).map(|id| id.to_string())
    }

    /// Synthesized main module for the current parse.
    pub fn main_text(&self) -> Arc<MainModule> {
        self.ensure_parsed();
        Arc::clone(&self.state.read().main)
    }

    /// Identifiers of the blocks the main module imports.
    pub fn active_ids(&self) -> BTreeSet<String> {
        self.main_text().ids.clone()
    }

    /// True when the block document for `id` has been created and not evicted since.
    pub fn has_block_document(&self, id: &str) -> bool {
        self.ensure_parsed();
        self.state.read().blocks.contains_key(id)
    }

    /// Returns and forgets the identifiers evicted since the last call.
    pub fn drain_evicted(&self) -> Vec<String> {
        self.ensure_parsed();
        std::mem::take(&mut self.state.write().evicted)
    }

    fn id_in(&self, descriptor: &SfcDescriptor, slot: &BlockSlot) -> Option<VirtualId> {
        let block = descriptor.get(slot)?;
        let lang = match self.options.transformers.get(&block.kind) {
            Some(transformer) => transformer.output_language(block),
            None => block.language().to_string(),
        };
        match VirtualId::for_slot(&self.file_name, slot, &lang) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("No identifier for {:?} in {}: {}", slot, self.file_name, e);
                None
            }
        }
    }

    /// Identifier of a block the main module can import, i.e. one with a transformer.
    fn importable_id(&self, descriptor: &SfcDescriptor, slot: &BlockSlot) -> Option<String> {
        let block = descriptor.get(slot)?;
        if !self.options.transformers.contains(&block.kind) {
            return None;
        }
        self.id_in(descriptor, slot).map(|id| id.to_string())
    }

    fn script_import(&self, descriptor: &SfcDescriptor) -> Option<String> {
        self.importable_id(descriptor, &BlockSlot::ScriptSetup)
            .or_else(|| self.importable_id(descriptor, &BlockSlot::Script))
            .map(|id| main_module::import_path(&id))
    }

    fn ensure_parsed(&self) {
        if !self.state.read().dirty {
            return;
        }
        let mut state = self.state.write();
        if state.dirty {
            self.reparse(&mut state);
        }
    }

    fn reparse(&self, state: &mut CompositeState) {
        let text = self.source.text();
        let hash = blake3::hash(text.as_bytes());
        state.dirty = false;
        if state.parsed_hash == Some(hash) {
            trace!("Skip re-parse of {}: text unchanged", self.file_name);
            return;
        }

        let first = state.parsed_hash.is_none();
        debug!(
            "{} {} (version {})",
            if first { "Parse" } else { "Re-parse" },
            self.file_name,
            self.source.version()
        );

        let output = self.options.parser.parse(&text);
        let mut errors = output.errors;
        let mut next = SfcDescriptor::from_blocks(output.blocks, &mut errors);
        let prev = self.descriptor.read().clone();
        if !first && !errors.is_empty() {
            for slot in next.carry_over_missing(&prev) {
                debug!("Keep last good {:?} of {} until it parses again", slot, self.file_name);
            }
        }
        if !next.has_script() {
            next.script = Some(Arc::clone(&FALLBACK_SCRIPT_BLOCK));
        }

        if !first {
            next.adopt_unchanged(&prev);
            for slot in self.stale_slots(&prev, &next) {
                if let Some(id) = self.id_in(&prev, &slot) {
                    let key = id.to_string();
                    if state.blocks.remove(&key).is_some() {
                        debug!("Stale: {}", key);
                        state.evicted.push(key);
                    }
                }
            }
        }

        let slots: Vec<BlockSlot> = next.slots().into_iter().map(|(slot, _)| slot).collect();
        let main = main_module::generate(
            &self.file_name,
            &slots,
            |slot| self.importable_id(&next, slot),
            self.options.runtime_module.as_deref(),
        );

        if !errors.is_empty() {
            debug!("{} parse error(s) in {}", errors.len(), self.file_name);
        }
        *self.descriptor.write() = Arc::new(next);
        state.errors = errors;
        state.main = Arc::new(main);
        state.parsed_hash = Some(hash);
    }

    /// Slots whose block documents must be evicted after a re-parse.
    ///
    /// Template and script-setup output depend on each other and on the plain
    /// script's identifier, so a change to one invalidates the group. A content
    /// change in the plain script alone only invalidates the script.
    fn stale_slots(&self, prev: &SfcDescriptor, next: &SfcDescriptor) -> BTreeSet<BlockSlot> {
        let mut stale = BTreeSet::new();
        let coupled = [BlockSlot::Template, BlockSlot::ScriptSetup, BlockSlot::Script];

        let changed = |slot: &BlockSlot| has_block_changed(prev.get(slot), next.get(slot));

        if changed(&BlockSlot::Template) || changed(&BlockSlot::ScriptSetup) {
            stale.extend(coupled.iter().cloned());
        }
        if changed(&BlockSlot::Script) {
            stale.insert(BlockSlot::Script);
            let prev_id = self.id_in(prev, &BlockSlot::Script);
            let next_id = self.id_in(next, &BlockSlot::Script);
            if prev_id != next_id {
                stale.extend(coupled.iter().cloned());
            }
        }

        for (slot, _) in prev.slots() {
            if matches!(slot, BlockSlot::Style(_) | BlockSlot::Custom { .. }) && changed(&slot) {
                stale.insert(slot);
            }
        }

        stale.retain(|slot| prev.get(slot).is_some());
        stale
    }
}
