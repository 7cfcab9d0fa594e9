//! Virtual document for a single block of a composite file

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::TransformError;
use crate::sfc::{BlockDescriptor, BlockSlot, SfcDescriptor, VirtualId};
use crate::transform::{
    GeneratedZone, OffsetMapping, TransformContext, TransformOutput, Transformer, ZoneKind,
};

/// Descriptor state owned by a composite document and read by its blocks.
pub(crate) type DescriptorCell = RwLock<Arc<SfcDescriptor>>;

/// Generated output together with the descriptor it was produced from
struct CachedOutput {
    source: Arc<BlockDescriptor>,
    result: Result<Arc<TransformOutput>, TransformError>,
}

/// One block of a composite file, exposed as a standalone document
///
/// The block descriptor is read through a weak handle to the owning composite
/// document, so a block document always sees the latest parse. Generated text is
/// produced on first use and cached until the descriptor it came from is
/// replaced; offsets map in both directions through the transformer's mapping.
///
/// Offsets are reported as `None` when they fall outside the block or when no
/// mapping is known for them. `None` is the unknown zone: callers must not
/// substitute a guess.
pub struct BlockDocument {
    id: VirtualId,
    id_string: String,
    slot: BlockSlot,
    owner: Weak<DescriptorCell>,
    /// Descriptor at creation time, used once the owner is gone or the slot empties
    initial: Arc<BlockDescriptor>,
    transformer: Option<Arc<dyn Transformer>>,
    script_import: Option<String>,
    cache: RwLock<Option<CachedOutput>>,
}

impl fmt::Debug for BlockDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockDocument")
            .field("id", &self.id_string)
            .field("slot", &self.slot)
            .field("has_transformer", &self.transformer.is_some())
            .finish()
    }
}

impl BlockDocument {
    pub(crate) fn new(
        id: VirtualId,
        slot: BlockSlot,
        owner: Weak<DescriptorCell>,
        initial: Arc<BlockDescriptor>,
        transformer: Option<Arc<dyn Transformer>>,
        script_import: Option<String>,
    ) -> Self {
        let id_string = id.to_string();
        debug!("Create block document {}", id_string);
        Self {
            id,
            id_string,
            slot,
            owner,
            initial,
            transformer,
            script_import,
            cache: RwLock::new(None),
        }
    }

    pub fn id(&self) -> &VirtualId {
        &self.id
    }

    /// The virtual file name of this block.
    pub fn file_name(&self) -> &str {
        &self.id_string
    }

    pub fn composite_file_name(&self) -> &str {
        &self.id.file_name
    }

    pub fn slot(&self) -> &BlockSlot {
        &self.slot
    }

    pub fn has_transformer(&self) -> bool {
        self.transformer.is_some()
    }

    /// The live descriptor for this block's slot.
    ///
    /// Falls back to the descriptor seen at creation when the owner no longer
    /// has a block in the slot.
    pub fn block(&self) -> Arc<BlockDescriptor> {
        self.owner
            .upgrade()
            .and_then(|cell| cell.read().get(&self.slot).cloned())
            .unwrap_or_else(|| Arc::clone(&self.initial))
    }

    /// Transformer output for the current descriptor.
    ///
    /// Returns `Ok(None)` for blocks without a registered transformer.
    pub fn output(&self) -> Result<Option<Arc<TransformOutput>>, TransformError> {
        let Some(transformer) = &self.transformer else {
            return Ok(None);
        };
        let block = self.block();

        if let Some(cached) = self.cache.read().as_ref() {
            if Arc::ptr_eq(&cached.source, &block) {
                return cached.result.clone().map(Some);
            }
        }

        let context = TransformContext {
            file_name: &self.id.file_name,
            slot: &self.slot,
            script_import: self.script_import.as_deref(),
        };
        let result = transformer.transform(&block, &context).map(Arc::new);
        match &result {
            Ok(output) => debug!("Generate {} ({} bytes)", self.id_string, output.code.len()),
            Err(e) => warn!("Failed to generate {}: {}", self.id_string, e),
        }
        *self.cache.write() = Some(CachedOutput {
            source: block,
            result: result.clone(),
        });
        result.map(Some)
    }

    pub fn generated_text(&self) -> Result<Option<String>, TransformError> {
        Ok(self.output()?.map(|output| output.code.clone()))
    }

    /// Maps an offset in the composite text to an offset in the generated text.
    pub fn generated_offset_at(&self, composite_offset: usize) -> Option<usize> {
        let block = self.block();
        if block.is_fallback() || !block.contains(composite_offset) {
            return None;
        }
        let output = self.output().ok()??;
        let relative = composite_offset - block.range.start;
        match &output.mapping {
            OffsetMapping::Identity => (relative <= output.code.len()).then_some(relative),
            OffsetMapping::SourceMap(map) => map.generated_offset_at(relative),
            OffsetMapping::Unmapped => None,
        }
    }

    /// Maps an offset in the generated text to an offset in the composite text.
    pub fn absolute_offset_at(&self, generated_offset: usize) -> Option<usize> {
        let block = self.block();
        if block.is_fallback() {
            return None;
        }
        let output = self.output().ok()??;
        let relative = match &output.mapping {
            OffsetMapping::Identity => {
                (generated_offset <= block.content.len()).then_some(generated_offset)
            }
            OffsetMapping::SourceMap(map) => map.original_offset_at(generated_offset),
            OffsetMapping::Unmapped => None,
        }?;
        Some(block.range.start + relative)
    }

    /// Synthetic regions of the generated text.
    pub fn zones(&self) -> Vec<GeneratedZone> {
        match self.output() {
            Ok(Some(output)) => output.zones.clone(),
            _ => Vec::new(),
        }
    }

    fn is_offset_in_zone(&self, kind: ZoneKind, generated_offset: usize) -> bool {
        self.zones()
            .iter()
            .any(|zone| zone.kind == kind && zone.contains(generated_offset))
    }

    pub fn is_offset_in_template_globals(&self, generated_offset: usize) -> bool {
        self.is_offset_in_zone(ZoneKind::TemplateGlobals, generated_offset)
    }

    pub fn is_offset_in_ignored_zone(&self, generated_offset: usize) -> bool {
        self.is_offset_in_zone(ZoneKind::Ignored, generated_offset)
    }

    /// Generated offset that the template-globals key at `generated_offset` is bound to.
    pub fn template_global_target(&self, generated_offset: usize) -> Option<usize> {
        let output = self.output().ok()??;
        output
            .template_globals
            .iter()
            .find(|binding| {
                binding.key.start <= generated_offset && generated_offset <= binding.key.end
            })
            .map(|binding| binding.target)
    }
}
