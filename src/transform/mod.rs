//! Block transformers: block content in, target-language text out
//!
//! A transformer is a pure function of a block descriptor and its context. Besides
//! the generated text it reports how generated offsets relate to the block
//! content, and which generated regions have no counterpart in the original file.

pub mod script;
pub mod source_map;
pub mod template;

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::TransformError;
use crate::sfc::{BlockDescriptor, BlockKind, BlockSlot};

pub use script::ScriptTransformer;
pub use source_map::{MappingSegment, SourceMap};
pub use template::TemplateTransformer;

/// What a transformer knows about the block's surroundings
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub file_name: &'a str,
    pub slot: &'a BlockSlot,
    /// Import source of the component's script export, when the file has one
    pub script_import: Option<&'a str>,
}

/// How offsets in generated text relate to offsets in block content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OffsetMapping {
    /// Generated text is the block content unchanged
    Identity,
    SourceMap(SourceMap),
    /// No mapping is known; every offset is in the unknown zone
    Unmapped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ZoneKind {
    /// Table that re-exposes component members to template expressions
    TemplateGlobals,
    /// Scaffolding with no original-text counterpart
    Ignored,
}

/// A generated region that must not be reported as a mapped position
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedZone {
    pub kind: ZoneKind,
    pub range: Range<usize>,
}

impl GeneratedZone {
    pub fn contains(&self, offset: usize) -> bool {
        self.range.start <= offset && offset < self.range.end
    }
}

/// One entry of a template-globals table: `key: <expression>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalBinding {
    /// Generated range of the entry's key
    pub key: Range<usize>,
    /// Generated offset the key is bound to
    pub target: usize,
}

/// Everything a transformer produces for one block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformOutput {
    pub code: String,
    pub lang: String,
    pub mapping: OffsetMapping,
    pub zones: Vec<GeneratedZone>,
    pub template_globals: Vec<GlobalBinding>,
}

impl TransformOutput {
    /// Output that is the block content itself.
    pub fn pass_through(code: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            lang: lang.into(),
            mapping: OffsetMapping::Identity,
            zones: Vec::new(),
            template_globals: Vec::new(),
        }
    }
}

/// Turns a block into text of the target language
pub trait Transformer: Send + Sync + fmt::Debug {
    /// Language tag of the generated text; also used in the block's virtual name.
    fn output_language(&self, block: &BlockDescriptor) -> String;

    fn transform(
        &self,
        block: &BlockDescriptor,
        context: &TransformContext<'_>,
    ) -> Result<TransformOutput, TransformError>;
}

/// Transformers keyed by block type
#[derive(Debug, Clone, Default)]
pub struct TransformerRegistry {
    transformers: FxHashMap<String, Arc<dyn Transformer>>,
}

impl TransformerRegistry {
    /// Registry with no transformers at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the builtin script and template transformers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(BlockKind::Script.as_str(), Arc::new(ScriptTransformer));
        registry.register(BlockKind::Template.as_str(), Arc::new(TemplateTransformer));
        registry
    }

    /// Registers `transformer` for a block type, replacing any previous one.
    pub fn register(&mut self, block_type: impl Into<String>, transformer: Arc<dyn Transformer>) {
        self.transformers.insert(block_type.into(), transformer);
    }

    pub fn get(&self, kind: &BlockKind) -> Option<&Arc<dyn Transformer>> {
        self.transformers.get(kind.as_str())
    }

    pub fn contains(&self, kind: &BlockKind) -> bool {
        self.transformers.contains_key(kind.as_str())
    }
}
