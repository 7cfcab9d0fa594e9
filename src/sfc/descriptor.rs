//! Block descriptors produced by parsing a composite file

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Type tag of a top-level block
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BlockKind {
    Template,
    Script,
    Style,
    /// Any other top-level tag, named by the tag
    Custom(String),
}

impl BlockKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "template" => BlockKind::Template,
            "script" => BlockKind::Script,
            "style" => BlockKind::Style,
            other => BlockKind::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            BlockKind::Template => "template",
            BlockKind::Script => "script",
            BlockKind::Style => "style",
            BlockKind::Custom(name) => name,
        }
    }

    /// Style and custom blocks may repeat and are addressed by index.
    pub fn supports_index(&self) -> bool {
        matches!(self, BlockKind::Style | BlockKind::Custom(_))
    }

    /// Source language assumed when a block has no `lang` attribute.
    pub fn default_language(&self) -> &str {
        match self {
            BlockKind::Template => "vue-html",
            BlockKind::Script => "js",
            BlockKind::Style => "css",
            BlockKind::Custom(name) => name,
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for BlockKind {
    fn from(value: String) -> Self {
        BlockKind::from_tag(&value)
    }
}

impl From<BlockKind> for String {
    fn from(value: BlockKind) -> Self {
        value.as_str().to_string()
    }
}

/// Attribute bag of a block tag
///
/// Keys are kept sorted, so two bags are equal exactly when they have the same
/// size and every key maps to the same value; source order never matters.
/// Valueless attributes (`<script setup>`) are stored as `"true"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, String>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// True when the attribute is present and not explicitly `"false"`.
    pub fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some_and(|value| value != "false")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Attributes(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One top-level block of a composite file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDescriptor {
    pub kind: BlockKind,
    pub lang: Option<String>,
    pub attrs: Attributes,
    /// Byte range of `content` in the composite text
    pub range: Range<usize>,
    pub content: String,
}

impl BlockDescriptor {
    pub fn new(kind: BlockKind, content: impl Into<String>, range: Range<usize>) -> Self {
        Self {
            kind,
            lang: None,
            attrs: Attributes::new(),
            range,
            content: content.into(),
        }
    }

    /// Source language, falling back to the block kind's default.
    pub fn language(&self) -> &str {
        self.lang.as_deref().unwrap_or_else(|| self.kind.default_language())
    }

    pub fn is_setup(&self) -> bool {
        self.kind == BlockKind::Script && self.attrs.is_set("setup")
    }

    /// True for the script synthesized when a file has no script block.
    pub fn is_fallback(&self) -> bool {
        self.attrs.is_set("fallback") && self.range.is_empty()
    }

    /// Inclusive containment: an offset at the end of the content belongs to the block.
    pub fn contains(&self, offset: usize) -> bool {
        self.range.start <= offset && offset <= self.range.end
    }

    /// Structural comparison used to decide whether a block went stale.
    ///
    /// Two descriptors are unchanged iff content, language, offset range and
    /// attribute set are all equal.
    pub fn is_unchanged(&self, other: &BlockDescriptor) -> bool {
        self.content == other.content
            && self.lang == other.lang
            && self.range == other.range
            && self.attrs == other.attrs
    }
}

/// Compares two optional slot occupants with [`BlockDescriptor::is_unchanged`].
pub fn has_block_changed(
    prev: Option<&Arc<BlockDescriptor>>,
    next: Option<&Arc<BlockDescriptor>>,
) -> bool {
    match (prev, next) {
        (None, None) => false,
        (Some(a), Some(b)) => !(Arc::ptr_eq(a, b) || a.is_unchanged(b)),
        _ => true,
    }
}

/// Stable address of a block inside its composite file
///
/// Style indices count style blocks only. Custom indices count custom blocks
/// with the same tag name only, so inserting a block of a different kind never
/// shifts the address of an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlockSlot {
    Template,
    Script,
    ScriptSetup,
    Style(usize),
    Custom { name: String, index: usize },
}

impl BlockSlot {
    pub fn kind(&self) -> BlockKind {
        match self {
            BlockSlot::Template => BlockKind::Template,
            BlockSlot::Script | BlockSlot::ScriptSetup => BlockKind::Script,
            BlockSlot::Style(_) => BlockKind::Style,
            BlockSlot::Custom { name, .. } => BlockKind::Custom(name.clone()),
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            BlockSlot::Style(index) | BlockSlot::Custom { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn is_setup(&self) -> bool {
        matches!(self, BlockSlot::ScriptSetup)
    }

    /// Rebuilds a slot from identifier parts. Returns `None` for combinations
    /// that no block can occupy.
    pub fn from_parts(kind: &BlockKind, index: Option<usize>, setup: bool) -> Option<Self> {
        match (kind, index, setup) {
            (BlockKind::Template, None, false) => Some(BlockSlot::Template),
            (BlockKind::Script, None, false) => Some(BlockSlot::Script),
            (BlockKind::Script, None, true) => Some(BlockSlot::ScriptSetup),
            (BlockKind::Style, Some(index), false) => Some(BlockSlot::Style(index)),
            (BlockKind::Custom(name), Some(index), false) => Some(BlockSlot::Custom {
                name: name.clone(),
                index,
            }),
            _ => None,
        }
    }
}

/// Location of a problem reported by a block parser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    pub message: String,
    pub range: Range<usize>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, range: Range<usize>) -> Self {
        Self { message: message.into(), range }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}..{}", self.message, self.range.start, self.range.end)
    }
}

/// Blocks of one composite file, organized by slot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SfcDescriptor {
    pub template: Option<Arc<BlockDescriptor>>,
    pub script: Option<Arc<BlockDescriptor>>,
    pub script_setup: Option<Arc<BlockDescriptor>>,
    pub styles: Vec<Arc<BlockDescriptor>>,
    pub custom_blocks: Vec<Arc<BlockDescriptor>>,
}

impl SfcDescriptor {
    /// Organizes a flat, document-ordered block list into slots.
    ///
    /// A second template, script or script-setup block is dropped and reported.
    pub fn from_blocks(blocks: Vec<BlockDescriptor>, errors: &mut Vec<ParseError>) -> Self {
        let mut descriptor = SfcDescriptor::default();
        for block in blocks {
            let range = block.range.clone();
            let target = match block.kind {
                BlockKind::Template => &mut descriptor.template,
                BlockKind::Script if block.is_setup() => &mut descriptor.script_setup,
                BlockKind::Script => &mut descriptor.script,
                BlockKind::Style => {
                    descriptor.styles.push(Arc::new(block));
                    continue;
                }
                BlockKind::Custom(_) => {
                    descriptor.custom_blocks.push(Arc::new(block));
                    continue;
                }
            };
            if target.is_some() {
                let what = if block.is_setup() { "<script setup>" } else { block.kind.as_str() };
                errors.push(ParseError::new(
                    format!("Single file component can contain only one {} element", what),
                    range,
                ));
            } else {
                *target = Some(Arc::new(block));
            }
        }
        descriptor
    }

    pub fn get(&self, slot: &BlockSlot) -> Option<&Arc<BlockDescriptor>> {
        match slot {
            BlockSlot::Template => self.template.as_ref(),
            BlockSlot::Script => self.script.as_ref(),
            BlockSlot::ScriptSetup => self.script_setup.as_ref(),
            BlockSlot::Style(index) => self.styles.get(*index),
            BlockSlot::Custom { name, index } => self
                .custom_blocks
                .iter()
                .filter(|block| block.kind.as_str() == name)
                .nth(*index),
        }
    }

    /// Every occupied slot: script-setup, script, template, styles, custom blocks.
    pub fn slots(&self) -> Vec<(BlockSlot, &Arc<BlockDescriptor>)> {
        let mut slots = Vec::new();
        if let Some(block) = &self.script_setup {
            slots.push((BlockSlot::ScriptSetup, block));
        }
        if let Some(block) = &self.script {
            slots.push((BlockSlot::Script, block));
        }
        if let Some(block) = &self.template {
            slots.push((BlockSlot::Template, block));
        }
        for (index, block) in self.styles.iter().enumerate() {
            slots.push((BlockSlot::Style(index), block));
        }
        for (slot, block) in self.custom_slots() {
            slots.push((slot, block));
        }
        slots
    }

    fn custom_slots(&self) -> Vec<(BlockSlot, &Arc<BlockDescriptor>)> {
        let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
        self.custom_blocks
            .iter()
            .map(|block| {
                let counter = seen.entry(block.kind.as_str()).or_insert(0);
                let slot = BlockSlot::Custom {
                    name: block.kind.as_str().to_string(),
                    index: *counter,
                };
                *counter += 1;
                (slot, block)
            })
            .collect()
    }

    /// Occupied slots sorted by position in the composite text.
    pub fn in_document_order(&self) -> Vec<(BlockSlot, &Arc<BlockDescriptor>)> {
        let mut slots = self.slots();
        slots.sort_by_key(|(_, block)| block.range.start);
        slots
    }

    /// Replaces every block that is unchanged relative to `prev` with the
    /// previous `Arc`, so caches keyed on descriptor identity stay valid.
    pub fn adopt_unchanged(&mut self, prev: &SfcDescriptor) {
        fn adopt(next: &mut Arc<BlockDescriptor>, prev: Option<&Arc<BlockDescriptor>>) {
            if let Some(prev) = prev {
                if prev.is_unchanged(next) {
                    *next = Arc::clone(prev);
                }
            }
        }

        if let Some(block) = self.template.as_mut() {
            adopt(block, prev.template.as_ref());
        }
        if let Some(block) = self.script.as_mut() {
            adopt(block, prev.script.as_ref());
        }
        if let Some(block) = self.script_setup.as_mut() {
            adopt(block, prev.script_setup.as_ref());
        }
        for (index, block) in self.styles.iter_mut().enumerate() {
            adopt(block, prev.styles.get(index));
        }
        let custom_slots: Vec<BlockSlot> = self.custom_slots().into_iter().map(|(slot, _)| slot).collect();
        for (block, slot) in self.custom_blocks.iter_mut().zip(custom_slots) {
            adopt(block, prev.get(&slot));
        }
    }

    /// Fills every slot this descriptor lacks with the block `prev` had there.
    ///
    /// Used after a parse that reported errors: a block the parser lost behind
    /// an unterminated tag keeps its last good descriptor (and its old range)
    /// until a parse produces it again. Returns the slots that were filled.
    pub fn carry_over_missing(&mut self, prev: &SfcDescriptor) -> Vec<BlockSlot> {
        fn carry(slot: &mut Option<Arc<BlockDescriptor>>, prev: Option<&Arc<BlockDescriptor>>) -> bool {
            match (slot.as_ref(), prev) {
                (None, Some(prev)) if !prev.is_fallback() => {
                    *slot = Some(Arc::clone(prev));
                    true
                }
                _ => false,
            }
        }

        let mut carried = Vec::new();
        if carry(&mut self.template, prev.template.as_ref()) {
            carried.push(BlockSlot::Template);
        }
        if carry(&mut self.script, prev.script.as_ref()) {
            carried.push(BlockSlot::Script);
        }
        if carry(&mut self.script_setup, prev.script_setup.as_ref()) {
            carried.push(BlockSlot::ScriptSetup);
        }
        for index in self.styles.len()..prev.styles.len() {
            self.styles.push(Arc::clone(&prev.styles[index]));
            carried.push(BlockSlot::Style(index));
        }

        let present: Vec<BlockSlot> = self.custom_slots().into_iter().map(|(slot, _)| slot).collect();
        for (slot, block) in prev.custom_slots() {
            if !present.contains(&slot) {
                self.custom_blocks.push(Arc::clone(block));
                carried.push(slot);
            }
        }
        carried
    }

    pub fn has_script(&self) -> bool {
        self.script.is_some() || self.script_setup.is_some()
    }
}
