//! Maps analysis results on virtual files back to composite files
//!
//! Definitions come back from the engine in whatever file the engine found
//! them in. Results in block documents are mapped to composite coordinates,
//! results in synthesized scaffolding are followed to where they point, and
//! results in main modules are re-queried. Every step may recurse, so each
//! top-level call threads a visited stack of `(file, offset)` pairs and gives
//! up on a pair that is already being resolved.

pub mod engine;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::documents::{BlockDocument, DocumentStore, FileKind};

pub use engine::{AnalysisEngine, DefinitionInfo, DefinitionInfoAndBoundSpan, TextSpan};

type Visited = Vec<(String, usize)>;

/// Position resolution over a document store and an analysis engine
pub struct PositionResolver<'a, E: AnalysisEngine + ?Sized> {
    store: &'a DocumentStore,
    engine: &'a E,
}

impl<'a, E: AnalysisEngine + ?Sized> PositionResolver<'a, E> {
    pub fn new(store: &'a DocumentStore, engine: &'a E) -> Self {
        Self { store, engine }
    }

    /// Definitions of the symbol at `offset` in `file_name`, in composite coordinates.
    pub fn definition_at_position(&self, file_name: &str, offset: usize) -> Option<Vec<DefinitionInfo>> {
        let mut visited = Visited::new();
        self.definitions(file_name, offset, &mut visited)
    }

    /// Like [`Self::definition_at_position`], also mapping the bound span.
    pub fn definition_and_bound_span(
        &self,
        file_name: &str,
        offset: usize,
    ) -> Option<DefinitionInfoAndBoundSpan> {
        debug!("definition_and_bound_span {} {}", file_name, offset);
        let mut visited: Visited = vec![(file_name.to_string(), offset)];

        let mut result = match FileKind::classify(file_name) {
            FileKind::Composite => {
                let (block, generated) = self.locate(file_name, offset)?;
                let Some(mut result) = self
                    .engine
                    .definition_and_bound_span(block.file_name(), generated)
                else {
                    debug!("No definition at {}:{} -> {}", file_name, offset, generated);
                    return None;
                };
                result.text_span = composite_span(&block, result.text_span);
                result
            }
            _ => self.engine.definition_and_bound_span(file_name, offset)?,
        };

        let definitions = std::mem::take(&mut result.definitions)
            .into_iter()
            .flat_map(|info| self.normalize(info, &mut visited))
            .collect();
        result.definitions = dedupe(definitions);
        Some(result)
    }

    fn definitions(&self, file_name: &str, offset: usize, visited: &mut Visited) -> Option<Vec<DefinitionInfo>> {
        if visited.iter().any(|(f, o)| f == file_name && *o == offset) {
            debug!("Already resolving {}:{}", file_name, offset);
            return None;
        }
        debug!("definition_at_position({}) {} {}", visited.len(), file_name, offset);
        visited.push((file_name.to_string(), offset));
        let mut visited = scopeguard::guard(visited, |visited| {
            visited.pop();
        });

        let raw = match FileKind::classify(file_name) {
            FileKind::Composite => {
                let (block, generated) = self.locate(file_name, offset)?;
                let result = self.engine.definition_at_position(block.file_name(), generated);
                if result.is_none() {
                    debug!("No definition at {}:{} -> {}", file_name, offset, generated);
                }
                result?
            }
            _ => self.engine.definition_at_position(file_name, offset)?,
        };
        debug!("Found {} definition(s) for {}:{}", raw.len(), file_name, offset);

        let normalized = raw
            .into_iter()
            .flat_map(|info| self.normalize(info, &mut **visited))
            .collect();
        Some(dedupe(normalized))
    }

    /// Block document and generated offset for a composite offset.
    fn locate(&self, file_name: &str, offset: usize) -> Option<(Arc<BlockDocument>, usize)> {
        let document = self.store.get(file_name)?;
        let block = document.doc_at(offset)?;
        if !block.has_transformer() {
            return None;
        }
        let generated = block.generated_offset_at(offset)?;
        Some((block, generated))
    }

    fn normalize(&self, mut info: DefinitionInfo, visited: &mut Visited) -> Vec<DefinitionInfo> {
        let file_name = info.file_name.clone();
        let start = info.text_span.start;
        debug!("Normalize {}:{} {}", file_name, start, info.name);

        match FileKind::classify(&file_name) {
            FileKind::Block { composite, .. } => {
                let Some((_, block)) = self.store.block_document(&file_name) else {
                    info.file_name = composite;
                    info.text_span = TextSpan::PLACEHOLDER;
                    info.context_span = info.context_span.map(|_| TextSpan::PLACEHOLDER);
                    return vec![info];
                };

                if block.is_offset_in_template_globals(start) {
                    let Some(target) = block.template_global_target(start) else {
                        return Vec::new();
                    };
                    debug!("Template global {}:{} -> {}", file_name, start, target);
                    return self.definitions(&file_name, target, visited).unwrap_or_default();
                }
                if block.is_offset_in_ignored_zone(start) {
                    debug!("Ignored zone {}:{}", file_name, start);
                    return self.definitions(&file_name, start, visited).unwrap_or_default();
                }

                info.text_span = composite_span(&block, info.text_span);
                info.context_span = info.context_span.map(|span| composite_span(&block, span));
                info.file_name = composite;
                vec![info]
            }
            FileKind::Main { composite } => {
                let requeried = self.definitions(&file_name, start, visited).unwrap_or_default();
                if !requeried.is_empty() {
                    return requeried;
                }
                info.file_name = composite;
                info.text_span = TextSpan::PLACEHOLDER;
                vec![info]
            }
            FileKind::Plain | FileKind::Composite => vec![info],
        }
    }
}

/// Maps a generated span to composite coordinates, or to the placeholder span.
fn composite_span(block: &BlockDocument, span: TextSpan) -> TextSpan {
    let Some(start) = block.absolute_offset_at(span.start) else {
        return TextSpan::PLACEHOLDER;
    };
    let mapped_length = block
        .absolute_offset_at(span.end())
        .filter(|end| *end >= start)
        .map(|end| end - start)
        .unwrap_or(1);
    TextSpan::new(start, mapped_length.max(span.length))
}

/// Drops repeated `(file, start, length)` entries, keeping first-seen order.
fn dedupe(definitions: Vec<DefinitionInfo>) -> Vec<DefinitionInfo> {
    let mut seen = HashSet::new();
    definitions
        .into_iter()
        .filter(|info| seen.insert((info.file_name.clone(), info.text_span.start, info.text_span.length)))
        .collect()
}
