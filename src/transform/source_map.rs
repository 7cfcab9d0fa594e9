//! Segment-based offset mapping between generated text and block content

use std::ops::Range;

use serde::Serialize;

/// A generated range copied from (or standing for) a range of block content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingSegment {
    pub generated: Range<usize>,
    /// Relative to the start of the block content
    pub original: Range<usize>,
}

impl MappingSegment {
    fn is_verbatim(&self) -> bool {
        self.generated.len() == self.original.len()
    }
}

/// Ordered list of mapping segments emitted by a transformer
///
/// An offset that starts a segment belongs to it; an offset that only ends one
/// falls back to that segment, so the end of a mapped identifier still resolves.
/// Inside a verbatim segment offsets map linearly; inside a rewritten segment
/// every offset maps to the segment start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceMap {
    segments: Vec<MappingSegment>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, generated: Range<usize>, original: Range<usize>) {
        self.segments.push(MappingSegment { generated, original });
    }

    pub fn segments(&self) -> &[MappingSegment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Maps a generated offset to a content-relative offset.
    pub fn original_offset_at(&self, generated: usize) -> Option<usize> {
        self.segments
            .iter()
            .find(|s| s.generated.contains(&generated))
            .or_else(|| self.segments.iter().find(|s| s.generated.end == generated))
            .map(|s| {
                if s.is_verbatim() {
                    s.original.start + (generated - s.generated.start)
                } else {
                    s.original.start
                }
            })
    }

    /// Maps a content-relative offset to a generated offset.
    pub fn generated_offset_at(&self, original: usize) -> Option<usize> {
        self.segments
            .iter()
            .find(|s| s.original.contains(&original))
            .or_else(|| self.segments.iter().find(|s| s.original.end == original))
            .map(|s| {
                if s.is_verbatim() {
                    s.generated.start + (original - s.original.start)
                } else {
                    s.generated.start
                }
            })
    }
}
