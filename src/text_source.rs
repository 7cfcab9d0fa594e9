//! Versioned raw text shared by anything that needs access to a composite file
//!
//! Documents hold an `Arc<dyn TextSource>` instead of owning text directly, so the
//! same source can back a composite document and any host-side view of it.

use std::sync::Arc;

use lsp_types::{Position, TextDocumentContentChangeEvent};
use parking_lot::RwLock;
use ropey::Rope;
use tracing::trace;

use crate::error::DocumentError;

/// Raw text with a monotonically increasing version
pub trait TextSource: Send + Sync {
    /// Returns the full current text.
    fn text(&self) -> String;

    /// Returns the version of the current text.
    fn version(&self) -> i32;

    /// Applies change events in order and moves to `version`.
    ///
    /// Either every change is applied or none is.
    fn apply(
        &self,
        changes: &[TextDocumentContentChangeEvent],
        version: i32,
    ) -> Result<(), DocumentError>;
}

/// Shared handle to a text source.
pub type SharedTextSource = Arc<dyn TextSource>;

#[derive(Debug)]
struct RopeState {
    text: Rope,
    version: i32,
}

/// [`TextSource`] backed by a rope, supporting ranged and full-text edits.
#[derive(Debug)]
pub struct RopeTextSource {
    state: RwLock<RopeState>,
}

impl RopeTextSource {
    pub fn new(text: &str, version: i32) -> Self {
        Self {
            state: RwLock::new(RopeState {
                text: Rope::from_str(text),
                version,
            }),
        }
    }

    pub fn shared(text: &str, version: i32) -> SharedTextSource {
        Arc::new(Self::new(text, version))
    }
}

/// Converts a line/character position to a char index in the rope.
fn position_to_char_index(position: &Position, text: &Rope) -> Result<usize, DocumentError> {
    let out_of_bounds = || DocumentError::EditOutOfBounds {
        line: position.line,
        character: position.character,
    };
    let line = position.line as usize;
    if line >= text.len_lines() {
        return Err(out_of_bounds());
    }
    let line_start = text.line_to_char(line);
    let line_len = text.line(line).len_chars();
    let character = position.character as usize;
    if character > line_len {
        return Err(out_of_bounds());
    }
    Ok(line_start + character)
}

impl TextSource for RopeTextSource {
    fn text(&self) -> String {
        self.state.read().text.to_string()
    }

    fn version(&self) -> i32 {
        self.state.read().version
    }

    fn apply(
        &self,
        changes: &[TextDocumentContentChangeEvent],
        version: i32,
    ) -> Result<(), DocumentError> {
        let mut state = self.state.write();
        if version <= state.version {
            return Err(DocumentError::StaleVersion {
                version,
                current: state.version,
            });
        }

        let mut text = state.text.clone();
        for change in changes {
            if let Some(range) = change.range {
                let start = position_to_char_index(&range.start, &text)?;
                let end = position_to_char_index(&range.end, &text)?;
                if end < start {
                    return Err(DocumentError::EditOutOfBounds {
                        line: range.end.line,
                        character: range.end.character,
                    });
                }
                text.remove(start..end);
                text.insert(start, &change.text);
            } else {
                text = Rope::from_str(&change.text);
            }
        }

        trace!("Applied {} change(s), version {} -> {}", changes.len(), state.version, version);
        state.text = text;
        state.version = version;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::Range;

    fn ranged(start: (u32, u32), end: (u32, u32), text: &str) -> TextDocumentContentChangeEvent {
        TextDocumentContentChangeEvent {
            range: Some(Range {
                start: Position { line: start.0, character: start.1 },
                end: Position { line: end.0, character: end.1 },
            }),
            range_length: None,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_ranged_edit_replaces_text() {
        let source = RopeTextSource::new("hello\nworld", 1);
        source.apply(&[ranged((1, 0), (1, 5), "there")], 2).unwrap();
        assert_eq!(source.text(), "hello\nthere");
        assert_eq!(source.version(), 2);
    }

    #[test]
    fn test_full_text_edit() {
        let source = RopeTextSource::new("abc", 0);
        let change = TextDocumentContentChangeEvent {
            range: None,
            range_length: None,
            text: "xyz".to_string(),
        };
        source.apply(&[change], 1).unwrap();
        assert_eq!(source.text(), "xyz");
    }

    #[test]
    fn test_stale_version_is_rejected() {
        let source = RopeTextSource::new("abc", 3);
        let err = source.apply(&[ranged((0, 0), (0, 1), "z")], 3).unwrap_err();
        assert_eq!(err, DocumentError::StaleVersion { version: 3, current: 3 });
        assert_eq!(source.text(), "abc");
    }

    #[test]
    fn test_failed_batch_leaves_text_untouched() {
        let source = RopeTextSource::new("abc", 0);
        let result = source.apply(
            &[ranged((0, 0), (0, 1), "z"), ranged((4, 0), (4, 1), "q")],
            1,
        );
        assert!(matches!(result, Err(DocumentError::EditOutOfBounds { line: 4, .. })));
        assert_eq!(source.text(), "abc");
        assert_eq!(source.version(), 0);
    }
}
