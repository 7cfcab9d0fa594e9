//! Block parser interface and the default top-level tag scanner
//!
//! The scanner only splits a composite file into blocks. It does not look inside
//! block content beyond what is needed to find the matching end tag.

use tracing::{debug, trace};

use super::descriptor::{Attributes, BlockDescriptor, BlockKind, ParseError};

/// Result of splitting composite text into blocks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutput {
    /// Blocks in document order, with non-overlapping ranges
    pub blocks: Vec<BlockDescriptor>,
    pub errors: Vec<ParseError>,
}

/// Splits raw composite text into block descriptors
///
/// Implementations must report problems through [`ParseOutput::errors`] and
/// never panic on malformed input.
pub trait BlockParser: Send + Sync + std::fmt::Debug {
    fn parse(&self, text: &str) -> ParseOutput;
}

/// Default parser for `.vue` single-file components
#[derive(Debug, Clone, Copy, Default)]
pub struct SfcParser;

struct OpenTag {
    name: String,
    attrs: Attributes,
    /// Offset just past the closing `>`
    end: usize,
    self_closing: bool,
}

impl BlockParser for SfcParser {
    fn parse(&self, text: &str) -> ParseOutput {
        let bytes = text.as_bytes();
        let mut output = ParseOutput::default();
        let mut pos = 0;

        while let Some(found) = find_from(text, "<", pos) {
            pos = found;
            if text[pos..].starts_with("<!--") {
                pos = match find_from(text, "-->", pos + 4) {
                    Some(end) => end + 3,
                    None => {
                        output.errors.push(ParseError::new("Unterminated comment", pos..text.len()));
                        text.len()
                    }
                };
                continue;
            }
            if text[pos..].starts_with("</") {
                trace!("Skipping stray end tag at {}", pos);
                pos = find_from(text, ">", pos).map_or(text.len(), |end| end + 1);
                continue;
            }

            let Some(tag) = read_open_tag(text, pos) else {
                pos += 1;
                continue;
            };

            let kind = BlockKind::from_tag(&tag.name);
            if tag.self_closing {
                output.blocks.push(make_block(kind, tag.attrs, tag.end..tag.end, ""));
                pos = tag.end;
                continue;
            }

            match find_end_tag(text, &tag.name, tag.end, kind == BlockKind::Template) {
                Some((content_end, after)) => {
                    let content = &text[tag.end..content_end];
                    output
                        .blocks
                        .push(make_block(kind, tag.attrs, tag.end..content_end, content));
                    pos = after;
                }
                None => {
                    output.errors.push(ParseError::new(
                        format!("Element <{}> is missing end tag.", tag.name),
                        pos..bytes.len(),
                    ));
                    break;
                }
            }
        }

        debug!("Parsed {} block(s) with {} error(s)", output.blocks.len(), output.errors.len());
        output
    }
}

fn make_block(
    kind: BlockKind,
    attrs: Attributes,
    range: std::ops::Range<usize>,
    content: &str,
) -> BlockDescriptor {
    let lang = attrs.get("lang").map(str::to_string);
    BlockDescriptor {
        kind,
        lang,
        attrs,
        range,
        content: content.to_string(),
    }
}

fn find_from(text: &str, needle: &str, from: usize) -> Option<usize> {
    text.get(from..)?.find(needle).map(|i| from + i)
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic()
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.')
}

/// Reads `<name attr=... >` starting at `start` (which points at `<`).
fn read_open_tag(text: &str, start: usize) -> Option<OpenTag> {
    let bytes = text.as_bytes();
    let mut pos = start + 1;
    if !bytes.get(pos).copied().is_some_and(is_name_start) {
        return None;
    }
    let name_start = pos;
    while bytes.get(pos).copied().is_some_and(is_name_char) {
        pos += 1;
    }
    let name = text[name_start..pos].to_ascii_lowercase();

    let mut attrs = Attributes::new();
    loop {
        while bytes.get(pos).is_some_and(u8::is_ascii_whitespace) {
            pos += 1;
        }
        match bytes.get(pos) {
            None => return None,
            Some(b'>') => {
                return Some(OpenTag { name, attrs, end: pos + 1, self_closing: false });
            }
            Some(b'/') if bytes.get(pos + 1) == Some(&b'>') => {
                return Some(OpenTag { name, attrs, end: pos + 2, self_closing: true });
            }
            Some(_) => {}
        }

        let attr_start = pos;
        while bytes
            .get(pos)
            .is_some_and(|b| !b.is_ascii_whitespace() && !matches!(b, b'=' | b'>' | b'/'))
        {
            pos += 1;
        }
        if pos == attr_start {
            pos += 1;
            continue;
        }
        let key = text[attr_start..pos].to_string();

        let mut lookahead = pos;
        while bytes.get(lookahead).is_some_and(u8::is_ascii_whitespace) {
            lookahead += 1;
        }
        if bytes.get(lookahead) != Some(&b'=') {
            attrs.insert(key, "true");
            continue;
        }
        pos = lookahead + 1;
        while bytes.get(pos).is_some_and(u8::is_ascii_whitespace) {
            pos += 1;
        }
        let value = match bytes.get(pos) {
            Some(&quote) if quote == b'"' || quote == b'\'' => {
                let value_start = pos + 1;
                let value_end = text[value_start..].find(quote as char)? + value_start;
                pos = value_end + 1;
                &text[value_start..value_end]
            }
            _ => {
                let value_start = pos;
                while bytes.get(pos).is_some_and(|b| !b.is_ascii_whitespace() && *b != b'>') {
                    pos += 1;
                }
                &text[value_start..pos]
            }
        };
        attrs.insert(key, value);
    }
}

/// Finds the end tag for `name`, returning (content end, offset after the end tag).
///
/// Template blocks may nest `<template>` elements, so their end tag is found by
/// depth counting. Other blocks hold raw text and end at the first end tag.
fn find_end_tag(text: &str, name: &str, from: usize, nested: bool) -> Option<(usize, usize)> {
    let close = format!("</{}", name);
    let open = format!("<{}", name);
    let mut depth = 0usize;
    let mut pos = from;

    loop {
        let next_close = find_from(text, &close, pos)?;
        if nested {
            let mut scan = pos;
            while let Some(next_open) = find_from(text, &open, scan) {
                if next_open >= next_close {
                    break;
                }
                let boundary = text.as_bytes().get(next_open + open.len()).copied();
                let is_tag = boundary.is_none_or(|b| b.is_ascii_whitespace() || b == b'>' || b == b'/');
                if is_tag && read_open_tag(text, next_open).is_some_and(|tag| !tag.self_closing) {
                    depth += 1;
                }
                scan = next_open + open.len();
            }
        }
        let after = find_from(text, ">", next_close)? + 1;
        if depth == 0 {
            return Some((next_close, after));
        }
        depth -= 1;
        pos = after;
    }
}
