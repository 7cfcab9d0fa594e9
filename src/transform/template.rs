//! Template block to render-module transformer
//!
//! Produces a small TSX module:
//!
//! ```text
//! import __Self from "./Foo.vue?vue&type=script&lang";    <- ignored zone
//! declare const __ctx: InstanceType<typeof __Self>;
//! const __TemplateGlobals = {                             <- template globals zone
//!   msg: __ctx.msg,
//! };
//! export function render() {                              <- ignored zone
//!   (__TemplateGlobals.msg);                              <- `msg` mapped to the template
//! }
//! ```
//!
//! Expressions are copied verbatim so every copied chunk gets a one-to-one
//! source-map segment. Free identifiers are routed through the globals table,
//! whose keys are bound to the matching component member.

use std::collections::HashSet;
use std::ops::Range;

use once_cell::sync::Lazy;
use tracing::trace;

use crate::error::TransformError;
use crate::sfc::BlockDescriptor;

use super::{
    GeneratedZone, GlobalBinding, OffsetMapping, SourceMap, TransformContext, TransformOutput,
    Transformer, ZoneKind,
};

const GLOBALS_NAME: &str = "__TemplateGlobals";
const CONTEXT_NAME: &str = "__ctx";

/// Attributes whose value is a bare expression
const EXPRESSION_DIRECTIVES: &[&str] =
    &["v-if", "v-else-if", "v-show", "v-model", "v-html", "v-text"];

static NON_GLOBAL_IDENTIFIERS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "true", "false", "null", "undefined", "this", "typeof", "instanceof", "in", "of", "new",
        "void", "delete", "await", "NaN", "Infinity", "Math", "JSON", "Date", "Number", "String",
        "Boolean", "Array", "Object", "console", "window", "arguments", "$event",
    ]
    .into_iter()
    .collect()
});

/// Transformer for `<template>` blocks written in HTML
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateTransformer;

impl Transformer for TemplateTransformer {
    fn output_language(&self, _block: &BlockDescriptor) -> String {
        "tsx".to_string()
    }

    fn transform(
        &self,
        block: &BlockDescriptor,
        context: &TransformContext<'_>,
    ) -> Result<TransformOutput, TransformError> {
        let lang = block.language();
        if !matches!(lang, "html" | "vue-html") {
            return Err(TransformError::UnsupportedLanguage {
                kind: block.kind.to_string(),
                lang: lang.to_string(),
            });
        }

        let expressions = collect_expressions(&block.content);
        trace!("Template of {} has {} expression(s)", context.file_name, expressions.len());
        Ok(RenderModule::build(&block.content, &expressions, context.script_import))
    }
}

/// Finds interpolations and bound attribute values in template markup.
///
/// Returned ranges are relative to `content` and exclude delimiters and quotes.
pub fn collect_expressions(content: &str) -> Vec<Range<usize>> {
    let bytes = content.as_bytes();
    let mut expressions = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let rest = &content[pos..];
        if rest.starts_with("<!--") {
            pos = rest.find("-->").map_or(bytes.len(), |end| pos + end + 3);
        } else if rest.starts_with("{{") {
            let start = pos + 2;
            match content[start..].find("}}") {
                Some(end) => {
                    if !content[start..start + end].trim().is_empty() {
                        expressions.push(start..start + end);
                    }
                    pos = start + end + 2;
                }
                None => break,
            }
        } else if bytes[pos] == b'<' && bytes.get(pos + 1).is_some_and(u8::is_ascii_alphabetic) {
            pos = scan_tag_attributes(content, pos + 1, &mut expressions);
        } else {
            pos += rest.chars().next().map_or(1, char::len_utf8);
        }
    }
    expressions
}

fn is_bound_attribute(name: &str) -> bool {
    name.starts_with(':')
        || name.starts_with('@')
        || name.starts_with("v-bind:")
        || name.starts_with("v-on:")
        || EXPRESSION_DIRECTIVES.contains(&name)
}

/// Scans one tag's attributes and returns the offset just past the tag.
fn scan_tag_attributes(content: &str, mut pos: usize, expressions: &mut Vec<Range<usize>>) -> usize {
    let bytes = content.as_bytes();
    while bytes.get(pos).is_some_and(|b| !b.is_ascii_whitespace() && *b != b'>' && *b != b'/') {
        pos += 1;
    }
    loop {
        while bytes.get(pos).is_some_and(|b| b.is_ascii_whitespace() || *b == b'/') {
            pos += 1;
        }
        match bytes.get(pos) {
            None => return pos,
            Some(b'>') => return pos + 1,
            Some(_) => {}
        }
        let name_start = pos;
        while bytes
            .get(pos)
            .is_some_and(|b| !b.is_ascii_whitespace() && !matches!(b, b'=' | b'>' | b'/'))
        {
            pos += 1;
        }
        if pos == name_start {
            pos += 1;
            continue;
        }
        let name = &content[name_start..pos];
        if bytes.get(pos) != Some(&b'=') {
            continue;
        }
        pos += 1;
        let Some(&quote) = bytes.get(pos).filter(|b| matches!(b, b'"' | b'\'')) else {
            continue;
        };
        let value_start = pos + 1;
        let Some(len) = content[value_start..].find(quote as char) else {
            return bytes.len();
        };
        if is_bound_attribute(name) && !content[value_start..value_start + len].trim().is_empty() {
            expressions.push(value_start..value_start + len);
        }
        pos = value_start + len + 1;
    }
}

/// Free identifiers of a JavaScript expression, as ranges relative to `expression`.
///
/// Member names after `.`, literals and well-known globals are skipped. String
/// literals are skipped whole.
pub fn free_identifiers(expression: &str) -> Vec<Range<usize>> {
    let bytes = expression.as_bytes();
    let mut identifiers = Vec::new();
    let mut pos = 0;
    let mut previous: Option<u8> = None;

    // Bytes of multi-byte characters count as identifier bytes, so a scan
    // never stops inside a character.
    let is_start = |b: u8| b.is_ascii_alphabetic() || b == b'_' || b == b'$' || !b.is_ascii();
    let is_part = |b: u8| b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || !b.is_ascii();

    while pos < bytes.len() {
        let b = bytes[pos];
        if matches!(b, b'"' | b'\'' | b'`') {
            pos += 1;
            while pos < bytes.len() && bytes[pos] != b {
                if bytes[pos] == b'\\' {
                    pos += 1;
                }
                pos += 1;
            }
            pos += 1;
            previous = Some(b);
        } else if b.is_ascii_digit() {
            while pos < bytes.len() && (is_part(bytes[pos]) || bytes[pos] == b'.') {
                pos += 1;
            }
            previous = Some(b'0');
        } else if is_start(b) {
            let start = pos;
            while pos < bytes.len() && is_part(bytes[pos]) {
                pos += 1;
            }
            let name = &expression[start..pos];
            let is_member = previous == Some(b'.');
            if !is_member && !NON_GLOBAL_IDENTIFIERS.contains(name) {
                identifiers.push(start..pos);
            }
            previous = Some(b'a');
        } else {
            if !b.is_ascii_whitespace() {
                previous = Some(b);
            }
            pos += 1;
        }
    }
    identifiers
}

/// Accumulates generated text along with mappings and zones
struct RenderModule {
    code: String,
    map: SourceMap,
    zones: Vec<GeneratedZone>,
}

impl RenderModule {
    fn build(content: &str, expressions: &[Range<usize>], script_import: Option<&str>) -> TransformOutput {
        let mut module = RenderModule {
            code: String::new(),
            map: SourceMap::new(),
            zones: Vec::new(),
        };

        let mut names: Vec<&str> = Vec::new();
        let mut identifiers = Vec::with_capacity(expressions.len());
        for expression in expressions {
            let found: Vec<Range<usize>> = free_identifiers(&content[expression.clone()])
                .into_iter()
                .map(|r| r.start + expression.start..r.end + expression.start)
                .collect();
            for range in &found {
                let name = &content[range.clone()];
                if !names.contains(&name) {
                    names.push(name);
                }
            }
            identifiers.push(found);
        }

        let header_start = module.code.len();
        match script_import {
            Some(source) => {
                let quoted = serde_json::to_string(source).unwrap_or_else(|_| format!("{:?}", source));
                module.code.push_str(&format!("import __Self from {};\n", quoted));
            }
            None => module.code.push_str("const __Self = {} as any;\n"),
        }
        module
            .code
            .push_str(&format!("declare const {}: InstanceType<typeof __Self>;\n", CONTEXT_NAME));
        module.zone(ZoneKind::Ignored, header_start);

        let globals_start = module.code.len();
        module.code.push_str(&format!("const {} = {{\n", GLOBALS_NAME));
        let mut globals = Vec::with_capacity(names.len());
        for name in &names {
            module.code.push_str("  ");
            let key_start = module.code.len();
            module.code.push_str(name);
            let key = key_start..module.code.len();
            module.code.push_str(&format!(": {}.", CONTEXT_NAME));
            let target = module.code.len();
            module.code.push_str(name);
            module.code.push_str(",\n");
            globals.push(GlobalBinding { key, target });
        }
        module.code.push_str("};\n");
        module.zone(ZoneKind::TemplateGlobals, globals_start);

        let open_start = module.code.len();
        module.code.push_str("export function render() {\n");
        module.zone(ZoneKind::Ignored, open_start);

        for (expression, found) in expressions.iter().zip(&identifiers) {
            module.code.push_str("  (");
            let mut cursor = expression.start;
            for identifier in found {
                module.copy(content, cursor..identifier.start);
                module.code.push_str(GLOBALS_NAME);
                module.code.push('.');
                module.copy(content, identifier.clone());
                cursor = identifier.end;
            }
            module.copy(content, cursor..expression.end);
            module.code.push_str(");\n");
        }

        let close_start = module.code.len();
        module.code.push_str("}\n");
        module.zone(ZoneKind::Ignored, close_start);

        TransformOutput {
            code: module.code,
            lang: "tsx".to_string(),
            mapping: OffsetMapping::SourceMap(module.map),
            zones: module.zones,
            template_globals: globals,
        }
    }

    /// Copies a content range verbatim and records its mapping.
    fn copy(&mut self, content: &str, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let start = self.code.len();
        self.code.push_str(&content[range.clone()]);
        self.map.push(start..self.code.len(), range);
    }

    /// Closes a zone that started at `start` and ends at the current length.
    fn zone(&mut self, kind: ZoneKind, start: usize) {
        self.zones.push(GeneratedZone { kind, range: start..self.code.len() });
    }
}
