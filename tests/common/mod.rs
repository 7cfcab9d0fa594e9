//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use indoc::indoc;
use lsp_types::{Position, Range, TextDocumentContentChangeEvent};
use parking_lot::Mutex;

use vue_virtual_docs::bridge::HostFilesystem;
use vue_virtual_docs::resolver::{AnalysisEngine, DefinitionInfo, DefinitionInfoAndBoundSpan, TextSpan};

pub const FOO_FILE: &str = "/src/Foo.vue";

pub const FOO_SOURCE: &str = indoc! {r#"
    <template>
      <p>{{ msg }}</p>
    </template>
    <script lang="ts">
    export default { data: () => ({ msg: 'hi' }) }
    </script>
"#};

pub const TEMPLATE_ID: &str = "/src/Foo.vue?vue&type=template&lang.tsx";
pub const SCRIPT_ID: &str = "/src/Foo.vue?vue&type=script&lang.ts";
pub const MAIN_FILE: &str = "/src/Foo.vue.ts";

/// Byte offset of the `n`th occurrence of `needle` in `text`.
pub fn nth_offset(text: &str, needle: &str, n: usize) -> usize {
    text.match_indices(needle)
        .nth(n)
        .map(|(offset, _)| offset)
        .unwrap_or_else(|| panic!("{:?} occurs fewer than {} time(s)", needle, n + 1))
}

pub fn full_change(text: &str) -> TextDocumentContentChangeEvent {
    TextDocumentContentChangeEvent {
        range: None,
        range_length: None,
        text: text.to_string(),
    }
}

pub fn ranged_change(
    start: (u32, u32),
    end: (u32, u32),
    text: &str,
) -> TextDocumentContentChangeEvent {
    TextDocumentContentChangeEvent {
        range: Some(Range::new(Position::new(start.0, start.1), Position::new(end.0, end.1))),
        range_length: None,
        text: text.to_string(),
    }
}

/// Host filesystem backed by a map
#[derive(Default)]
pub struct InMemoryHost {
    files: Mutex<HashMap<String, String>>,
}

impl InMemoryHost {
    pub fn with_file(self, file_name: &str, text: &str) -> Self {
        self.files.lock().insert(file_name.to_string(), text.to_string());
        self
    }
}

impl HostFilesystem for InMemoryHost {
    fn exists(&self, file_name: &str) -> bool {
        self.files.lock().contains_key(file_name)
    }

    fn read(&self, file_name: &str) -> Result<String> {
        self.files
            .lock()
            .get(file_name)
            .cloned()
            .ok_or_else(|| anyhow!("No such file: {}", file_name))
    }
}

/// Analysis engine that answers from a fixed table and records every query
#[derive(Default)]
pub struct ScriptedEngine {
    definitions: HashMap<(String, usize), Vec<DefinitionInfo>>,
    bound_spans: HashMap<(String, usize), DefinitionInfoAndBoundSpan>,
    queries: Mutex<Vec<(String, usize)>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(mut self, file_name: &str, offset: usize, results: Vec<DefinitionInfo>) -> Self {
        self.definitions.insert((file_name.to_string(), offset), results);
        self
    }

    pub fn bound(mut self, file_name: &str, offset: usize, result: DefinitionInfoAndBoundSpan) -> Self {
        self.bound_spans.insert((file_name.to_string(), offset), result);
        self
    }

    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().clone()
    }
}

impl AnalysisEngine for ScriptedEngine {
    fn definition_at_position(&self, file_name: &str, offset: usize) -> Option<Vec<DefinitionInfo>> {
        self.queries.lock().push((file_name.to_string(), offset));
        self.definitions.get(&(file_name.to_string(), offset)).cloned()
    }

    fn definition_and_bound_span(
        &self,
        file_name: &str,
        offset: usize,
    ) -> Option<DefinitionInfoAndBoundSpan> {
        self.queries.lock().push((file_name.to_string(), offset));
        self.bound_spans.get(&(file_name.to_string(), offset)).cloned()
    }
}

pub fn definition(file_name: &str, start: usize, length: usize) -> DefinitionInfo {
    DefinitionInfo::new(file_name, TextSpan::new(start, length))
}
