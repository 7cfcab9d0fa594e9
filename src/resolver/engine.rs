//! Interface of the external analysis engine and its result types

use serde::{Deserialize, Serialize};

/// A byte span in some file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSpan {
    pub start: usize,
    pub length: usize,
}

impl TextSpan {
    /// Stand-in for a span whose position is unknown.
    pub const PLACEHOLDER: TextSpan = TextSpan { start: 0, length: 1 };

    pub fn new(start: usize, length: usize) -> Self {
        Self { start, length }
    }

    pub fn end(&self) -> usize {
        self.start + self.length
    }
}

/// One definition reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionInfo {
    pub file_name: String,
    pub text_span: TextSpan,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_span: Option<TextSpan>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub container_name: String,
}

impl DefinitionInfo {
    pub fn new(file_name: impl Into<String>, text_span: TextSpan) -> Self {
        Self {
            file_name: file_name.into(),
            text_span,
            context_span: None,
            name: String::new(),
            kind: String::new(),
            container_name: String::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Definitions together with the span of the symbol they were requested for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionInfoAndBoundSpan {
    pub definitions: Vec<DefinitionInfo>,
    pub text_span: TextSpan,
}

/// Language analysis over ordinary and virtual file names
///
/// `None` means the engine has no information; it is never an error.
pub trait AnalysisEngine {
    fn definition_at_position(&self, file_name: &str, offset: usize) -> Option<Vec<DefinitionInfo>>;

    fn definition_and_bound_span(
        &self,
        file_name: &str,
        offset: usize,
    ) -> Option<DefinitionInfoAndBoundSpan>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_serializes_camel_case() {
        let info = DefinitionInfo::new("/a.ts", TextSpan::new(3, 4)).named("a");
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["fileName"], "/a.ts");
        assert_eq!(json["textSpan"]["length"], 4);
        assert!(json.get("contextSpan").is_none());
    }
}
