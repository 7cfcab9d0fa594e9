//! Error types shared across the document model
//!
//! Parse problems in composite text are never errors here: they are collected as
//! [`crate::sfc::ParseError`] values. The types below cover caller mistakes
//! (bad identifiers, stale versions) and transformer failures.

use thiserror::Error;

/// A string could not be read as a virtual block identifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("identifier `{0}` has no `?vue` marker")]
    MissingMarker(String),

    #[error("identifier `{0}` has no block type")]
    MissingType(String),

    #[error("identifier `{id}` has an unexpected segment `{segment}`")]
    UnexpectedSegment { id: String, segment: String },

    #[error("identifier `{id}` has an invalid index `{index}`")]
    InvalidIndex { id: String, index: String },

    #[error("block type `{kind}` cannot carry an index")]
    IndexNotAllowed { kind: String },

    #[error("block type `{kind}` requires an index")]
    IndexRequired { kind: String },

    #[error("only script blocks can be setup blocks, found `{kind}`")]
    SetupNotAllowed { kind: String },

    #[error("identifier `{0}` has no language segment")]
    MissingLanguage(String),

    #[error("`{0}` is not a valid block type or language name")]
    InvalidName(String),

    #[error("identifier `{id}` does not belong to `{file_name}`")]
    ForeignFile { id: String, file_name: String },
}

/// Failures reported by a composite document
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error(transparent)]
    InvalidIdentifier(#[from] IdentifierError),

    #[error("version {version} is not newer than {current}")]
    StaleVersion { version: i32, current: i32 },

    #[error("edit range {line}:{character} is outside the document")]
    EditOutOfBounds { line: u32, character: u32 },
}

/// A transformer could not produce generated text for a block
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("`{lang}` is not supported for `{kind}` blocks")]
    UnsupportedLanguage { kind: String, lang: String },

    #[error("malformed attribute `{name}`: {reason}")]
    MalformedAttribute { name: String, reason: String },
}
