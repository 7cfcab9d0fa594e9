//! Virtual file names for block documents
//!
//! The canonical form is
//! `{file}?vue&type={type}[&index={n}][&setup=true]&lang.{lang}`. Hosts resolve
//! these names as ordinary files, so the format is reproduced byte for byte and
//! parsing rejects anything that would not format back to the same string.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::descriptor::{BlockKind, BlockSlot};
use crate::error::IdentifierError;

/// Marker separating the composite file name from the block query.
pub const QUERY_MARKER: &str = "?vue";

/// Parsed virtual block identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VirtualId {
    pub file_name: String,
    pub kind: BlockKind,
    pub index: Option<usize>,
    pub setup: bool,
    pub lang: String,
}

/// Block type and language names must survive the query syntax unchanged.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| matches!(c, '&' | '=' | '?' | '#' | '/' | '\\') || c.is_whitespace())
}

impl VirtualId {
    /// Builds the identifier of the block stored in `slot`.
    pub fn for_slot(file_name: &str, slot: &BlockSlot, lang: &str) -> Result<Self, IdentifierError> {
        let id = VirtualId {
            file_name: file_name.to_string(),
            kind: slot.kind(),
            index: slot.index(),
            setup: slot.is_setup(),
            lang: lang.to_string(),
        };
        id.validate()?;
        Ok(id)
    }

    pub fn slot(&self) -> Option<BlockSlot> {
        BlockSlot::from_parts(&self.kind, self.index, self.setup)
    }

    /// Checks the invariants that make formatting reversible.
    pub fn validate(&self) -> Result<(), IdentifierError> {
        if self.file_name.contains(QUERY_MARKER) {
            return Err(IdentifierError::InvalidName(self.file_name.clone()));
        }
        if !is_valid_name(self.kind.as_str()) {
            return Err(IdentifierError::InvalidName(self.kind.as_str().to_string()));
        }
        if !is_valid_name(&self.lang) {
            return Err(IdentifierError::InvalidName(self.lang.clone()));
        }
        let kind = self.kind.as_str().to_string();
        match (self.kind.supports_index(), self.index) {
            (true, None) => return Err(IdentifierError::IndexRequired { kind }),
            (false, Some(_)) => return Err(IdentifierError::IndexNotAllowed { kind }),
            _ => {}
        }
        if self.setup && self.kind != BlockKind::Script {
            return Err(IdentifierError::SetupNotAllowed { kind });
        }
        Ok(())
    }

    /// Returns the composite file name of a virtual name, or `None` for plain names.
    pub fn composite_file_name(id: &str) -> Option<&str> {
        id.find(QUERY_MARKER).map(|offset| &id[..offset])
    }

    pub fn is_virtual(file_name: &str) -> bool {
        file_name.contains(QUERY_MARKER)
    }
}

impl fmt::Display for VirtualId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}&type={}", self.file_name, QUERY_MARKER, self.kind)?;
        if let Some(index) = self.index {
            write!(f, "&index={}", index)?;
        }
        if self.setup {
            f.write_str("&setup=true")?;
        }
        write!(f, "&lang.{}", self.lang)
    }
}

impl FromStr for VirtualId {
    type Err = IdentifierError;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        let marker = id
            .find(QUERY_MARKER)
            .ok_or_else(|| IdentifierError::MissingMarker(id.to_string()))?;
        let file_name = &id[..marker];
        let query = &id[marker + QUERY_MARKER.len()..];

        let unexpected = |segment: &str| IdentifierError::UnexpectedSegment {
            id: id.to_string(),
            segment: segment.to_string(),
        };

        // Segments appear in a fixed order: type, index?, setup?, lang.
        let mut segments = query.strip_prefix('&').unwrap_or(query).split('&').peekable();

        let kind = segments
            .next()
            .and_then(|segment| segment.strip_prefix("type="))
            .ok_or_else(|| IdentifierError::MissingType(id.to_string()))?;
        if !is_valid_name(kind) || !query.starts_with('&') {
            return Err(IdentifierError::MissingType(id.to_string()));
        }
        let kind = BlockKind::from_tag(kind);

        let mut index = None;
        if let Some(raw) = segments.peek().and_then(|segment| segment.strip_prefix("index=")) {
            let canonical = raw == "0" || (!raw.starts_with('0') && raw.chars().all(|c| c.is_ascii_digit()));
            let parsed = raw.parse::<usize>().ok().filter(|_| canonical && !raw.is_empty());
            index = Some(parsed.ok_or_else(|| IdentifierError::InvalidIndex {
                id: id.to_string(),
                index: raw.to_string(),
            })?);
            segments.next();
        }

        let mut setup = false;
        if segments.peek().is_some_and(|segment| segment.starts_with("setup")) {
            match segments.next() {
                Some("setup=true") => setup = true,
                Some(other) => return Err(unexpected(other)),
                None => {}
            }
        }

        let lang = match segments.next() {
            Some(segment) => segment
                .strip_prefix("lang.")
                .ok_or_else(|| unexpected(segment))?,
            None => return Err(IdentifierError::MissingLanguage(id.to_string())),
        };
        if let Some(extra) = segments.next() {
            return Err(unexpected(extra));
        }

        let parsed = VirtualId {
            file_name: file_name.to_string(),
            kind,
            index,
            setup,
            lang: lang.to_string(),
        };
        parsed.validate()?;
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen, QuickCheck, TestResult};

    #[test]
    fn test_formats_canonical_forms() {
        let script = VirtualId::for_slot("/a/Foo.vue", &BlockSlot::ScriptSetup, "ts").unwrap();
        assert_eq!(script.to_string(), "/a/Foo.vue?vue&type=script&setup=true&lang.ts");

        let style = VirtualId::for_slot("/a/Foo.vue", &BlockSlot::Style(2), "scss").unwrap();
        assert_eq!(style.to_string(), "/a/Foo.vue?vue&type=style&index=2&lang.scss");

        let custom = BlockSlot::Custom { name: "i18n".into(), index: 0 };
        let custom = VirtualId::for_slot("Foo.vue", &custom, "json").unwrap();
        assert_eq!(custom.to_string(), "Foo.vue?vue&type=i18n&index=0&lang.json");
    }

    #[test]
    fn test_parses_template_id() {
        let id: VirtualId = "Foo.vue?vue&type=template&lang.tsx".parse().unwrap();
        assert_eq!(id.file_name, "Foo.vue");
        assert_eq!(id.kind, BlockKind::Template);
        assert_eq!(id.index, None);
        assert!(!id.setup);
        assert_eq!(id.lang, "tsx");
        assert_eq!(id.slot(), Some(BlockSlot::Template));
    }

    #[test]
    fn test_file_prefix_ends_at_first_marker() {
        assert_eq!(VirtualId::composite_file_name("odd?vue.vue?vue&type=script&lang.js"), Some("odd"));
        assert!("odd?vue.vue?vue&type=script&lang.js".parse::<VirtualId>().is_err());
        assert!(VirtualId::for_slot("odd?vue.vue", &BlockSlot::Script, "js").is_err());
    }

    #[test]
    fn test_rejects_non_canonical_forms() {
        for bad in [
            "Foo.vue",
            "Foo.vue?vue&lang.ts",
            "Foo.vue?vue&type=script&index=0&lang.ts",
            "Foo.vue?vue&type=style&lang.css",
            "Foo.vue?vue&type=style&index=01&lang.css",
            "Foo.vue?vue&type=style&index=-1&lang.css",
            "Foo.vue?vue&type=template&setup=true&lang.tsx",
            "Foo.vue?vue&type=script&setup=false&lang.ts",
            "Foo.vue?vue&type=script&setup=true",
            "Foo.vue?vue&type=script&lang.ts&extra",
            "Foo.vue?vuetype=script&lang.ts",
        ] {
            assert!(bad.parse::<VirtualId>().is_err(), "expected `{}` to be rejected", bad);
        }
    }

    #[derive(Debug, Clone)]
    struct IdParts {
        file_name: String,
        slot: BlockSlot,
        lang: String,
    }

    fn pick<'a>(g: &mut Gen, options: &'a [&'a str]) -> &'a str {
        g.choose(options).copied().unwrap_or(options[0])
    }

    impl Arbitrary for IdParts {
        fn arbitrary(g: &mut Gen) -> Self {
            let index = usize::arbitrary(g) % 64;
            let slot = match u8::arbitrary(g) % 5 {
                0 => BlockSlot::Template,
                1 => BlockSlot::Script,
                2 => BlockSlot::ScriptSetup,
                3 => BlockSlot::Style(index),
                _ => BlockSlot::Custom {
                    name: pick(g, &["i18n", "docs", "route", "x-custom"]).to_string(),
                    index,
                },
            };
            IdParts {
                file_name: pick(g, &["Foo.vue", "/src/components/App.vue", "C:\\w\\a b.vue", "x.y.vue"])
                    .to_string(),
                slot,
                lang: pick(g, &["ts", "tsx", "js", "vue-html", "css", "scss", "json"]).to_string(),
            }
        }
    }

    #[test]
    fn test_identifier_round_trip() {
        fn prop(parts: IdParts) -> TestResult {
            let id = match VirtualId::for_slot(&parts.file_name, &parts.slot, &parts.lang) {
                Ok(id) => id,
                Err(_) => return TestResult::discard(),
            };
            let text = id.to_string();
            let parsed: VirtualId = match text.parse() {
                Ok(parsed) => parsed,
                Err(_) => return TestResult::failed(),
            };
            TestResult::from_bool(
                parsed == id
                    && parsed.slot() == Some(parts.slot.clone())
                    && parsed.to_string() == text,
            )
        }

        QuickCheck::new()
            .tests(500)
            .quickcheck(prop as fn(IdParts) -> TestResult);
    }
}
