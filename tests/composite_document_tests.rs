//! Integration tests for composite documents
//!
//! Verifies that a composite document:
//! - Keeps every block document across edits that change nothing
//! - Evicts coupled block documents together
//! - Synthesizes a fallback script when the file has none
//! - Keeps block identifiers stable when unrelated blocks are added
//! - Maps pass-through offsets in both directions

mod common;

use std::sync::Arc;

use indoc::indoc;
use quickcheck::{quickcheck, TestResult};

use vue_virtual_docs::config::DocumentOptions;
use vue_virtual_docs::documents::{CompositeDocument, FALLBACK_SCRIPT};
use vue_virtual_docs::error::DocumentError;
use vue_virtual_docs::sfc::{BlockKind, BlockSlot};

use common::*;

const SETUP_SOURCE: &str = indoc! {r#"
    <script setup lang="ts">
    const count = 1
    </script>
    <script lang="ts">
    export const name = 'Counter'
    </script>
    <template>
      <button>{{ count }}</button>
    </template>
    <style>
    button { margin: 0; }
    </style>
"#};

fn open(text: &str) -> Arc<CompositeDocument> {
    CompositeDocument::from_text(FOO_FILE, text, 1, Arc::new(DocumentOptions::default()))
}

fn all_docs(document: &CompositeDocument) -> Vec<Arc<vue_virtual_docs::BlockDocument>> {
    document
        .descriptor()
        .slots()
        .into_iter()
        .filter_map(|(slot, _)| document.doc(&slot))
        .collect()
}

#[test]
fn test_identical_text_keeps_every_block_document() {
    let document = open(SETUP_SOURCE);
    let before = all_docs(&document);
    assert_eq!(before.len(), 4, "setup, script, template and style should each get a document");

    document.update(&[full_change(SETUP_SOURCE)], 2).unwrap();
    let after = all_docs(&document);

    assert_eq!(document.version(), 2);
    assert!(document.drain_evicted().is_empty(), "No-op edit must evict nothing");
    for (a, b) in before.iter().zip(&after) {
        assert!(Arc::ptr_eq(a, b), "{} was recreated", a.file_name());
    }
}

#[test]
fn test_template_change_evicts_script_documents() {
    let document = open(SETUP_SOURCE);
    let template = document.doc(&BlockSlot::Template).unwrap();
    let setup = document.doc(&BlockSlot::ScriptSetup).unwrap();
    let script = document.doc(&BlockSlot::Script).unwrap();
    let style = document.doc(&BlockSlot::Style(0)).unwrap();

    // Line 7 is `  <button>{{ count }}</button>`; same-length rename keeps the style in place.
    document.update(&[ranged_change((7, 3), (7, 9), "strong")], 2).unwrap();
    assert!(document.text().contains("<strong>{{ count }}</button>"));

    let mut evicted = document.drain_evicted();
    evicted.sort();
    let mut expected = vec![
        template.file_name().to_string(),
        setup.file_name().to_string(),
        script.file_name().to_string(),
    ];
    expected.sort();
    assert_eq!(evicted, expected);
    assert!(Arc::ptr_eq(&style, &document.doc(&BlockSlot::Style(0)).unwrap()));
}

#[test]
fn test_setup_change_evicts_template() {
    let document = open(SETUP_SOURCE);
    let template = document.doc(&BlockSlot::Template).unwrap();

    // `const count = 1` -> `const count = 2`
    document.update(&[ranged_change((1, 14), (1, 15), "2")], 2).unwrap();

    let fresh = document.doc(&BlockSlot::Template).unwrap();
    assert!(!Arc::ptr_eq(&template, &fresh));
    assert!(document.drain_evicted().contains(&template.file_name().to_string()));
}

#[test]
fn test_script_content_change_keeps_template() {
    let document = open(FOO_SOURCE);
    let template = document.doc(&BlockSlot::Template).unwrap();
    let script = document.doc(&BlockSlot::Script).unwrap();

    // 'hi' -> 'yo' keeps every range intact.
    let column = FOO_SOURCE.lines().nth(4).unwrap().find("hi").unwrap() as u32;
    document.update(&[ranged_change((4, column), (4, column + 2), "yo")], 2).unwrap();

    assert!(Arc::ptr_eq(&template, &document.doc(&BlockSlot::Template).unwrap()));
    assert!(!Arc::ptr_eq(&script, &document.doc(&BlockSlot::Script).unwrap()));
    assert_eq!(document.drain_evicted(), vec![SCRIPT_ID.to_string()]);
}

#[test]
fn test_script_language_change_evicts_template() {
    let document = open(FOO_SOURCE);
    let template = document.doc(&BlockSlot::Template).unwrap();

    let text = FOO_SOURCE.replace("<script lang=\"ts\">", "<script lang=\"js\">");
    document.update(&[full_change(&text)], 2).unwrap();

    assert_eq!(
        document.block_id(&BlockSlot::Script).as_deref(),
        Some("/src/Foo.vue?vue&type=script&lang.js")
    );
    assert!(!Arc::ptr_eq(&template, &document.doc(&BlockSlot::Template).unwrap()));
    let generated = document.doc(&BlockSlot::Template).unwrap().generated_text().unwrap().unwrap();
    assert!(generated.contains("\"./Foo.vue?vue&type=script&lang\""));
}

#[test]
fn test_fallback_script_is_replaced_by_real_script() {
    let template_only = "<template><p>{{ a }}</p></template>\n";
    let document = open(template_only);

    let fallback = document.doc(&BlockSlot::Script).unwrap();
    assert_eq!(fallback.generated_text().unwrap().as_deref(), Some(FALLBACK_SCRIPT));
    assert_eq!(fallback.absolute_offset_at(0), None, "Fallback script has no composite text");
    assert_eq!(document.blocks().len(), 2);

    let with_script = format!("{}<script>export default {{}}</script>\n", template_only);
    document.update(&[full_change(&with_script)], 2).unwrap();

    let descriptor = document.descriptor();
    assert!(!descriptor.script.as_ref().unwrap().is_fallback());
    assert!(document.drain_evicted().contains(&fallback.file_name().to_string()));
}

#[test]
fn test_parse_errors_are_exposed_not_raised() {
    let document = open("<template><p></p></template>\n<script>export default {}\n");
    let errors = document.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("missing end tag"), "{}", errors[0].message);
    assert!(document.descriptor().template.is_some());
}

#[test]
fn test_custom_block_identity_survives_insertions() {
    let source = indoc! {r#"
        <i18n lang="json">{"a": 1}</i18n>
        <template><p/></template>
    "#};
    let document = open(source);
    let id = document
        .block_id(&BlockSlot::Custom { name: "i18n".into(), index: 0 })
        .unwrap();
    assert_eq!(id, "/src/Foo.vue?vue&type=i18n&index=0&lang.json");

    let with_docs = format!("<docs>read me</docs>\n{}", source);
    document.update(&[full_change(&with_docs)], 2).unwrap();
    assert_eq!(
        document.block_id(&BlockSlot::Custom { name: "i18n".into(), index: 0 }),
        Some(id)
    );
    assert_eq!(
        document.block_id(&BlockSlot::Custom { name: "docs".into(), index: 0 }).as_deref(),
        Some("/src/Foo.vue?vue&type=docs&index=0&lang.docs")
    );
}

#[test]
fn test_doc_by_id_tolerates_language_segment() {
    let document = open(FOO_SOURCE);
    let stale = "/src/Foo.vue?vue&type=script&lang.js";
    let block = document.doc_by_id(stale).unwrap().unwrap();
    assert_eq!(block.file_name(), SCRIPT_ID);

    assert!(matches!(
        document.doc_by_id("/src/Foo.vue?vue&type=script&index=0&lang.ts"),
        Err(DocumentError::InvalidIdentifier(_))
    ));
    assert!(matches!(
        document.doc_by_id("/src/Foo.vue"),
        Err(DocumentError::InvalidIdentifier(_))
    ));
}

#[test]
fn test_stale_version_is_rejected() {
    let document = open(FOO_SOURCE);
    let result = document.update(&[full_change("")], 1);
    assert!(matches!(result, Err(DocumentError::StaleVersion { version: 1, current: 1 })));
    assert_eq!(document.text(), FOO_SOURCE);
}

#[test]
fn test_doc_at_finds_block_by_offset() {
    let document = open(FOO_SOURCE);
    let offset = nth_offset(FOO_SOURCE, "msg", 1);
    let block = document.doc_at(offset).unwrap();
    assert_eq!(block.slot(), &BlockSlot::Script);
    assert_eq!(document.block_at(offset).unwrap().kind, BlockKind::Script);
    assert!(document.doc_at(nth_offset(FOO_SOURCE, "<script", 0)).is_none());
}

#[test]
fn test_pass_through_offsets_round_trip() {
    fn prop(body: String, offset: usize) -> TestResult {
        if body.contains('<') || body.contains('\r') {
            return TestResult::discard();
        }
        let source = format!("<template><p/></template>\n<script lang=\"ts\">{}</script>\n", body);
        let document = open(&source);
        let block = document.descriptor().script.clone().unwrap();
        let composite = block.range.start + offset % (block.content.len() + 1);

        let script = document.doc(&BlockSlot::Script).unwrap();
        let generated = match script.generated_offset_at(composite) {
            Some(generated) => generated,
            None => return TestResult::failed(),
        };
        TestResult::from_bool(
            generated == composite - block.range.start
                && script.absolute_offset_at(generated) == Some(composite),
        )
    }
    quickcheck(prop as fn(String, usize) -> TestResult);
}

#[test]
fn test_props_edit_regenerates_script_and_main_only() {
    let source = "<template><p>{{ x }}</p></template>\n<script>export default {}</script>\n";
    let document = open(source);
    let template = document.doc(&BlockSlot::Template).unwrap();
    let template_text = template.generated_text().unwrap();
    let script = document.doc(&BlockSlot::Script).unwrap();
    let main = document.main_text();

    let edited = source.replace("export default {}", "export default { props: ['x'] }");
    document.update(&[full_change(&edited)], 2).unwrap();

    assert!(Arc::ptr_eq(&template, &document.doc(&BlockSlot::Template).unwrap()));
    assert_eq!(template.generated_text().unwrap(), template_text);

    let fresh = document.doc(&BlockSlot::Script).unwrap();
    assert!(!Arc::ptr_eq(&script, &fresh));
    assert_eq!(
        fresh.generated_text().unwrap().as_deref(),
        Some("export default { props: ['x'] }")
    );
    assert!(!Arc::ptr_eq(&main, &document.main_text()));
    assert_eq!(document.drain_evicted(), vec![script.file_name().to_string()]);
}

#[test]
fn test_unterminated_block_keeps_last_good_blocks() {
    let document = open(FOO_SOURCE);
    let template = document.doc(&BlockSlot::Template).unwrap();
    let script = document.doc(&BlockSlot::Script).unwrap();
    let script_text = script.generated_text().unwrap();

    // A custom block is half typed above everything else.
    let typing = format!("<docs>\n{}", FOO_SOURCE);
    document.update(&[full_change(&typing)], 2).unwrap();

    assert!(document.errors()[0].message.contains("missing end tag"));
    let descriptor = document.descriptor();
    assert!(!descriptor.script.as_ref().unwrap().is_fallback());
    assert!(Arc::ptr_eq(&template, &document.doc(&BlockSlot::Template).unwrap()));
    assert!(Arc::ptr_eq(&script, &document.doc(&BlockSlot::Script).unwrap()));
    assert_eq!(script.generated_text().unwrap(), script_text);
    assert!(document.drain_evicted().is_empty());

    // Once the tag is closed the blocks move and are rebuilt at their new offsets.
    let typed = format!("<docs>\n</docs>\n{}", FOO_SOURCE);
    document.update(&[full_change(&typed)], 3).unwrap();
    assert!(document.errors().is_empty());
    let script_block = document.descriptor().script.clone().unwrap();
    assert_eq!(&typed[script_block.range.clone()], script_block.content);
    assert!(document.drain_evicted().contains(&SCRIPT_ID.to_string()));
}

#[test]
fn test_half_typed_end_tag_keeps_script() {
    let document = open(FOO_SOURCE);
    let template = document.doc(&BlockSlot::Template).unwrap();
    let script = document.doc(&BlockSlot::Script).unwrap();
    let main = document.main_text();

    document.update(&[full_change(&FOO_SOURCE.replace("</script>", "</scr"))], 2).unwrap();

    assert_eq!(document.errors().len(), 1);
    assert!(Arc::ptr_eq(&template, &document.doc(&BlockSlot::Template).unwrap()));
    assert!(Arc::ptr_eq(&script, &document.doc(&BlockSlot::Script).unwrap()));
    assert_eq!(document.main_text().text, main.text);
    assert!(document.drain_evicted().is_empty());
}

#[test]
fn test_non_ascii_content_generates_and_maps() {
    let source = indoc! {r#"
        <template>
          <p title="café">héllo 日本語 🎉 {{ msg }}</p>
        </template>
        <script lang="ts">
        export default { data: () => ({ msg: 'héllo wörld' }) }
        </script>
    "#};
    let document = open(source);

    let script = document.doc(&BlockSlot::Script).unwrap();
    assert!(script.generated_text().unwrap().unwrap().contains("'héllo wörld'"));

    let usage = nth_offset(source, "msg", 0);
    let template = document.doc_at(usage).unwrap();
    let code = template.generated_text().unwrap().unwrap();
    let generated = template.generated_offset_at(usage).unwrap();
    assert_eq!(&code[generated..generated + 3], "msg");
    assert_eq!(template.absolute_offset_at(generated), Some(usage));
}
