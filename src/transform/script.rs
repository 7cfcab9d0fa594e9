use crate::error::TransformError;
use crate::sfc::BlockDescriptor;

use super::{TransformContext, TransformOutput, Transformer};

/// Pass-through transformer for `<script>` and `<script setup>` blocks
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptTransformer;

impl Transformer for ScriptTransformer {
    fn output_language(&self, block: &BlockDescriptor) -> String {
        match block.lang.as_deref() {
            Some(lang @ ("ts" | "tsx" | "jsx")) => lang.to_string(),
            _ => "js".to_string(),
        }
    }

    fn transform(
        &self,
        block: &BlockDescriptor,
        _context: &TransformContext<'_>,
    ) -> Result<TransformOutput, TransformError> {
        // A `src` import replaces inline content.
        if block.attrs.contains("src") && !block.content.trim().is_empty() {
            return Err(TransformError::MalformedAttribute {
                name: "src".to_string(),
                reason: "a script with `src` must not have inline content".to_string(),
            });
        }
        Ok(TransformOutput::pass_through(block.content.clone(), self.output_language(block)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sfc::{BlockKind, BlockSlot};
    use crate::transform::OffsetMapping;

    fn script(lang: Option<&str>, content: &str) -> BlockDescriptor {
        let mut block = BlockDescriptor::new(BlockKind::Script, content, 10..10 + content.len());
        block.lang = lang.map(str::to_string);
        block
    }

    #[test]
    fn test_output_language_follows_lang() {
        assert_eq!(ScriptTransformer.output_language(&script(Some("ts"), "")), "ts");
        assert_eq!(ScriptTransformer.output_language(&script(Some("tsx"), "")), "tsx");
        assert_eq!(ScriptTransformer.output_language(&script(Some("coffee"), "")), "js");
        assert_eq!(ScriptTransformer.output_language(&script(None, "")), "js");
    }

    #[test]
    fn test_content_passes_through() {
        let block = script(Some("ts"), "export default {}");
        let context = TransformContext { file_name: "Foo.vue", slot: &BlockSlot::Script, script_import: None };
        let output = ScriptTransformer.transform(&block, &context).unwrap();
        assert_eq!(output.code, "export default {}");
        assert_eq!(output.mapping, OffsetMapping::Identity);
    }

    #[test]
    fn test_src_with_inline_content_is_rejected() {
        let mut block = script(None, "let a = 1");
        block.attrs.insert("src", "./a.js");
        let context = TransformContext { file_name: "Foo.vue", slot: &BlockSlot::Script, script_import: None };
        assert!(matches!(
            ScriptTransformer.transform(&block, &context),
            Err(TransformError::MalformedAttribute { .. })
        ));
    }
}
