//! Synthesized entry module that re-exports a composite file's component

use std::collections::BTreeSet;

use crate::sfc::BlockSlot;

/// Text of a main module and the block identifiers it imports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MainModule {
    pub text: String,
    pub ids: BTreeSet<String>,
}

/// Relative import path for a block identifier: `./Foo.vue?vue&type=script&lang.ts`
/// becomes `./Foo.vue?vue&type=script&lang`.
pub fn import_path(id: &str) -> String {
    let stripped = [".tsx", ".jsx", ".ts", ".js"]
        .iter()
        .find_map(|ext| id.strip_suffix(*ext))
        .unwrap_or(id);
    let base = stripped.rsplit('/').next().unwrap_or(stripped);
    format!("./{}", base)
}

/// Quoted import source for a block identifier.
pub fn import_source(id: &str) -> String {
    quote(&import_path(id))
}

fn quote(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("{:?}", text))
}

/// Component name derived from a composite file name: `my-button.vue` -> `MyButton`.
pub fn component_name(file_name: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let stem = base.split('.').next().unwrap_or(base);
    let mut name: String = stem
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '$')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    if name.is_empty() {
        name.push_str("Component");
    } else if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// Builds the main module from the identifiers of transformable blocks.
///
/// `block_id` yields the identifier of the block in a slot, or `None` when the
/// slot is empty or its block type has no transformer.
pub(crate) fn generate(
    file_name: &str,
    slots: &[BlockSlot],
    block_id: impl Fn(&BlockSlot) -> Option<String>,
    runtime_module: Option<&str>,
) -> MainModule {
    let mut code: Vec<String> = Vec::new();
    let mut ids = BTreeSet::new();

    if let Some(runtime) = runtime_module {
        code.push(format!("import {}", quote(runtime)));
    }

    // Side-effect imports keep every block in the program.
    for slot in slots {
        if matches!(slot, BlockSlot::Script | BlockSlot::ScriptSetup) {
            continue;
        }
        if let Some(id) = block_id(slot) {
            code.push(format!("import {}", import_source(&id)));
            ids.insert(id);
        }
    }

    let setup = block_id(&BlockSlot::ScriptSetup);
    let script = block_id(&BlockSlot::Script);
    let mut props = Vec::new();
    match (setup, script) {
        (Some(setup), script) => {
            code.push(format!("import _Self from {}", import_source(&setup)));
            code.push(format!("export * from {}", import_source(&setup)));
            ids.insert(setup);
            if let Some(script) = script {
                code.push(format!("export * from {}", import_source(&script)));
                ids.insert(script);
            }
            props.push("InstanceType<typeof _Self>['$props']");
        }
        (None, Some(script)) => {
            code.push(format!("import _Self from {}", import_source(&script)));
            code.push(format!("export * from {}", import_source(&script)));
            ids.insert(script);
            props.push("InstanceType<typeof _Self>['$props']");
        }
        (None, None) => code.push("const _Self = {} as any".to_string()),
    }
    if props.is_empty() {
        props.push("{}");
    }

    let name = component_name(file_name);
    code.push(format!("export type __Props = {}", props.join(" & ")));
    code.push(format!("const {} = _Self", name));
    code.push(format!("export default {}", name));

    MainModule {
        text: code.join("\n"),
        ids,
    }
}
