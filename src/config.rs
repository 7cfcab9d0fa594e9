//! Options shared by every composite document in a session

use std::sync::Arc;

use crate::sfc::{BlockParser, SfcParser};
use crate::transform::TransformerRegistry;

/// Module imported for its side effects at the top of every main module.
pub const DEFAULT_RUNTIME_MODULE: &str = "vue-virtual-docs~runtime";

/// Extension of composite files.
pub const COMPOSITE_EXTENSION: &str = ".vue";

/// Suffix appended to a composite file name to form its main module name.
pub const MAIN_MODULE_SUFFIX: &str = ".ts";

/// Parser, transformers and main-module settings
#[derive(Debug, Clone)]
pub struct DocumentOptions {
    pub parser: Arc<dyn BlockParser>,
    pub transformers: TransformerRegistry,
    /// Side-effect import emitted first in the main module; `None` omits it.
    pub runtime_module: Option<String>,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            parser: Arc::new(SfcParser),
            transformers: TransformerRegistry::with_builtins(),
            runtime_module: Some(DEFAULT_RUNTIME_MODULE.to_string()),
        }
    }
}

impl DocumentOptions {
    pub fn with_transformers(mut self, transformers: TransformerRegistry) -> Self {
        self.transformers = transformers;
        self
    }

    pub fn with_runtime_module(mut self, runtime_module: Option<String>) -> Self {
        self.runtime_module = runtime_module;
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn BlockParser>) -> Self {
        self.parser = parser;
        self
    }
}

/// True for names ending in the composite extension.
pub fn is_composite_file(file_name: &str) -> bool {
    file_name.ends_with(COMPOSITE_EXTENSION)
}

/// `Foo.vue` -> `Foo.vue.ts`
pub fn main_module_name(file_name: &str) -> String {
    format!("{}{}", file_name, MAIN_MODULE_SUFFIX)
}

/// `Foo.vue.ts` -> `Foo.vue`; `None` for anything else.
pub fn composite_of_main_module(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(MAIN_MODULE_SUFFIX)
        .filter(|composite| is_composite_file(composite))
}
