//! Composite documents, their per-block virtual documents and the main module

pub mod block;
pub mod composite;
pub mod main_module;
pub mod store;

pub use block::BlockDocument;
pub use composite::{CompositeDocument, FALLBACK_SCRIPT};
pub use main_module::{component_name, import_path, import_source, MainModule};
pub use store::{DocumentStore, FileKind};
