//! Virtual documents for Vue single-file components
//!
//! A composite `.vue` file is split into per-block virtual documents that an
//! analysis engine can treat as ordinary files. Offsets map between the
//! composite text and each block's generated text, and analysis results on the
//! virtual files are mapped back to the composite file.

pub mod bridge;
pub mod config;
pub mod documents;
pub mod error;
pub mod logging;
pub mod resolver;
pub mod sfc;
pub mod text_source;
pub mod transform;

pub use bridge::{DiskFilesystem, FilesystemBridge, HostFilesystem, WatcherRegistry};
pub use config::DocumentOptions;
pub use documents::{BlockDocument, CompositeDocument, DocumentStore, FileKind, MainModule};
pub use error::{DocumentError, IdentifierError, TransformError};
pub use resolver::{AnalysisEngine, DefinitionInfo, DefinitionInfoAndBoundSpan, PositionResolver, TextSpan};
pub use sfc::{BlockDescriptor, BlockKind, BlockSlot, VirtualId};
