//! Composite file structure: blocks, parsing and virtual block names
pub mod descriptor;
pub mod identifier;
pub mod parser;

pub use descriptor::{
    has_block_changed, Attributes, BlockDescriptor, BlockKind, BlockSlot, ParseError, SfcDescriptor,
};
pub use identifier::{VirtualId, QUERY_MARKER};
pub use parser::{BlockParser, ParseOutput, SfcParser};
