//! Content streams - operator vocabulary, block tree, and traversal.
//!
//! - `ops` - operator enum, block pairs and argument signatures
//! - `tree` - parsing into a block tree, validation, serialization
//! - `traverse` - depth-first walk with value-typed state

pub mod ops;
pub mod traverse;
pub mod tree;

pub use ops::{ArgKind, Op, Signature};
pub use traverse::{OpFn, OpTable, StateHandler, traverse};
pub use tree::{Block, ContentNode, ContentTree, InlineImage, Operation, ValidationWarning};
