//! Depth-first traversal of a [`ContentTree`] with threaded state.
//!
//! The state is a value: each block is entered with a copy, an operator
//! handler may return a replacement for later siblings, and a block's exit
//! state flows back to its parent. `q`/`Q` blocks are the exception; the
//! parent keeps the state it had before the block.

use super::ops::Op;
use super::tree::{ContentNode, ContentTree, InlineImage, Operation};
use crate::model::objects::PDFObject;
use rustc_hash::FxHashMap;

/// Pluggable state transition for [`traverse`].
pub trait StateHandler {
    type State: Clone;

    /// Handle one operator. `Some` replaces the state for what follows.
    fn handle(&mut self, operation: &Operation, state: &Self::State) -> Option<Self::State>;

    /// Called for each inline image.
    fn inline_image(&mut self, _image: &InlineImage, _state: &Self::State) {}
}

/// Walk `tree` from `initial`, returning the final top-level state.
pub fn traverse<H: StateHandler>(tree: &ContentTree, initial: H::State, handler: &mut H) -> H::State {
    walk(&tree.nodes, initial, handler)
}

fn walk<H: StateHandler>(nodes: &[ContentNode], mut state: H::State, handler: &mut H) -> H::State {
    for node in nodes {
        match node {
            ContentNode::Operator(operation) => {
                if let Some(next) = handler.handle(operation, &state) {
                    state = next;
                }
            }
            ContentNode::Block(block) => {
                let mut inner = state.clone();
                if let Some(next) = handler.handle(&block.open, &inner) {
                    inner = next;
                }
                inner = walk(&block.children, inner, handler);
                if let Some(next) = handler.handle(&block.close, &inner) {
                    inner = next;
                }
                if block.open.op != Op::Qq {
                    state = inner;
                }
            }
            ContentNode::InlineImage(image) => handler.inline_image(image, &state),
        }
    }
    state
}

/// Handler function for one operator kind.
pub type OpFn<S> = fn(&[PDFObject], &S) -> Option<S>;

/// A [`StateHandler`] built from a table of per-operator functions.
/// Operators without an entry leave the state untouched.
pub struct OpTable<S> {
    handlers: FxHashMap<Op, OpFn<S>>,
}

impl<S> Default for OpTable<S> {
    fn default() -> Self {
        Self {
            handlers: FxHashMap::default(),
        }
    }
}

impl<S> OpTable<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, op: Op, handler: OpFn<S>) -> Self {
        self.handlers.insert(op, handler);
        self
    }
}

impl<S: Clone> StateHandler for OpTable<S> {
    type State = S;

    fn handle(&mut self, operation: &Operation, state: &S) -> Option<S> {
        let handler = self.handlers.get(&operation.op)?;
        handler(&operation.args, state)
    }
}
