//! Undo and redo stacks.
//!
//! An entry is the list of ops that reverts one local mutation (or one
//! batch). Undoing issues those ops as a new mutation; its own reverse becomes
//! the redo entry.

use std::collections::{HashMap, VecDeque};

use crate::{node::NodeId, op::OpKind};

#[derive(Debug, Default)]
pub(crate) struct History {
    undo: VecDeque<Vec<OpKind>>,
    redo: Vec<Vec<OpKind>>,
    limit: usize,
}

impl History {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            limit,
        }
    }

    /// Records a fresh local mutation. Clears the redo stack.
    pub(crate) fn record(&mut self, entry: Vec<OpKind>) {
        self.redo.clear();
        self.push_undo(entry);
    }

    /// Records the reverse of a redo without touching the redo stack.
    pub(crate) fn push_undo(&mut self, entry: Vec<OpKind>) {
        if entry.is_empty() || self.limit == 0 {
            return;
        }
        self.undo.push_back(entry);
        while self.undo.len() > self.limit {
            self.undo.pop_front();
        }
    }

    pub(crate) fn push_redo(&mut self, entry: Vec<OpKind>) {
        if !entry.is_empty() {
            self.redo.push(entry);
        }
    }

    pub(crate) fn pop_undo(&mut self) -> Option<Vec<OpKind>> {
        self.undo.pop_back()
    }

    pub(crate) fn pop_redo(&mut self) -> Option<Vec<OpKind>> {
        self.redo.pop()
    }

    pub(crate) fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub(crate) fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Points every stored op at recreated nodes' fresh ids.
    pub(crate) fn remap(&mut self, ids: &HashMap<NodeId, NodeId>) {
        if ids.is_empty() {
            return;
        }
        for op in self.undo.iter_mut().chain(self.redo.iter_mut()).flatten() {
            op.remap(ids);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
