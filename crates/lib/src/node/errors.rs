//! Error types for the storage node model.
//!
//! Every failure here leaves the tree untouched. The resolver absorbs these
//! errors for remote operations; the room's mutation API returns them to the
//! caller before anything is sent.

use thiserror::Error;

use super::{NodeId, NodeKind};

/// Structured errors raised by [`NodeTree`](super::NodeTree) operations.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TreeError {
    /// The operation names a parent that is not in the tree
    #[error("parent node not found: {parent_id}")]
    ParentNotFound { parent_id: NodeId },

    /// The operation names a node that is not in the tree
    #[error("node not found: {id}")]
    NodeNotFound { id: NodeId },

    /// A create names an id that is already live
    #[error("node already exists: {id}")]
    DuplicateNode { id: NodeId },

    /// A create names an id that was deleted; ids are never reused
    #[error("node id was deleted and cannot be reused: {id}")]
    Tombstoned { id: NodeId },

    /// The nodes do not form a single tree under the root
    #[error("node {id} is part of a cycle and not reachable from the root")]
    Cycle { id: NodeId },

    /// A node other than the root has no parent
    #[error("node {id} has no parent")]
    MissingParent { id: NodeId },

    /// A node's payload does not fit its kind
    #[error("invalid data for {id}: {reason}")]
    InvalidData { id: NodeId, reason: String },

    /// The root can be neither created twice, deleted nor moved
    #[error("the root node cannot be replaced, deleted or moved")]
    RootImmutable,

    /// The parent key does not fit the parent's kind
    #[error("invalid parent key {key:?} under {parent_id}: {reason}")]
    InvalidParentKey {
        parent_id: NodeId,
        key: String,
        reason: String,
    },

    /// Another child already occupies the key
    #[error("key {key:?} under {parent_id} is already occupied")]
    KeyOccupied { parent_id: NodeId, key: String },

    /// Another list child already occupies the position
    #[error("position {position} under {parent_id} is already occupied")]
    PositionConflict { parent_id: NodeId, position: String },

    /// A list index is past the end of the list
    #[error("list index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    /// The node's recorded kind disagrees with what the operation implies
    #[error("type mismatch on {id}: expected {expected}, found {actual}")]
    TypeMismatch {
        id: NodeId,
        expected: String,
        actual: NodeKind,
    },
}

impl TreeError {
    /// Check if this error is structural (missing nodes, cycles, occupied keys)
    pub fn is_structural(&self) -> bool {
        !self.is_type_mismatch()
    }

    /// Check if this error is a node kind mismatch
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, TreeError::TypeMismatch { .. })
    }

    /// Check if this error means a referenced node does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TreeError::ParentNotFound { .. } | TreeError::NodeNotFound { .. }
        )
    }

    /// Get the node id this error is about, if any
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            TreeError::ParentNotFound { parent_id }
            | TreeError::InvalidParentKey { parent_id, .. }
            | TreeError::KeyOccupied { parent_id, .. }
            | TreeError::PositionConflict { parent_id, .. } => Some(parent_id),
            TreeError::NodeNotFound { id }
            | TreeError::DuplicateNode { id }
            | TreeError::Tombstoned { id }
            | TreeError::Cycle { id }
            | TreeError::MissingParent { id }
            | TreeError::InvalidData { id, .. }
            | TreeError::TypeMismatch { id, .. } => Some(id),
            TreeError::RootImmutable | TreeError::IndexOutOfBounds { .. } => None,
        }
    }

    pub(crate) fn type_mismatch(id: &NodeId, expected: impl Into<String>, actual: NodeKind) -> Self {
        TreeError::TypeMismatch {
            id: id.clone(),
            expected: expected.into(),
            actual,
        }
    }
}

impl From<TreeError> for crate::Error {
    fn from(err: TreeError) -> Self {
        crate::Error::Tree(err)
    }
}
