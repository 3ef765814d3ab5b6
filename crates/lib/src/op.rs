//! Operations: the wire unit of change.
//!
//! Every local mutation is expressed as one or more [`Op`]s, applied locally
//! and sent to the server, which rebroadcasts them to every client in a
//! single total order. The JSON shape is internally tagged by `"type"`:
//!
//! ```json
//! { "type": "CreateList", "opId": "1:4", "id": "1:9", "parentId": "root", "parentKey": "todos" }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    Fields, Json,
    clock::OpId,
    node::{NodeData, NodeId, StorageNode},
    position::Position,
};

/// An operation plus the id its originator uses to recognize the echo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Op {
    #[serde(rename = "opId", default, skip_serializing_if = "Option::is_none")]
    pub op_id: Option<OpId>,
    #[serde(flatten)]
    pub kind: OpKind,
}

impl Op {
    pub fn new(kind: OpKind) -> Self {
        Self { op_id: None, kind }
    }

    pub fn with_id(op_id: OpId, kind: OpKind) -> Self {
        Self {
            op_id: Some(op_id),
            kind,
        }
    }
}

/// The complete set of operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum OpKind {
    /// Create an Object. `data` holds its scalar fields only.
    CreateObject {
        id: NodeId,
        parent_id: NodeId,
        parent_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deleted_id: Option<NodeId>,
        #[serde(default)]
        data: Fields,
    },
    CreateMap {
        id: NodeId,
        parent_id: NodeId,
        parent_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deleted_id: Option<NodeId>,
    },
    CreateList {
        id: NodeId,
        parent_id: NodeId,
        parent_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deleted_id: Option<NodeId>,
    },
    CreateRegister {
        id: NodeId,
        parent_id: NodeId,
        parent_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deleted_id: Option<NodeId>,
        data: Json,
    },
    /// Write scalar fields of an Object.
    UpdateObject { id: NodeId, data: Fields },
    /// Replace a Register's content.
    UpdateRegister { id: NodeId, data: Json },
    /// Remove one key of an Object, scalar or child.
    DeleteObjectKey { id: NodeId, key: String },
    /// Remove a node and its subtree.
    DeleteCrdt { id: NodeId },
    /// Move a List child to a new Position.
    SetParentKey { id: NodeId, parent_key: Position },
}

impl OpKind {
    /// The node this op creates or addresses.
    pub fn id(&self) -> &NodeId {
        match self {
            OpKind::CreateObject { id, .. }
            | OpKind::CreateMap { id, .. }
            | OpKind::CreateList { id, .. }
            | OpKind::CreateRegister { id, .. }
            | OpKind::UpdateObject { id, .. }
            | OpKind::UpdateRegister { id, .. }
            | OpKind::DeleteObjectKey { id, .. }
            | OpKind::DeleteCrdt { id }
            | OpKind::SetParentKey { id, .. } => id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OpKind::CreateObject { .. } => "CreateObject",
            OpKind::CreateMap { .. } => "CreateMap",
            OpKind::CreateList { .. } => "CreateList",
            OpKind::CreateRegister { .. } => "CreateRegister",
            OpKind::UpdateObject { .. } => "UpdateObject",
            OpKind::UpdateRegister { .. } => "UpdateRegister",
            OpKind::DeleteObjectKey { .. } => "DeleteObjectKey",
            OpKind::DeleteCrdt { .. } => "DeleteCrdt",
            OpKind::SetParentKey { .. } => "SetParentKey",
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(
            self,
            OpKind::CreateObject { .. }
                | OpKind::CreateMap { .. }
                | OpKind::CreateList { .. }
                | OpKind::CreateRegister { .. }
        )
    }

    /// The Create op that rebuilds `node` under its current parent.
    ///
    /// Returns `None` for the root, which is never created.
    pub fn create(node: &StorageNode, deleted_id: Option<NodeId>) -> Option<Self> {
        let link = node.parent.as_ref()?;
        let id = node.id.clone();
        let parent_id = link.id.clone();
        let parent_key = link.key.as_str().to_string();
        Some(match &node.data {
            NodeData::Object(fields) => OpKind::CreateObject {
                id,
                parent_id,
                parent_key,
                deleted_id,
                data: fields.clone(),
            },
            NodeData::Map => OpKind::CreateMap {
                id,
                parent_id,
                parent_key,
                deleted_id,
            },
            NodeData::List => OpKind::CreateList {
                id,
                parent_id,
                parent_key,
                deleted_id,
            },
            NodeData::Register(value) => OpKind::CreateRegister {
                id,
                parent_id,
                parent_key,
                deleted_id,
                data: value.clone(),
            },
        })
    }

    /// Rewrites every node id this op mentions through `ids`.
    ///
    /// Used by history when a recreated subtree gets fresh ids.
    pub fn remap(&mut self, ids: &HashMap<NodeId, NodeId>) {
        let swap = |id: &mut NodeId| {
            if let Some(fresh) = ids.get(id) {
                *id = fresh.clone();
            }
        };
        match self {
            OpKind::CreateObject {
                id,
                parent_id,
                deleted_id,
                ..
            }
            | OpKind::CreateMap {
                id,
                parent_id,
                deleted_id,
                ..
            }
            | OpKind::CreateList {
                id,
                parent_id,
                deleted_id,
                ..
            }
            | OpKind::CreateRegister {
                id,
                parent_id,
                deleted_id,
                ..
            } => {
                swap(id);
                swap(parent_id);
                if let Some(deleted) = deleted_id {
                    swap(deleted);
                }
            }
            OpKind::UpdateObject { id, .. }
            | OpKind::UpdateRegister { id, .. }
            | OpKind::DeleteObjectKey { id, .. }
            | OpKind::DeleteCrdt { id }
            | OpKind::SetParentKey { id, .. } => swap(id),
        }
    }

    /// Replaces the id of a Create op. No effect on other ops.
    pub(crate) fn set_created_id(&mut self, fresh: NodeId) {
        match self {
            OpKind::CreateObject { id, .. }
            | OpKind::CreateMap { id, .. }
            | OpKind::CreateList { id, .. }
            | OpKind::CreateRegister { id, .. } => *id = fresh,
            _ => {}
        }
    }
}
