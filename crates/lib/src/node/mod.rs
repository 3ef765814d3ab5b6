//! The storage node model.
//!
//! A document is a flat set of typed nodes keyed by id, each pointing at its
//! parent. Content lives in two places:
//!
//! - Object nodes carry their scalar fields inline; nested containers are
//!   child nodes keyed by field name.
//! - Map and List nodes carry nothing themselves; every entry is a child node
//!   (scalars are wrapped in Register nodes). Map children are keyed by
//!   string, List children by [`Position`].
//!
//! [`NodeTree`] owns every node and maintains the per-parent child indices.
//! Nothing outside the tree holds references into it, only [`NodeId`]s.

use std::{borrow::Borrow, fmt};

use serde::{Deserialize, Serialize};

use crate::{Fields, Json, constants::ROOT_ID, position::Position};

pub mod errors;
mod tree;

pub use errors::TreeError;
pub use tree::{KeyedEntries, KeyedEntry, NodeTree};

/// A node's identity, assigned once at creation and retired on deletion.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a new NodeId from a string.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The fixed id of the document root.
    pub fn root() -> Self {
        Self(ROOT_ID.to_string())
    }

    /// Get the underlying string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_ID
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&NodeId> for NodeId {
    fn from(id: &NodeId) -> Self {
        id.clone()
    }
}

/// The four node kinds. A node's kind never changes after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Object,
    Map,
    List,
    Register,
}

impl NodeKind {
    /// True for the kinds that can have children.
    pub fn is_container(self) -> bool {
        !matches!(self, NodeKind::Register)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Object => "Object",
            NodeKind::Map => "Map",
            NodeKind::List => "List",
            NodeKind::Register => "Register",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a node sits under its parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParentKey {
    /// Field name under an Object or key under a Map
    Field(String),
    /// Ordering key under a List
    Position(Position),
}

impl ParentKey {
    pub fn as_str(&self) -> &str {
        match self {
            ParentKey::Field(key) => key,
            ParentKey::Position(pos) => pos.as_str(),
        }
    }

    pub fn as_position(&self) -> Option<&Position> {
        match self {
            ParentKey::Position(pos) => Some(pos),
            ParentKey::Field(_) => None,
        }
    }
}

impl fmt::Display for ParentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link from a node to its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    pub id: NodeId,
    pub key: ParentKey,
}

impl ParentLink {
    pub fn field(id: impl Into<NodeId>, key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: ParentKey::Field(key.into()),
        }
    }

    pub fn position(id: impl Into<NodeId>, position: Position) -> Self {
        Self {
            id: id.into(),
            key: ParentKey::Position(position),
        }
    }
}

/// The kind-specific payload of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    /// Scalar fields of an Object; containers are child nodes
    Object(Fields),
    /// Map entries are child nodes
    Map,
    /// List entries are child nodes
    List,
    /// A single JSON value (which may be an explicit `null`)
    Register(Json),
}

impl NodeData {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::Object(_) => NodeKind::Object,
            NodeData::Map => NodeKind::Map,
            NodeData::List => NodeKind::List,
            NodeData::Register(_) => NodeKind::Register,
        }
    }
}

/// One node of the storage tree.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageNode {
    pub id: NodeId,
    /// `None` only for the root
    pub parent: Option<ParentLink>,
    pub data: NodeData,
}

impl StorageNode {
    /// The document root: an empty Object with the fixed root id.
    pub fn root() -> Self {
        Self {
            id: NodeId::root(),
            parent: None,
            data: NodeData::Object(Fields::new()),
        }
    }

    pub fn new(id: impl Into<NodeId>, parent: ParentLink, data: NodeData) -> Self {
        Self {
            id: id.into(),
            parent: Some(parent),
            data,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }

    pub fn parent_id(&self) -> Option<&NodeId> {
        self.parent.as_ref().map(|link| &link.id)
    }

    pub fn parent_key(&self) -> Option<&ParentKey> {
        self.parent.as_ref().map(|link| &link.key)
    }

    /// Scalar fields, for Object nodes.
    pub fn fields(&self) -> Option<&Fields> {
        match &self.data {
            NodeData::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Register content, for Register nodes.
    pub fn register_value(&self) -> Option<&Json> {
        match &self.data {
            NodeData::Register(value) => Some(value),
            _ => None,
        }
    }

    /// Converts to the wire form used for snapshots.
    pub fn to_serialized(&self) -> SerializedNode {
        let data = match &self.data {
            NodeData::Object(fields) => Some(Json::Object(fields.clone())),
            NodeData::Register(value) => Some(value.clone()),
            NodeData::Map | NodeData::List => None,
        };
        SerializedNode(
            self.id.clone(),
            SerializedCrdt {
                kind: self.kind(),
                parent_id: self.parent_id().cloned(),
                parent_key: self.parent_key().map(|key| key.as_str().to_string()),
                data,
            },
        )
    }
}

/// Wire form of a node: `[id, { type, parentId?, parentKey?, data? }]`.
///
/// The parent key stays a plain string here; whether it is a field name or a
/// [`Position`] depends on the parent's kind, which only the tree knows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedNode(pub NodeId, pub SerializedCrdt);

/// Body of a [`SerializedNode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedCrdt {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_key: Option<String>,
    /// Object fields or Register content. A Register holding `null` keeps
    /// `Some(Json::Null)`, which is distinct from a missing `data` key.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_value"
    )]
    pub data: Option<Json>,
}

/// Deserializes a present `data` key as `Some`, even when it holds `null`.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Json>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Json::deserialize(deserializer).map(Some)
}
