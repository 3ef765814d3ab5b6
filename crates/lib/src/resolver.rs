//! The conflict resolver: applies one operation to a node tree.
//!
//! Every replica applies the server's operations in the same total order, so
//! the only requirement for convergence is that [`apply_op`] is a pure
//! function of the tree and the operation. The rules:
//!
//! - Position and content are separate fields of an identity. `SetParentKey`
//!   writes only the Position, `UpdateRegister`/`UpdateObject` write only
//!   content, so a move and a set on the same node commute. Two writes to the
//!   same field resolve to whichever the server delivered last.
//! - Delete wins. An op addressing a deleted id is a no-op, including a Create
//!   whose `deletedId` or parent is already gone. Such a Create retires its
//!   own id as well, so nothing can later address a node that never existed.
//!   A tree installed from a server snapshot can also count ids it never saw
//!   as deleted (see [`NodeTree::is_deleted`]).
//! - A Create or UpdateObject that replaces the value at an Object or Map key
//!   keeps that key's place in the key order.
//! - A Create into an occupied Object or Map key replaces the occupant. A
//!   Create or move onto an occupied list Position lands just after the
//!   occupant instead.
//! - Invalid ops (unknown ids, wrong kinds, bad keys) are rejected with a
//!   [`TreeError`] and leave the tree untouched.

use tracing::{trace, warn};

use crate::{
    Fields,
    node::{NodeData, NodeId, NodeKind, NodeTree, ParentKey, ParentLink, StorageNode, TreeError},
    op::OpKind,
    position::Position,
};

/// What applying an op changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Applied {
    /// Nodes whose own content or set of children changed, including
    /// created and deleted nodes
    pub touched: Vec<NodeId>,
    /// Ops that undo this one when applied in order
    pub reverse: Vec<OpKind>,
}

impl Applied {
    /// True when the op had no effect (for example it addressed a deleted id).
    pub fn is_noop(&self) -> bool {
        self.touched.is_empty()
    }
}

/// Applies `op` to `tree`.
///
/// On error the tree is unchanged.
pub fn apply_op(tree: &mut NodeTree, op: &OpKind) -> Result<Applied, TreeError> {
    trace!(op = op.name(), id = %op.id(), "applying op");
    match op {
        OpKind::CreateObject {
            id,
            parent_id,
            parent_key,
            deleted_id,
            data,
        } => create(
            tree,
            id,
            parent_id,
            parent_key,
            deleted_id.as_ref(),
            NodeData::Object(data.clone()),
        ),
        OpKind::CreateMap {
            id,
            parent_id,
            parent_key,
            deleted_id,
        } => create(
            tree,
            id,
            parent_id,
            parent_key,
            deleted_id.as_ref(),
            NodeData::Map,
        ),
        OpKind::CreateList {
            id,
            parent_id,
            parent_key,
            deleted_id,
        } => create(
            tree,
            id,
            parent_id,
            parent_key,
            deleted_id.as_ref(),
            NodeData::List,
        ),
        OpKind::CreateRegister {
            id,
            parent_id,
            parent_key,
            deleted_id,
            data,
        } => create(
            tree,
            id,
            parent_id,
            parent_key,
            deleted_id.as_ref(),
            NodeData::Register(data.clone()),
        ),
        OpKind::UpdateObject { id, data } => update_object(tree, id, data),
        OpKind::UpdateRegister { id, data } => {
            if tree.is_deleted(id.as_str()) {
                return Ok(Applied::default());
            }
            let old = tree.set_register(id.as_str(), data.clone())?;
            Ok(Applied {
                touched: vec![id.clone()],
                reverse: vec![OpKind::UpdateRegister {
                    id: id.clone(),
                    data: old,
                }],
            })
        }
        OpKind::DeleteObjectKey { id, key } => delete_object_key(tree, id, key),
        OpKind::DeleteCrdt { id } => {
            if tree.is_deleted(id.as_str()) {
                return Ok(Applied::default());
            }
            let parent = tree.get(id.as_str()).and_then(|n| n.parent_id()).cloned();
            let removed = tree.detach(id.as_str())?;
            let mut applied = Applied::default();
            applied.touched.extend(parent);
            record_removed(&mut applied, removed, None);
            Ok(applied)
        }
        OpKind::SetParentKey { id, parent_key } => set_parent_key(tree, id, parent_key),
    }
}

/// Applies `op`, logging and dropping it when it is rejected.
///
/// This is the boundary for ops the local user did not issue: a stale or
/// malformed op costs at most its own effect.
pub fn apply_or_drop(tree: &mut NodeTree, op: &OpKind) -> Applied {
    match apply_op(tree, op) {
        Ok(applied) => applied,
        Err(error) => {
            warn!(op = op.name(), id = %op.id(), %error, "dropping rejected op");
            Applied::default()
        }
    }
}

fn create(
    tree: &mut NodeTree,
    id: &NodeId,
    parent_id: &NodeId,
    raw_key: &str,
    deleted_id: Option<&NodeId>,
    data: NodeData,
) -> Result<Applied, TreeError> {
    if tree.is_tombstoned(id.as_str()) {
        return Ok(Applied::default());
    }
    // A node created under a deleted parent is born deleted.
    if tree.is_deleted(parent_id.as_str()) {
        tree.retire(id);
        return Ok(Applied::default());
    }
    if id.is_root() {
        return Err(TreeError::RootImmutable);
    }
    if tree.contains(id.as_str()) {
        return Err(TreeError::DuplicateNode { id: id.clone() });
    }

    let parent_kind = tree.kind(parent_id.as_str()).map_err(|_| TreeError::ParentNotFound {
        parent_id: parent_id.clone(),
    })?;
    let kind = data.kind();
    match parent_kind {
        NodeKind::Register => {
            return Err(TreeError::type_mismatch(parent_id, "a container", parent_kind));
        }
        NodeKind::Object if kind == NodeKind::Register => {
            return Err(TreeError::type_mismatch(
                id,
                "Object, Map or List under an Object",
                kind,
            ));
        }
        _ => {}
    }

    // A set: take over the current slot of the node being replaced.
    if let Some(replaced) = deleted_id {
        if tree.is_deleted(replaced.as_str()) {
            tree.retire(id);
            return Ok(Applied::default());
        }
        let occupant = tree
            .get(replaced.as_str())
            .ok_or_else(|| TreeError::NodeNotFound {
                id: replaced.clone(),
            })?;
        let key = match &occupant.parent {
            Some(link) if &link.id == parent_id => link.key.clone(),
            _ => {
                return Err(TreeError::InvalidParentKey {
                    parent_id: parent_id.clone(),
                    key: raw_key.to_string(),
                    reason: format!("{replaced} is not a child of {parent_id}"),
                });
            }
        };
        let removed = match &key {
            ParentKey::Field(field) => tree.vacate(parent_id.as_str(), field)?.1,
            ParentKey::Position(_) => tree.detach(replaced.as_str())?,
        };
        tree.attach(StorageNode::new(
            id.clone(),
            ParentLink {
                id: parent_id.clone(),
                key,
            },
            data,
        ))?;
        let mut applied = Applied {
            touched: vec![parent_id.clone(), id.clone()],
            reverse: Vec::new(),
        };
        record_removed(&mut applied, removed, Some(id));
        return Ok(applied);
    }

    let key = tree.parent_key_for(parent_id, raw_key)?;
    let mut applied = Applied {
        touched: vec![parent_id.clone(), id.clone()],
        reverse: vec![OpKind::DeleteCrdt { id: id.clone() }],
    };

    let key = match key {
        ParentKey::Field(field) => {
            // The new node takes the key's place in the order.
            let (old_field, removed) = tree.vacate(parent_id.as_str(), &field)?;
            if let Some(old) = old_field {
                let mut restore = Fields::new();
                restore.insert(field.clone(), old);
                // UpdateObject also removes the node created here.
                applied.reverse = vec![OpKind::UpdateObject {
                    id: parent_id.clone(),
                    data: restore,
                }];
            }
            if !removed.is_empty() {
                applied.reverse.clear();
                record_removed(&mut applied, removed, Some(id));
            }
            ParentKey::Field(field)
        }
        ParentKey::Position(position) => {
            ParentKey::Position(free_position(tree, parent_id, position, None))
        }
    };

    tree.attach(StorageNode::new(
        id.clone(),
        ParentLink {
            id: parent_id.clone(),
            key,
        },
        data,
    ))?;
    Ok(applied)
}

fn update_object(tree: &mut NodeTree, id: &NodeId, data: &Fields) -> Result<Applied, TreeError> {
    if tree.is_deleted(id.as_str()) {
        return Ok(Applied::default());
    }
    let kind = tree.kind(id.as_str())?;
    if kind != NodeKind::Object {
        return Err(TreeError::type_mismatch(id, "Object", kind));
    }

    let displaced: Vec<&String> = data
        .keys()
        .filter(|key| tree.child_at(id.as_str(), key).is_some())
        .collect();
    let mut removed = Vec::new();
    for key in displaced {
        removed.extend(tree.vacate(id.as_str(), key)?.1);
    }
    let previous = tree.set_fields(id.as_str(), data)?;

    let mut applied = Applied {
        touched: vec![id.clone()],
        reverse: Vec::new(),
    };
    let mut restore = Fields::new();
    for (key, old) in previous {
        match old {
            Some(value) => {
                restore.insert(key, value);
            }
            None => applied.reverse.push(OpKind::DeleteObjectKey {
                id: id.clone(),
                key,
            }),
        }
    }
    if !restore.is_empty() {
        applied.reverse.insert(
            0,
            OpKind::UpdateObject {
                id: id.clone(),
                data: restore,
            },
        );
    }
    record_removed(&mut applied, removed, None);
    Ok(applied)
}

fn delete_object_key(tree: &mut NodeTree, id: &NodeId, key: &str) -> Result<Applied, TreeError> {
    if tree.is_deleted(id.as_str()) {
        return Ok(Applied::default());
    }
    let kind = tree.kind(id.as_str())?;
    if kind != NodeKind::Object {
        return Err(TreeError::type_mismatch(id, "Object", kind));
    }

    let mut applied = Applied::default();
    if let Some(child) = tree.child_at(id.as_str(), key).cloned() {
        let removed = tree.detach(child.as_str())?;
        applied.touched.push(id.clone());
        record_removed(&mut applied, removed, None);
    } else if let Some(old) = tree.remove_field(id.as_str(), key)? {
        let mut restore = Fields::new();
        restore.insert(key.to_string(), old);
        applied.touched.push(id.clone());
        applied.reverse.push(OpKind::UpdateObject {
            id: id.clone(),
            data: restore,
        });
    }
    Ok(applied)
}

fn set_parent_key(
    tree: &mut NodeTree,
    id: &NodeId,
    position: &Position,
) -> Result<Applied, TreeError> {
    if tree.is_deleted(id.as_str()) {
        return Ok(Applied::default());
    }
    let node = tree
        .get(id.as_str())
        .ok_or_else(|| TreeError::NodeNotFound { id: id.clone() })?;
    let Some(parent_id) = node.parent_id().cloned() else {
        return Err(TreeError::RootImmutable);
    };
    let parent_kind = tree.kind(parent_id.as_str())?;
    if parent_kind != NodeKind::List {
        return Err(TreeError::type_mismatch(&parent_id, "List", parent_kind));
    }

    let target = free_position(tree, &parent_id, position.clone(), Some(id));
    let old = tree.set_position(id.as_str(), target)?;
    Ok(Applied {
        touched: vec![parent_id, id.clone()],
        reverse: vec![OpKind::SetParentKey {
            id: id.clone(),
            parent_key: old,
        }],
    })
}

/// Resolves a list Position collision deterministically.
///
/// If `position` is held by a node other than `moving`, the result is the
/// midpoint between it and the next sibling. This depends only on the tree,
/// so every replica picks the same slot.
fn free_position(
    tree: &NodeTree,
    list: &NodeId,
    position: Position,
    moving: Option<&NodeId>,
) -> Position {
    let Ok(children) = tree.list_children(list.as_str()) else {
        return position;
    };
    match children.binary_search_by(|(p, _)| p.cmp(&position)) {
        Ok(idx) if Some(&children[idx].1) != moving => {
            let next = children.get(idx + 1).map(|(p, _)| p);
            Position::between(&position, next)
        }
        _ => position,
    }
}

/// Adds removed nodes to `touched` and the Creates that rebuild them to
/// `reverse`. With `replaced_by`, the rebuilt subtree root takes the slot of
/// that node back.
fn record_removed(applied: &mut Applied, removed: Vec<StorageNode>, replaced_by: Option<&NodeId>) {
    for (i, node) in removed.iter().enumerate() {
        let deleted_id = if i == 0 { replaced_by.cloned() } else { None };
        applied.reverse.extend(OpKind::create(node, deleted_id));
    }
    applied.touched.extend(removed.into_iter().map(|node| node.id));
}
