//! Arena of storage nodes with per-parent child indices.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    slice,
};

use indexmap::{IndexMap, map};

use super::{
    NodeData, NodeId, NodeKind, ParentKey, ParentLink, SerializedCrdt, SerializedNode,
    StorageNode, TreeError,
};
use crate::{Fields, Json, position::Position};

/// Children of one container, in the order the codec and snapshots use.
#[derive(Debug, Clone, PartialEq)]
enum ChildIndex {
    /// Object and Map keys in the order they were first written. A `None`
    /// slot belongs to a scalar field of the Object, so fields and child
    /// containers share one ordering.
    Keyed(IndexMap<String, Option<NodeId>>),
    /// List children sorted by position
    Ordered(Vec<(Position, NodeId)>),
}

impl ChildIndex {
    fn for_data(data: &NodeData) -> Option<Self> {
        match data {
            NodeData::Object(fields) => Some(ChildIndex::Keyed(
                fields.keys().map(|key| (key.clone(), None)).collect(),
            )),
            NodeData::Map => Some(ChildIndex::Keyed(IndexMap::new())),
            NodeData::List => Some(ChildIndex::Ordered(Vec::new())),
            NodeData::Register(_) => None,
        }
    }

    fn ids(&self) -> Box<dyn DoubleEndedIterator<Item = &NodeId> + '_> {
        match self {
            ChildIndex::Keyed(slots) => Box::new(slots.values().flatten()),
            ChildIndex::Ordered(items) => Box::new(items.iter().map(|(_, id)| id)),
        }
    }
}

/// One entry of an Object or Map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyedEntry<'a> {
    /// A scalar field stored inline on an Object
    Field(&'a Json),
    /// A child node
    Child(&'a NodeId),
}

/// The entries of an Object or Map in key order, see [`NodeTree::keyed_entries`].
#[derive(Debug, Clone)]
pub struct KeyedEntries<'a> {
    slots: map::Iter<'a, String, Option<NodeId>>,
    fields: Option<&'a Fields>,
}

impl<'a> Iterator for KeyedEntries<'a> {
    type Item = (&'a str, KeyedEntry<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        for (key, slot) in self.slots.by_ref() {
            match slot {
                Some(child) => return Some((key.as_str(), KeyedEntry::Child(child))),
                None => {
                    // A slot with no field is vacant while its key is being replaced.
                    if let Some(value) = self.fields.and_then(|fields| fields.get(key)) {
                        return Some((key.as_str(), KeyedEntry::Field(value)));
                    }
                }
            }
        }
        None
    }
}

/// The node arena for one document.
///
/// Nodes are stored flat by id with parent links. Each container has a
/// secondary index of its children: an insertion-ordered key map for Objects
/// and Maps, and a position-sorted vector searched by binary search for
/// Lists. Deleted ids are remembered so they are never reused.
///
/// A tree loaded from a server snapshot never saw the deletions that happened
/// before it; [`NodeTree::assume_unknown_deleted`] makes it treat ids it does
/// not know as deleted.
#[derive(Debug, Clone)]
pub struct NodeTree {
    nodes: HashMap<NodeId, StorageNode>,
    children: HashMap<NodeId, ChildIndex>,
    tombstones: HashSet<NodeId>,
    unknown_deleted: bool,
}

impl PartialEq for NodeTree {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
            && self.children == other.children
            && self.tombstones == other.tombstones
    }
}

impl Default for NodeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeTree {
    /// Creates a tree holding only an empty root Object.
    pub fn new() -> Self {
        let mut tree = Self::empty();
        tree.install(StorageNode::root());
        tree
    }

    fn empty() -> Self {
        Self {
            nodes: HashMap::new(),
            children: HashMap::new(),
            tombstones: HashSet::new(),
            unknown_deleted: false,
        }
    }

    /// Builds a tree from a parent-before-child node stream, such as the
    /// output of the PlainLson decoder. The first node must be the root.
    ///
    /// Object keys come out scalar fields first, then child containers in
    /// stream order; [`NodeTree::order_keys`] restores another layout.
    pub fn from_nodes(nodes: impl IntoIterator<Item = StorageNode>) -> Result<Self, TreeError> {
        let mut tree = Self::empty();
        for node in nodes {
            if node.parent.is_none() {
                if !node.id.is_root() {
                    return Err(TreeError::MissingParent { id: node.id });
                }
                if tree.nodes.contains_key(node.id.as_str()) {
                    return Err(TreeError::RootImmutable);
                }
                if node.kind() != NodeKind::Object {
                    return Err(TreeError::type_mismatch(&node.id, "Object", node.kind()));
                }
                tree.install(node);
            } else {
                tree.attach(node)?;
            }
        }
        if !tree.nodes.contains_key(crate::constants::ROOT_ID) {
            return Err(TreeError::NodeNotFound { id: NodeId::root() });
        }
        Ok(tree)
    }

    /// Builds a tree from a snapshot in any order.
    ///
    /// Every node must be reachable from the root; orphans, cycles, duplicate
    /// ids and payloads that do not match their kind are rejected. Children
    /// keep the order they have in the snapshot.
    pub fn from_serialized(
        nodes: impl IntoIterator<Item = SerializedNode>,
    ) -> Result<Self, TreeError> {
        let mut root: Option<SerializedCrdt> = None;
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut by_parent: HashMap<NodeId, Vec<(NodeId, SerializedCrdt)>> = HashMap::new();

        for SerializedNode(id, crdt) in nodes {
            if !seen.insert(id.clone()) {
                return Err(TreeError::DuplicateNode { id });
            }
            match crdt.parent_id.clone() {
                None if id.is_root() => root = Some(crdt),
                None => return Err(TreeError::MissingParent { id }),
                Some(parent) => by_parent.entry(parent).or_default().push((id, crdt)),
            }
        }

        let root_id = NodeId::root();
        let root_crdt = root.ok_or_else(|| TreeError::NodeNotFound {
            id: root_id.clone(),
        })?;
        if root_crdt.kind != NodeKind::Object {
            return Err(TreeError::type_mismatch(&root_id, "Object", root_crdt.kind));
        }
        let mut tree = Self::empty();
        tree.install(StorageNode {
            data: node_data(&root_id, NodeKind::Object, root_crdt.data)?,
            ..StorageNode::root()
        });

        let mut queue = VecDeque::from([root_id]);
        while let Some(parent_id) = queue.pop_front() {
            for (id, crdt) in by_parent.remove(&parent_id).unwrap_or_default() {
                let raw_key = crdt.parent_key.ok_or_else(|| TreeError::InvalidParentKey {
                    parent_id: parent_id.clone(),
                    key: String::new(),
                    reason: "missing parent key".to_string(),
                })?;
                let key = tree.parent_key_for(&parent_id, &raw_key)?;
                let data = node_data(&id, crdt.kind, crdt.data)?;
                tree.attach(StorageNode::new(
                    id.clone(),
                    ParentLink {
                        id: parent_id.clone(),
                        key,
                    },
                    data,
                ))?;
                queue.push_back(id);
            }
        }

        // Anything left over hangs off a missing parent or sits in a cycle.
        if let Some((parent_id, kids)) = by_parent.into_iter().min_by(|a, b| a.0.cmp(&b.0)) {
            return Err(if seen.contains(&parent_id) {
                TreeError::Cycle {
                    id: kids.into_iter().map(|(id, _)| id).min().unwrap_or(parent_id),
                }
            } else {
                TreeError::ParentNotFound { parent_id }
            });
        }
        Ok(tree)
    }

    /// Snapshot of every node, parents before children.
    pub fn serialize(&self) -> Vec<SerializedNode> {
        self.subtree(crate::constants::ROOT_ID)
            .into_iter()
            .map(StorageNode::to_serialized)
            .collect()
    }

    // === Lookup ===

    pub fn root(&self) -> Option<&StorageNode> {
        self.nodes.get(crate::constants::ROOT_ID)
    }

    pub fn get(&self, id: &str) -> Option<&StorageNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// True when the id belonged to a node that has been deleted.
    pub fn is_tombstoned(&self, id: &str) -> bool {
        self.tombstones.contains(id)
    }

    /// True when ops addressing `id` are to be ignored: the id is tombstoned,
    /// or it is unknown and [`NodeTree::assume_unknown_deleted`] is in effect.
    pub fn is_deleted(&self, id: &str) -> bool {
        self.tombstones.contains(id) || (self.unknown_deleted && !self.nodes.contains_key(id))
    }

    /// From now on, treat every id this tree has never held as deleted.
    ///
    /// For a tree installed from a server snapshot: the server only sends
    /// live nodes, so an id the snapshot lacks was deleted before it was
    /// taken, and later ops naming it must be ignored rather than rejected.
    pub fn assume_unknown_deleted(&mut self) {
        self.unknown_deleted = true;
    }

    /// Number of live nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn kind(&self, id: &str) -> Result<NodeKind, TreeError> {
        self.nodes
            .get(id)
            .map(StorageNode::kind)
            .ok_or_else(|| TreeError::NodeNotFound { id: id.into() })
    }

    /// Children of a List in position order.
    pub fn list_children(&self, id: &str) -> Result<&[(Position, NodeId)], TreeError> {
        match self.children.get(id) {
            Some(ChildIndex::Ordered(items)) => Ok(items),
            _ => Err(self.expected(id, "List")),
        }
    }

    /// The id at `index` in a List.
    pub fn list_child_at(&self, id: &str, index: usize) -> Result<&NodeId, TreeError> {
        let items = self.list_children(id)?;
        items
            .get(index)
            .map(|(_, child)| child)
            .ok_or(TreeError::IndexOutOfBounds {
                index,
                len: items.len(),
            })
    }

    /// Current index of a List child among its siblings.
    pub fn list_index_of(&self, id: &str) -> Option<usize> {
        let node = self.nodes.get(id)?;
        let link = node.parent.as_ref()?;
        let position = link.key.as_position()?;
        match self.children.get(&link.id)? {
            ChildIndex::Ordered(items) => items.binary_search_by(|(p, _)| p.cmp(position)).ok(),
            ChildIndex::Keyed(_) => None,
        }
    }

    /// Scalar fields and child containers of an Object, or the children of a
    /// Map, in key order.
    pub fn keyed_entries(&self, id: &str) -> Result<KeyedEntries<'_>, TreeError> {
        match self.children.get(id) {
            Some(ChildIndex::Keyed(slots)) => Ok(KeyedEntries {
                slots: slots.iter(),
                fields: self.nodes.get(id).and_then(StorageNode::fields),
            }),
            _ => Err(self.expected(id, "Object or Map")),
        }
    }

    /// The child of an Object or Map at `key`.
    pub fn child_at(&self, id: &str, key: &str) -> Option<&NodeId> {
        match self.children.get(id)? {
            ChildIndex::Keyed(slots) => slots.get(key)?.as_ref(),
            ChildIndex::Ordered(_) => None,
        }
    }

    /// The first sibling position strictly after `position` in a List.
    pub fn next_position(&self, list: &str, position: &Position) -> Option<&Position> {
        let items = self.list_children(list).ok()?;
        let idx = items.partition_point(|(p, _)| p <= position);
        items.get(idx).map(|(p, _)| p)
    }

    /// Ids of the parent chain, nearest first.
    pub fn ancestors<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a NodeId> + 'a {
        let start = self.nodes.get(id).and_then(StorageNode::parent_id);
        std::iter::successors(start, move |parent| {
            self.nodes.get(parent.as_str()).and_then(StorageNode::parent_id)
        })
    }

    /// True if `ancestor` is `id` or one of its ancestors.
    pub fn is_within(&self, id: &str, ancestor: &str) -> bool {
        id == ancestor || self.ancestors(id).any(|a| a.as_str() == ancestor)
    }

    /// The node and all of its descendants, parents before children.
    pub fn subtree(&self, id: &str) -> Vec<&StorageNode> {
        let mut out = Vec::new();
        let mut stack: Vec<&str> = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            out.push(node);
            if let Some(index) = self.children.get(current) {
                stack.extend(index.ids().rev().map(NodeId::as_str));
            }
        }
        out
    }

    /// Plain JSON view of a subtree, without container wrappers.
    pub fn to_immutable(&self, id: &str) -> Option<Json> {
        self.fold_json(id, |_, payload| payload)
    }

    /// Builds one JSON value for the subtree at `id`, children in document
    /// order. Registers give their content; every container's payload (an
    /// object or an array) is passed through `finish` once its children are
    /// in. The walk keeps an explicit stack, so deep trees cannot overflow
    /// the call stack.
    pub(crate) fn fold_json(
        &self,
        id: &str,
        finish: impl Fn(NodeKind, Json) -> Json,
    ) -> Option<Json> {
        let mut stack = match self.start_fold(id, None)? {
            Folding::Done(value) => return Some(value),
            Folding::Open(container) => vec![container],
        };
        while let Some(top) = stack.last_mut() {
            let next = match &mut top.children {
                ChildWalk::Keyed(entries) => entries.next().map(|(key, entry)| (Some(key), entry)),
                ChildWalk::Ordered(items) => items
                    .next()
                    .map(|(_, child)| (None, KeyedEntry::Child(child))),
            };
            match next {
                Some((key, KeyedEntry::Field(value))) => top.push(key, value.clone()),
                Some((key, KeyedEntry::Child(child))) => {
                    match self.start_fold(child.as_str(), key) {
                        Some(Folding::Done(value)) => top.push(key, value),
                        Some(Folding::Open(container)) => stack.push(container),
                        None => {}
                    }
                }
                None => {
                    let container = stack.pop()?;
                    let value = finish(container.kind, container.payload);
                    match stack.last_mut() {
                        Some(parent) => parent.push(container.key, value),
                        None => return Some(value),
                    }
                }
            }
        }
        None
    }

    fn start_fold<'a>(&'a self, id: &str, key: Option<&'a str>) -> Option<Folding<'a>> {
        let node = self.nodes.get(id)?;
        let (children, payload) = match &node.data {
            NodeData::Register(value) => return Some(Folding::Done(value.clone())),
            NodeData::Object(_) | NodeData::Map => (
                ChildWalk::Keyed(self.keyed_entries(id).ok()?),
                Json::Object(Fields::new()),
            ),
            NodeData::List => {
                let items = self.list_children(id).ok()?;
                (
                    ChildWalk::Ordered(items.iter()),
                    Json::Array(Vec::with_capacity(items.len())),
                )
            }
        };
        Some(Folding::Open(OpenContainer {
            kind: node.kind(),
            key,
            children,
            payload,
        }))
    }

    // === Mutation primitives ===
    //
    // Each primitive validates fully before touching anything, so a failed
    // call leaves the tree exactly as it was.

    /// Interprets a raw wire parent key for the given parent.
    pub fn parent_key_for(&self, parent_id: &NodeId, raw: &str) -> Result<ParentKey, TreeError> {
        let parent = self
            .nodes
            .get(parent_id)
            .ok_or_else(|| TreeError::ParentNotFound {
                parent_id: parent_id.clone(),
            })?;
        match parent.kind() {
            NodeKind::Object | NodeKind::Map => Ok(ParentKey::Field(raw.to_string())),
            NodeKind::List => Position::parse(raw).map(ParentKey::Position).map_err(|e| {
                TreeError::InvalidParentKey {
                    parent_id: parent_id.clone(),
                    key: raw.to_string(),
                    reason: e.to_string(),
                }
            }),
            NodeKind::Register => Err(TreeError::type_mismatch(
                parent_id,
                "a container",
                NodeKind::Register,
            )),
        }
    }

    /// Adds a new node under its parent.
    ///
    /// Fails if the id is live or retired, the parent is missing or cannot
    /// hold this child, or the key/position is already taken.
    pub fn attach(&mut self, node: StorageNode) -> Result<(), TreeError> {
        let Some(link) = node.parent.as_ref() else {
            return Err(TreeError::RootImmutable);
        };
        if node.id.is_root() {
            return Err(TreeError::RootImmutable);
        }
        if self.nodes.contains_key(&node.id) {
            return Err(TreeError::DuplicateNode {
                id: node.id.clone(),
            });
        }
        if self.tombstones.contains(&node.id) {
            return Err(TreeError::Tombstoned {
                id: node.id.clone(),
            });
        }
        let parent = self
            .nodes
            .get(&link.id)
            .ok_or_else(|| TreeError::ParentNotFound {
                parent_id: link.id.clone(),
            })?;

        match (&parent.data, &link.key) {
            (NodeData::Object(fields), ParentKey::Field(key)) => {
                if node.kind() == NodeKind::Register {
                    return Err(TreeError::type_mismatch(
                        &node.id,
                        "Object, Map or List under an Object",
                        NodeKind::Register,
                    ));
                }
                if fields.contains_key(key) || self.child_at(link.id.as_str(), key).is_some() {
                    return Err(TreeError::KeyOccupied {
                        parent_id: link.id.clone(),
                        key: key.clone(),
                    });
                }
            }
            (NodeData::Map, ParentKey::Field(key)) => {
                if self.child_at(link.id.as_str(), key).is_some() {
                    return Err(TreeError::KeyOccupied {
                        parent_id: link.id.clone(),
                        key: key.clone(),
                    });
                }
            }
            (NodeData::List, ParentKey::Position(position)) => {
                if self.position_taken(link.id.as_str(), position) {
                    return Err(TreeError::PositionConflict {
                        parent_id: link.id.clone(),
                        position: position.to_string(),
                    });
                }
            }
            (NodeData::Register(_), _) => {
                return Err(TreeError::type_mismatch(
                    &link.id,
                    "a container",
                    NodeKind::Register,
                ));
            }
            (_, key) => {
                return Err(TreeError::InvalidParentKey {
                    parent_id: link.id.clone(),
                    key: key.to_string(),
                    reason: format!("key does not fit a {} parent", parent.kind()),
                });
            }
        }

        self.install(node);
        Ok(())
    }

    /// Removes a node and its whole subtree, retiring every id.
    ///
    /// Returns the removed nodes, parents before children.
    pub fn detach(&mut self, id: &str) -> Result<Vec<StorageNode>, TreeError> {
        self.detach_with(id, false)
    }

    /// Empties `key` of an Object or Map, removing the scalar field or the
    /// child subtree held there, but keeps the key's place in the order so
    /// the next write to it lands in the same spot.
    ///
    /// Returns the old field value and the removed nodes.
    pub fn vacate(
        &mut self,
        id: &str,
        key: &str,
    ) -> Result<(Option<Json>, Vec<StorageNode>), TreeError> {
        let child = match self.children.get(id) {
            Some(ChildIndex::Keyed(slots)) => slots.get(key).cloned().flatten(),
            _ => return Err(self.expected(id, "Object or Map")),
        };
        let removed = match child {
            Some(child) => self.detach_with(child.as_str(), true)?,
            None => Vec::new(),
        };
        let field = match self.nodes.get_mut(id).map(|n| &mut n.data) {
            Some(NodeData::Object(fields)) => fields.shift_remove(key),
            _ => None,
        };
        Ok((field, removed))
    }

    fn detach_with(&mut self, id: &str, keep_slot: bool) -> Result<Vec<StorageNode>, TreeError> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| TreeError::NodeNotFound { id: id.into() })?;
        let Some(link) = node.parent.clone() else {
            return Err(TreeError::RootImmutable);
        };

        let ids: Vec<NodeId> = self
            .subtree(id)
            .into_iter()
            .map(|n| n.id.clone())
            .collect();

        match self.children.get_mut(&link.id) {
            Some(ChildIndex::Keyed(slots)) => {
                if keep_slot {
                    if let Some(slot) = slots.get_mut(link.key.as_str()) {
                        *slot = None;
                    }
                } else {
                    slots.shift_remove(link.key.as_str());
                }
            }
            Some(ChildIndex::Ordered(items)) => {
                if let Some(position) = link.key.as_position() {
                    if let Ok(idx) = items.binary_search_by(|(p, _)| p.cmp(position)) {
                        items.remove(idx);
                    }
                }
            }
            None => {}
        }

        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            self.children.remove(&id);
            if let Some(node) = self.nodes.remove(&id) {
                removed.push(node);
            }
            self.tombstones.insert(id);
        }
        Ok(removed)
    }

    /// Retires an id that never made it into the tree, so later ops naming
    /// it are ignored like ops on any deleted node. Live ids are left alone.
    pub fn retire(&mut self, id: &NodeId) {
        if !self.nodes.contains_key(id) {
            self.tombstones.insert(id.clone());
        }
    }

    /// Carries over what `previous` knew about deleted ids: its tombstones
    /// and its nodes that this tree no longer has.
    pub fn inherit_tombstones(&mut self, previous: &NodeTree) {
        let gone: Vec<NodeId> = previous
            .tombstones
            .iter()
            .chain(previous.nodes.keys())
            .filter(|id| !self.nodes.contains_key(id.as_str()))
            .cloned()
            .collect();
        self.tombstones.extend(gone);
    }

    /// Puts the keys of an Object or Map in the order of `keys`. Keys not
    /// listed follow, in their current order.
    pub fn order_keys<'k>(&mut self, id: &str, keys: impl IntoIterator<Item = &'k str>) {
        let Some(ChildIndex::Keyed(slots)) = self.children.get_mut(id) else {
            return;
        };
        let mut ordered: IndexMap<String, Option<NodeId>> = IndexMap::with_capacity(slots.len());
        for key in keys {
            if let Some(slot) = slots.get(key) {
                ordered.insert(key.to_string(), slot.clone());
            }
        }
        for (key, slot) in slots.iter() {
            if !ordered.contains_key(key) {
                ordered.insert(key.clone(), slot.clone());
            }
        }
        *slots = ordered;
    }

    /// Moves a List child to a new position. Returns the old position.
    pub fn set_position(&mut self, id: &str, position: Position) -> Result<Position, TreeError> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| TreeError::NodeNotFound { id: id.into() })?;
        let Some(link) = node.parent.as_ref() else {
            return Err(TreeError::RootImmutable);
        };
        let Some(old) = link.key.as_position().cloned() else {
            let parent_kind = self.kind(link.id.as_str())?;
            return Err(TreeError::type_mismatch(&link.id, "List", parent_kind));
        };
        if old == position {
            return Ok(old);
        }
        let parent_id = link.id.clone();
        if self.position_taken(parent_id.as_str(), &position) {
            return Err(TreeError::PositionConflict {
                parent_id,
                position: position.to_string(),
            });
        }

        if let Some(ChildIndex::Ordered(items)) = self.children.get_mut(&parent_id) {
            if let Ok(idx) = items.binary_search_by(|(p, _)| p.cmp(&old)) {
                items.remove(idx);
            }
            let idx = items.partition_point(|(p, _)| p < &position);
            items.insert(idx, (position.clone(), id.into()));
        }
        if let Some(link) = self.nodes.get_mut(id).and_then(|n| n.parent.as_mut()) {
            link.key = ParentKey::Position(position);
        }
        Ok(old)
    }

    /// Writes scalar fields of an Object. Returns each field's previous
    /// value (`None` when the field was absent).
    ///
    /// A field whose key is held by a child container is rejected; the
    /// resolver removes such children first.
    pub fn set_fields(
        &mut self,
        id: &str,
        fields: &Fields,
    ) -> Result<Vec<(String, Option<Json>)>, TreeError> {
        self.expect_kind(id, NodeKind::Object)?;
        if let Some(key) = fields.keys().find(|key| self.child_at(id, key).is_some()) {
            return Err(TreeError::KeyOccupied {
                parent_id: id.into(),
                key: key.clone(),
            });
        }
        let previous = match self.nodes.get_mut(id).map(|n| &mut n.data) {
            Some(NodeData::Object(current)) => fields
                .iter()
                .map(|(key, value)| (key.clone(), current.insert(key.clone(), value.clone())))
                .collect(),
            _ => return Err(TreeError::NodeNotFound { id: id.into() }),
        };
        if let Some(ChildIndex::Keyed(slots)) = self.children.get_mut(id) {
            for key in fields.keys() {
                slots.entry(key.clone()).or_insert(None);
            }
        }
        Ok(previous)
    }

    /// Removes a scalar field of an Object, returning its old value.
    pub fn remove_field(&mut self, id: &str, key: &str) -> Result<Option<Json>, TreeError> {
        self.expect_kind(id, NodeKind::Object)?;
        let old = match self.nodes.get_mut(id).map(|n| &mut n.data) {
            Some(NodeData::Object(current)) => current.shift_remove(key),
            _ => return Err(TreeError::NodeNotFound { id: id.into() }),
        };
        if old.is_some() {
            if let Some(ChildIndex::Keyed(slots)) = self.children.get_mut(id) {
                slots.shift_remove(key);
            }
        }
        Ok(old)
    }

    /// Replaces the content of a Register, returning the old content.
    pub fn set_register(&mut self, id: &str, value: Json) -> Result<Json, TreeError> {
        self.expect_kind(id, NodeKind::Register)?;
        match self.nodes.get_mut(id).map(|n| &mut n.data) {
            Some(NodeData::Register(current)) => Ok(std::mem::replace(current, value)),
            _ => Err(TreeError::NodeNotFound { id: id.into() }),
        }
    }

    // === Internals ===

    fn install(&mut self, node: StorageNode) {
        if let Some(index) = ChildIndex::for_data(&node.data) {
            self.children.insert(node.id.clone(), index);
        }
        if let Some(link) = &node.parent {
            match (self.children.get_mut(&link.id), &link.key) {
                // A vacated key keeps its place.
                (Some(ChildIndex::Keyed(slots)), ParentKey::Field(key)) => {
                    slots.insert(key.clone(), Some(node.id.clone()));
                }
                (Some(ChildIndex::Ordered(items)), ParentKey::Position(position)) => {
                    let idx = items.partition_point(|(p, _)| p < position);
                    items.insert(idx, (position.clone(), node.id.clone()));
                }
                _ => {}
            }
        }
        self.nodes.insert(node.id.clone(), node);
    }

    fn position_taken(&self, list: &str, position: &Position) -> bool {
        match self.children.get(list) {
            Some(ChildIndex::Ordered(items)) => items
                .binary_search_by(|(p, _)| p.cmp(position))
                .is_ok(),
            _ => false,
        }
    }

    fn expect_kind(&self, id: &str, kind: NodeKind) -> Result<(), TreeError> {
        let actual = self.kind(id)?;
        if actual == kind {
            Ok(())
        } else {
            Err(TreeError::type_mismatch(&id.into(), kind.as_str(), actual))
        }
    }

    fn expected(&self, id: &str, expected: &str) -> TreeError {
        match self.kind(id) {
            Ok(actual) => TreeError::type_mismatch(&id.into(), expected, actual),
            Err(not_found) => not_found,
        }
    }
}

/// A container whose children are still being folded into its payload.
struct OpenContainer<'a> {
    kind: NodeKind,
    /// Key under the parent Object or Map, `None` under a List
    key: Option<&'a str>,
    children: ChildWalk<'a>,
    payload: Json,
}

impl OpenContainer<'_> {
    fn push(&mut self, key: Option<&str>, value: Json) {
        match (&mut self.payload, key) {
            (Json::Object(entries), Some(key)) => {
                entries.insert(key.to_string(), value);
            }
            (Json::Array(items), _) => items.push(value),
            _ => {}
        }
    }
}

enum ChildWalk<'a> {
    Keyed(KeyedEntries<'a>),
    Ordered(slice::Iter<'a, (Position, NodeId)>),
}

enum Folding<'a> {
    Done(Json),
    Open(OpenContainer<'a>),
}

/// Validates a wire payload against the node kind.
fn node_data(id: &NodeId, kind: NodeKind, data: Option<Json>) -> Result<NodeData, TreeError> {
    match (kind, data) {
        (NodeKind::Object, None) => Ok(NodeData::Object(Fields::new())),
        (NodeKind::Object, Some(Json::Object(fields))) => Ok(NodeData::Object(fields)),
        (NodeKind::Object, Some(other)) => Err(TreeError::InvalidData {
            id: id.clone(),
            reason: format!("object data must be a JSON object, got {other}"),
        }),
        (NodeKind::Register, Some(value)) => Ok(NodeData::Register(value)),
        (NodeKind::Register, None) => Err(TreeError::InvalidData {
            id: id.clone(),
            reason: "register has no data".to_string(),
        }),
        (NodeKind::Map, _) => Ok(NodeData::Map),
        (NodeKind::List, _) => Ok(NodeData::List),
    }
}
