//! One client's replica of a shared document.
//!
//! A [`Room`] turns local calls (list inserts and moves, field writes) into
//! [`Op`]s, applies them immediately and hands them to its [`Transport`]. Ops
//! from the server, including the echo of this client's own ops, arrive
//! through [`Room::apply_remote_ops`] in the room's total order.
//!
//! Two trees are kept:
//!
//! - the **confirmed** tree holds exactly what the server has sequenced so far;
//! - while local ops are unacknowledged, a **speculative** tree holds the
//!   confirmed tree with those pending ops replayed on top. Reads see it.
//!
//! When remote ops arrive they are applied to the confirmed tree and the
//! speculative tree is rebuilt from it, so the server's order always wins and
//! every client ends up with the same confirmed tree once all ops have been
//! delivered.
//!
//! # Examples
//!
//! ```
//! use livetree::{NodeId, Room, RoomConfig, transport::NullTransport};
//! use serde_json::json;
//!
//! let mut room = Room::new(RoomConfig::default().with_actor(1), Box::new(NullTransport));
//! let root = NodeId::root();
//! room.object_set(&root, "todos", json!({"liveblocksType": "LiveList", "data": []}))?;
//! let todos = room.child_at(&root, "todos").unwrap();
//! room.list_push(&todos, json!("milk"))?;
//! room.list_insert(&todos, 0, json!("eggs"))?;
//!
//! assert_eq!(room.to_immutable(), json!({"todos": ["eggs", "milk"]}));
//! room.undo()?;
//! assert_eq!(room.to_immutable(), json!({"todos": ["milk"]}));
//! # Ok::<(), livetree::Error>(())
//! ```

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use tracing::debug;

use crate::{
    Fields, Json, Result,
    clock::IdClock,
    node::{NodeId, NodeKind, NodeTree, ParentLink, SerializedNode, StorageNode, TreeError},
    op::{Op, OpKind},
    plain_lson::{self, EncodeLazy},
    position::PositionAllocator,
    resolver,
    transport::Transport,
};

mod config;
pub mod errors;
mod handle;
mod history;
mod subscriptions;

pub use config::{DEFAULT_HANDLE_CAPACITY, DEFAULT_HISTORY_LIMIT, RoomConfig};
pub use errors::RoomError;
pub use handle::RoomHandle;
pub use subscriptions::{Callback, SubscriptionId};

use history::History;
use subscriptions::Subscriptions;

/// Ops and bookkeeping collected while a batch is open.
#[derive(Debug, Default)]
struct Batch {
    ops: Vec<Op>,
    reverse: Vec<Vec<OpKind>>,
    changed: Vec<NodeId>,
}

/// A client replica of one document.
pub struct Room {
    config: RoomConfig,
    confirmed: NodeTree,
    speculative: Option<NodeTree>,
    pending: Vec<Op>,
    ids: IdClock,
    positions: PositionAllocator,
    transport: Box<dyn Transport>,
    history: History,
    subscriptions: Subscriptions,
    batch: Option<Batch>,
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Room")
            .field("actor", &self.config.actor)
            .field("nodes", &self.tree().node_count())
            .field("pending", &self.pending.len())
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}

impl Room {
    /// Creates a room holding an empty root Object.
    pub fn new(config: RoomConfig, transport: Box<dyn Transport>) -> Self {
        Self {
            ids: IdClock::new(config.actor),
            positions: PositionAllocator::new(config.actor),
            history: History::new(config.history_limit),
            config,
            confirmed: NodeTree::new(),
            speculative: None,
            pending: Vec::new(),
            transport,
            subscriptions: Subscriptions::default(),
            batch: None,
        }
    }

    /// Creates a room whose confirmed state is the decoded PlainLson `doc`.
    pub fn from_plain_lson(
        config: RoomConfig,
        transport: Box<dyn Transport>,
        doc: &Json,
    ) -> Result<Self> {
        let mut room = Self::new(config, transport);
        room.confirmed = plain_lson::decode_tree(doc, &mut room.ids)?;
        Ok(room)
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn actor(&self) -> u32 {
        self.config.actor
    }

    // === Reads ===

    /// The tree reads are served from: confirmed state plus pending local ops.
    pub fn tree(&self) -> &NodeTree {
        self.speculative.as_ref().unwrap_or(&self.confirmed)
    }

    /// The state the server has sequenced, without pending local ops.
    pub fn confirmed_tree(&self) -> &NodeTree {
        &self.confirmed
    }

    pub fn root_id(&self) -> NodeId {
        NodeId::root()
    }

    pub fn get_node(&self, id: &NodeId) -> Option<&StorageNode> {
        self.tree().get(id.as_str())
    }

    /// Id of the child container of an Object or Map at `key`.
    pub fn child_at(&self, parent: &NodeId, key: &str) -> Option<NodeId> {
        self.tree().child_at(parent.as_str(), key).cloned()
    }

    pub fn list_len(&self, list: &NodeId) -> Result<usize> {
        Ok(self.tree().list_children(list.as_str())?.len())
    }

    /// Id of the element at `index`.
    pub fn list_id_at(&self, list: &NodeId, index: usize) -> Result<NodeId> {
        Ok(self.tree().list_child_at(list.as_str(), index)?.clone())
    }

    /// Plain value of the element at `index`.
    pub fn list_get(&self, list: &NodeId, index: usize) -> Result<Json> {
        let id = self.tree().list_child_at(list.as_str(), index)?;
        Ok(self.tree().to_immutable(id.as_str()).unwrap_or(Json::Null))
    }

    /// Plain value of an Object's field, scalar or container.
    pub fn object_get(&self, object: &NodeId, key: &str) -> Option<Json> {
        let tree = self.tree();
        if let Some(value) = tree.get(object.as_str())?.fields()?.get(key) {
            return Some(value.clone());
        }
        tree.to_immutable(tree.child_at(object.as_str(), key)?.as_str())
    }

    /// Plain value stored under `key` in a Map.
    pub fn map_get(&self, map: &NodeId, key: &str) -> Option<Json> {
        let tree = self.tree();
        tree.to_immutable(tree.child_at(map.as_str(), key)?.as_str())
    }

    /// Plain JSON view of the whole document.
    pub fn to_immutable(&self) -> Json {
        plain_lson::to_immutable(self.tree())
    }

    pub fn node_to_immutable(&self, id: &NodeId) -> Option<Json> {
        self.tree().to_immutable(id.as_str())
    }

    /// Local ops not yet acknowledged by the server, oldest first.
    pub fn pending_ops(&self) -> &[Op] {
        &self.pending
    }

    /// Snapshot of the visible tree in wire form.
    pub fn serialize_nodes(&self) -> Vec<SerializedNode> {
        self.tree().serialize()
    }

    pub fn export_plain_lson(&self) -> Json {
        plain_lson::encode(self.tree())
    }

    /// Streams the visible tree as PlainLson text.
    pub fn export_plain_lson_chunks(&self) -> EncodeLazy<'_> {
        plain_lson::encode_lazy(self.tree())
    }

    // === List mutations ===

    pub fn list_push(&mut self, list: &NodeId, value: Json) -> Result<()> {
        let len = self.list_len(list)?;
        self.list_insert(list, len, value)
    }

    /// Inserts `value` so that it ends up at `index`.
    pub fn list_insert(&mut self, list: &NodeId, index: usize, value: Json) -> Result<()> {
        let children = self.tree().list_children(list.as_str())?;
        if index > children.len() {
            return Err(TreeError::IndexOutOfBounds {
                index,
                len: children.len(),
            }
            .into());
        }
        let before = index
            .checked_sub(1)
            .and_then(|i| children.get(i))
            .map(|(p, _)| p.clone());
        let after = children.get(index).map(|(p, _)| p.clone());
        let position = self.positions.allocate(before.as_ref(), after.as_ref());
        let ops = self.value_ops(&value, ParentLink::position(list.clone(), position), None)?;
        self.mutate(ops)
    }

    pub fn list_delete(&mut self, list: &NodeId, index: usize) -> Result<()> {
        let id = self.list_id_at(list, index)?;
        self.mutate(vec![OpKind::DeleteCrdt { id }])
    }

    /// Moves the element at `from` into the gap before the element now at
    /// `to` (`to == len` means the end). Only its Position changes.
    pub fn list_move(&mut self, list: &NodeId, from: usize, to: usize) -> Result<()> {
        let children = self.tree().list_children(list.as_str())?;
        let len = children.len();
        if from >= len {
            return Err(TreeError::IndexOutOfBounds { index: from, len }.into());
        }
        if to > len {
            return Err(TreeError::IndexOutOfBounds { index: to, len }.into());
        }
        if to == from || to == from + 1 {
            return Ok(());
        }
        let id = children[from].1.clone();
        let before = to.checked_sub(1).map(|i| children[i].0.clone());
        let after = children.get(to).map(|(p, _)| p.clone());
        let parent_key = self.positions.allocate(before.as_ref(), after.as_ref());
        self.mutate(vec![OpKind::SetParentKey { id, parent_key }])
    }

    /// Replaces the content of the element at `index`.
    ///
    /// A scalar written over a Register only touches its content, keeping
    /// identity and Position. Any other combination replaces the element with
    /// a new node in the same slot.
    pub fn list_set(&mut self, list: &NodeId, index: usize, value: Json) -> Result<()> {
        let tree = self.tree();
        let id = tree.list_child_at(list.as_str(), index)?.clone();
        let Some(occupant) = tree.get(id.as_str()) else {
            return Err(TreeError::NodeNotFound { id }.into());
        };
        if occupant.kind() == NodeKind::Register && !plain_lson::is_live(&value) {
            return self.mutate(vec![OpKind::UpdateRegister { id, data: value }]);
        }
        let Some(position) = occupant.parent_key().and_then(|key| key.as_position()).cloned()
        else {
            return Err(TreeError::type_mismatch(list, "List", tree.kind(list.as_str())?).into());
        };
        let ops = self.value_ops(&value, ParentLink::position(list.clone(), position), Some(id))?;
        self.mutate(ops)
    }

    pub fn list_clear(&mut self, list: &NodeId) -> Result<()> {
        let ops = self
            .tree()
            .list_children(list.as_str())?
            .iter()
            .map(|(_, id)| OpKind::DeleteCrdt { id: id.clone() })
            .collect();
        self.mutate(ops)
    }

    // === Object and Map mutations ===

    /// Sets one field of an Object. Containers become child nodes, anything
    /// else is stored inline.
    pub fn object_set(&mut self, object: &NodeId, key: &str, value: Json) -> Result<()> {
        let mut fields = Fields::new();
        fields.insert(key.to_string(), value);
        self.object_update(object, fields)
    }

    /// Sets several fields of an Object as one mutation.
    pub fn object_update(&mut self, object: &NodeId, fields: Fields) -> Result<()> {
        self.expect_kind(object, NodeKind::Object)?;
        let mut scalars = Fields::new();
        let mut creates = Vec::new();
        for (key, value) in fields {
            if plain_lson::is_live(&value) {
                creates.extend(self.value_ops(&value, ParentLink::field(object.clone(), key), None)?);
            } else {
                scalars.insert(key, value);
            }
        }
        let mut ops = Vec::with_capacity(creates.len() + 1);
        if !scalars.is_empty() {
            ops.push(OpKind::UpdateObject {
                id: object.clone(),
                data: scalars,
            });
        }
        ops.extend(creates);
        self.mutate(ops)
    }

    /// Removes a field of an Object. Absent keys are ignored.
    pub fn object_delete(&mut self, object: &NodeId, key: &str) -> Result<()> {
        self.expect_kind(object, NodeKind::Object)?;
        let tree = self.tree();
        let present = tree.child_at(object.as_str(), key).is_some()
            || tree
                .get(object.as_str())
                .and_then(StorageNode::fields)
                .is_some_and(|fields| fields.contains_key(key));
        if !present {
            return Ok(());
        }
        self.mutate(vec![OpKind::DeleteObjectKey {
            id: object.clone(),
            key: key.to_string(),
        }])
    }

    /// Stores `value` under `key` in a Map, replacing any previous entry.
    pub fn map_set(&mut self, map: &NodeId, key: &str, value: Json) -> Result<()> {
        self.expect_kind(map, NodeKind::Map)?;
        let ops = self.value_ops(&value, ParentLink::field(map.clone(), key), None)?;
        self.mutate(ops)
    }

    /// Removes an entry of a Map. Absent keys are ignored.
    pub fn map_delete(&mut self, map: &NodeId, key: &str) -> Result<()> {
        self.expect_kind(map, NodeKind::Map)?;
        match self.child_at(map, key) {
            Some(id) => self.mutate(vec![OpKind::DeleteCrdt { id }]),
            None => Ok(()),
        }
    }

    // === Batches and history ===

    /// Runs `f` as a single mutation: its ops are sent as one message,
    /// subscribers are notified once, and one undo step reverts all of it.
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut Room) -> R) -> Result<R> {
        if self.batch.is_some() {
            return Err(RoomError::NestedBatch.into());
        }
        self.batch = Some(Batch::default());
        let out = f(self);
        if let Some(batch) = self.batch.take() {
            if !batch.ops.is_empty() {
                self.transport.send(batch.ops);
            }
            let entry: Vec<OpKind> = batch.reverse.into_iter().rev().flatten().collect();
            if !entry.is_empty() {
                self.history.record(entry);
            }
            self.notify(batch.changed);
        }
        Ok(out)
    }

    /// Reverts the most recent local mutation. Returns false if there was
    /// nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        if self.batch.is_some() {
            return Err(RoomError::HistoryInBatch.into());
        }
        let Some(entry) = self.history.pop_undo() else {
            return Ok(false);
        };
        let entry = self.refresh_ids(entry);
        let redo = self.commit(entry)?;
        self.history.push_redo(redo);
        Ok(true)
    }

    /// Re-applies the most recently undone mutation.
    pub fn redo(&mut self) -> Result<bool> {
        if self.batch.is_some() {
            return Err(RoomError::HistoryInBatch.into());
        }
        let Some(entry) = self.history.pop_redo() else {
            return Ok(false);
        };
        let entry = self.refresh_ids(entry);
        let undo = self.commit(entry)?;
        self.history.push_undo(undo);
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    // === Subscriptions ===

    /// Registers `callback` for changes to `node` (and, if `deep`, to
    /// anything below it).
    pub fn subscribe(
        &mut self,
        node: NodeId,
        deep: bool,
        callback: impl FnMut(&[NodeId]) + Send + 'static,
    ) -> SubscriptionId {
        self.subscriptions.add(node, deep, Box::new(callback))
    }

    /// Removes a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.remove(id)
    }

    // === Transport entry points ===

    /// Applies ops sequenced by the server, in order.
    ///
    /// Ops whose `opId` matches a pending local op acknowledge it. Rejected
    /// ops are logged and skipped; they never abort the rest of the batch.
    pub fn apply_remote_ops(&mut self, ops: Vec<Op>) {
        let mut changed = Vec::new();
        let mut rebase = false;
        for op in &ops {
            let applied = resolver::apply_or_drop(&mut self.confirmed, &op.kind);
            let acked = op.op_id.as_ref().and_then(|op_id| {
                self.pending
                    .iter()
                    .position(|pending| pending.op_id.as_ref() == Some(op_id))
            });
            match acked {
                Some(idx) => {
                    self.pending.remove(idx);
                    // Acks in send order leave confirmed + pending unchanged.
                    rebase |= idx != 0;
                }
                None => {
                    changed.extend(applied.touched);
                    rebase = true;
                }
            }
        }
        if self.pending.is_empty() {
            self.speculative = None;
        } else if rebase {
            debug!(
                remote = ops.len(),
                pending = self.pending.len(),
                "rebasing pending ops"
            );
            self.rebuild_speculative();
        }
        self.notify(changed);
    }

    /// Replaces the confirmed tree with a snapshot from the server and
    /// replays pending ops on top of it.
    ///
    /// Ops that arrive afterwards and name a node the snapshot does not hold
    /// are ignored, as ops on deleted nodes are.
    pub fn apply_initial_storage(&mut self, nodes: Vec<SerializedNode>) -> Result<()> {
        let mut tree = NodeTree::from_serialized(nodes).map_err(RoomError::InvalidSnapshot)?;
        // Late ops may still name nodes deleted before the snapshot.
        tree.inherit_tombstones(&self.confirmed);
        tree.assume_unknown_deleted();
        let mut changed = all_ids(self.tree());
        self.confirmed = tree;
        self.rebuild_speculative();
        debug!(
            nodes = self.confirmed.node_count(),
            pending = self.pending.len(),
            "installed initial storage"
        );
        changed.extend(all_ids(self.tree()));
        self.notify(changed);
        Ok(())
    }

    /// Sends every pending op again, e.g. after a reconnect lost them.
    pub fn resend_pending(&mut self) {
        if !self.pending.is_empty() {
            self.transport.send(self.pending.clone());
        }
    }

    // === Internals ===

    fn expect_kind(&self, id: &NodeId, kind: NodeKind) -> Result<()> {
        let actual = self.tree().kind(id.as_str())?;
        if actual != kind {
            return Err(TreeError::type_mismatch(id, kind.as_str(), actual).into());
        }
        Ok(())
    }

    /// The Create ops for a PlainLson value placed at `parent`.
    fn value_ops(
        &mut self,
        value: &Json,
        parent: ParentLink,
        replacing: Option<NodeId>,
    ) -> Result<Vec<OpKind>> {
        let mut ops = Vec::new();
        let mut replacing = replacing;
        for node in plain_lson::decode_value(value, parent, &mut self.ids) {
            ops.extend(OpKind::create(&node?, replacing.take()));
        }
        Ok(ops)
    }

    /// Applies a local mutation and records its reverse in history.
    fn mutate(&mut self, ops: Vec<OpKind>) -> Result<()> {
        let reverse = self.commit(ops)?;
        if reverse.is_empty() {
            return Ok(());
        }
        match &mut self.batch {
            Some(batch) => batch.reverse.push(reverse),
            None => self.history.record(reverse),
        }
        Ok(())
    }

    /// Applies ops to the speculative tree, queues and sends them.
    ///
    /// All or nothing: if any op is rejected, the speculative tree is rebuilt
    /// without them and the error is returned. Returns the ops that undo
    /// this commit.
    fn commit(&mut self, kinds: Vec<OpKind>) -> Result<Vec<OpKind>> {
        if kinds.is_empty() {
            return Ok(Vec::new());
        }
        let tree = self
            .speculative
            .get_or_insert_with(|| self.confirmed.clone());
        let mut reverse = Vec::with_capacity(kinds.len());
        let mut changed = Vec::new();
        for kind in &kinds {
            match resolver::apply_op(tree, kind) {
                Ok(applied) => {
                    changed.extend(applied.touched);
                    reverse.push(applied.reverse);
                }
                Err(err) => {
                    self.rebuild_speculative();
                    return Err(err.into());
                }
            }
        }

        let ops: Vec<Op> = kinds
            .into_iter()
            .map(|kind| Op::with_id(self.ids.next_op_id(), kind))
            .collect();
        self.pending.extend(ops.iter().cloned());
        match &mut self.batch {
            Some(batch) => {
                batch.ops.extend(ops);
                batch.changed.extend(changed);
            }
            None => {
                self.transport.send(ops);
                self.notify(changed);
            }
        }
        Ok(reverse.into_iter().rev().flatten().collect())
    }

    /// Gives recreated nodes fresh ids (deleted ids are never reused) and
    /// points the rest of history at them.
    fn refresh_ids(&mut self, mut entry: Vec<OpKind>) -> Vec<OpKind> {
        let tree = self.speculative.as_ref().unwrap_or(&self.confirmed);
        let mut fresh = HashMap::new();
        for op in entry.iter().filter(|op| op.is_create()) {
            let id = op.id().as_str();
            if tree.contains(id) || tree.is_deleted(id) {
                fresh.insert(op.id().clone(), self.ids.next_node_id());
            }
        }
        for op in &mut entry {
            op.remap(&fresh);
        }
        self.history.remap(&fresh);
        entry
    }

    fn rebuild_speculative(&mut self) {
        if self.pending.is_empty() {
            self.speculative = None;
            return;
        }
        let mut tree = self.confirmed.clone();
        for op in &self.pending {
            if let Err(error) = resolver::apply_op(&mut tree, &op.kind) {
                debug!(op = op.kind.name(), id = %op.kind.id(), %error, "pending op no longer applies");
            }
        }
        self.speculative = Some(tree);
    }

    fn notify(&mut self, changed: Vec<NodeId>) {
        if changed.is_empty() {
            return;
        }
        let mut seen = HashSet::new();
        let changed: Vec<NodeId> = changed
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        let tree = self.speculative.as_ref().unwrap_or(&self.confirmed);
        self.subscriptions.notify(tree, &changed);
    }
}

fn all_ids(tree: &NodeTree) -> Vec<NodeId> {
    tree.subtree(crate::constants::ROOT_ID)
        .into_iter()
        .map(|node| node.id.clone())
        .collect()
}
